use crate::application::progress::{ProgressService, POMODORO_COMPLETED_REASON};
use crate::application::session::{NowProvider, SessionManager};
use crate::application::store::{Action, AppStore, Effect};
use crate::domain::models::CompletionAward;
use crate::domain::pomodoro::{PomodoroSnapshot, RunState};
use crate::infrastructure::api_client::SwampApi;
use crate::infrastructure::error::{InfraError, SessionStartError};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// How a countdown that reached zero was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed {
        session_id: String,
        award: CompletionAward,
    },
    /// The completion request failed; the session is dropped without retry.
    Abandoned { session_id: String, error: String },
}

pub struct PomodoroService {
    api: Arc<dyn SwampApi>,
    session: Arc<SessionManager>,
    store: Arc<AppStore>,
    progress: Arc<ProgressService>,
    reset_delay: Duration,
    now_provider: NowProvider,
    outcomes: watch::Sender<Option<SessionOutcome>>,
}

impl PomodoroService {
    pub fn new(
        api: Arc<dyn SwampApi>,
        session: Arc<SessionManager>,
        store: Arc<AppStore>,
        progress: Arc<ProgressService>,
        reset_delay: Duration,
    ) -> Self {
        let (outcomes, _) = watch::channel(None);
        Self {
            api,
            session,
            store,
            progress,
            reset_delay,
            now_provider: Arc::new(Utc::now),
            outcomes,
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn snapshot(&self) -> Result<PomodoroSnapshot, InfraError> {
        self.store.timer()
    }

    /// Receives every settled countdown, completed or abandoned.
    pub fn subscribe(&self) -> watch::Receiver<Option<SessionOutcome>> {
        self.outcomes.subscribe()
    }

    /// Requests a server session and starts counting once it is issued. A
    /// second call while the first request is pending is rejected without
    /// contacting the server.
    pub async fn start(&self) -> Result<PomodoroSnapshot, SessionStartError> {
        self.store.dispatch(Action::SessionStartRequested)?;

        let session_id = match self.request_session().await {
            Ok(session_id) => session_id,
            Err(error) => {
                if let Err(clear_error) = self.store.dispatch(Action::SessionStartFailed) {
                    tracing::warn!(error = %clear_error, "failed to clear pending session start");
                }
                tracing::error!(%error, kind = ?error.kind(), "failed to start pomodoro session");
                self.session.note_failure(&error);
                return Err(error);
            }
        };

        self.store.dispatch(Action::SessionStarted {
            session_id: session_id.clone(),
            started_at: (self.now_provider)(),
        })?;
        let snapshot = self.store.timer()?;
        tracing::info!(
            %session_id,
            work_duration_seconds = snapshot.work_duration_seconds,
            "pomodoro session started"
        );
        Ok(snapshot)
    }

    async fn request_session(&self) -> Result<String, InfraError> {
        let access_token = self.session.access_token()?;
        self.api.start_session(&access_token).await
    }

    pub fn pause(&self) -> Result<PomodoroSnapshot, InfraError> {
        self.store.dispatch(Action::SessionPaused)?;
        let snapshot = self.store.timer()?;
        tracing::debug!(remaining_seconds = snapshot.remaining_seconds, state = snapshot.run_state.as_str(), "pause requested");
        Ok(snapshot)
    }

    pub fn resume(&self) -> Result<PomodoroSnapshot, InfraError> {
        self.store.dispatch(Action::SessionResumed)?;
        self.store.timer()
    }

    /// Pauses a running countdown or resumes a paused one. A stopped timer
    /// is returned unchanged.
    pub fn toggle_pause(&self) -> Result<PomodoroSnapshot, InfraError> {
        let snapshot = self.store.timer()?;
        match snapshot.run_state {
            RunState::Running => self.pause(),
            RunState::Paused => self.resume(),
            RunState::Stopped => Ok(snapshot),
        }
    }

    /// Abandons the current session. Completion is never reported for it.
    pub fn stop(&self) -> Result<PomodoroSnapshot, InfraError> {
        self.abandon()?;
        self.store.timer()
    }

    /// Same as `stop`, returning the id of the dropped session. `None` when
    /// nothing was counting, which includes a countdown that already hit zero
    /// and is being reported.
    pub fn abandon(&self) -> Result<Option<String>, InfraError> {
        match self.store.dispatch(Action::SessionStopped)? {
            Effect::SessionDiscarded { session_id } => {
                tracing::info!(%session_id, "pomodoro session stopped");
                Ok(Some(session_id))
            }
            _ => Ok(None),
        }
    }

    pub fn set_work_duration(&self, seconds: u32) -> Result<PomodoroSnapshot, InfraError> {
        self.store.dispatch(Action::WorkDurationChanged(seconds))?;
        tracing::info!(seconds, "work duration changed");
        self.store.timer()
    }

    /// One second of countdown. When it reaches zero the session is
    /// reported before this returns.
    pub async fn tick(&self) -> Result<Option<SessionOutcome>, InfraError> {
        match self.advance()? {
            Some(session_id) => Ok(Some(self.complete_session(session_id).await)),
            None => Ok(None),
        }
    }

    /// Counts one second down. Returns the id of a session that just expired.
    fn advance(&self) -> Result<Option<String>, InfraError> {
        match self.store.dispatch(Action::TimerTicked)? {
            Effect::SessionExpired { session_id } => Ok(Some(session_id)),
            _ => Ok(None),
        }
    }

    async fn complete_session(&self, session_id: String) -> SessionOutcome {
        let outcome = match self.report_completion(&session_id).await {
            Ok(award) => {
                tracing::info!(%session_id, xp_awarded = award.xp_awarded, "pomodoro session completed");
                SessionOutcome::Completed { session_id, award }
            }
            Err(error) => {
                tracing::error!(%session_id, %error, "failed to complete pomodoro session; abandoning it");
                self.session.note_failure(&error);
                SessionOutcome::Abandoned {
                    session_id,
                    error: error.to_string(),
                }
            }
        };
        self.schedule_display_reset();
        self.outcomes.send_replace(Some(outcome.clone()));
        outcome
    }

    async fn report_completion(&self, session_id: &str) -> Result<CompletionAward, InfraError> {
        let access_token = self.session.access_token()?;
        let award = self.api.complete_session(&access_token, session_id).await?;
        if let Err(error) = self.progress.announce(&award, POMODORO_COMPLETED_REASON) {
            tracing::warn!(%error, "failed to queue session award");
        }
        self.progress.refresh_xp_quietly().await;
        Ok(award)
    }

    fn schedule_display_reset(&self) {
        let store = Arc::clone(&self.store);
        let delay = self.reset_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(error) = store.dispatch(Action::CompletionDisplayReset) {
                tracing::warn!(%error, "failed to reset timer display");
            }
        });
    }

    /// Counts down once per second until cancelled. Expired sessions are
    /// reported on a separate flow so a slow completion request never holds
    /// up the countdown of the next session. Completions already handed off
    /// when cancellation arrives still run to the end.
    pub async fn run_ticker(&self, cancel: CancellationToken) -> Result<(), InfraError> {
        let (expired_tx, mut expired_rx) = mpsc::unbounded_channel::<String>();

        let countdown = async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => match self.advance() {
                        Ok(Some(session_id)) => {
                            if expired_tx.send(session_id).is_err() {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(error) => tracing::warn!(%error, "timer tick failed"),
                    },
                }
            }
            tracing::debug!("pomodoro ticker stopped");
        };

        let completions = async move {
            while let Some(session_id) = expired_rx.recv().await {
                self.complete_session(session_id).await;
            }
        };

        tokio::join!(countdown, completions);
        Ok(())
    }
}
