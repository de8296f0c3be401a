use crate::domain::models::{Task, UserProfile, XpState};
use crate::domain::pomodoro::{PomodoroSnapshot, PomodoroTimer, TickOutcome};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// Everything the client shows. Cloned out for readers; mutated only by `reduce`.
#[derive(Debug, Clone, Default)]
pub struct AppSnapshot {
    pub user: Option<UserProfile>,
    pub tasks: Vec<Task>,
    pub xp: Option<XpState>,
    pub pomodoro: PomodoroTimer,
    pending_toggles: HashSet<String>,
    session_starting: bool,
}

impl AppSnapshot {
    pub fn is_toggle_pending(&self, task_id: &str) -> bool {
        self.pending_toggles.contains(task_id)
    }

    /// A `POST /pomodoro/start` is out and its answer not yet applied.
    pub fn is_session_starting(&self) -> bool {
        self.session_starting
    }

    pub fn timer(&self) -> PomodoroSnapshot {
        self.pomodoro.snapshot()
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    SignedIn(Option<UserProfile>),
    SignedOut,
    TasksLoaded(Vec<Task>),
    TaskCompletionToggled { index: usize },
    ToggleSettled { task_id: String },
    TaskRestored { previous: Task },
    TaskUpserted(Task),
    TaskRemoved { task_id: String },
    XpRefreshed(XpState),
    SessionStartRequested,
    SessionStartFailed,
    SessionStarted { session_id: String, started_at: DateTime<Utc> },
    SessionPaused,
    SessionResumed,
    SessionStopped,
    TimerTicked,
    WorkDurationChanged(u32),
    CompletionDisplayReset,
}

impl Action {
    fn name(&self) -> &'static str {
        match self {
            Self::SignedIn(_) => "signed_in",
            Self::SignedOut => "signed_out",
            Self::TasksLoaded(_) => "tasks_loaded",
            Self::TaskCompletionToggled { .. } => "task_completion_toggled",
            Self::ToggleSettled { .. } => "toggle_settled",
            Self::TaskRestored { .. } => "task_restored",
            Self::TaskUpserted(_) => "task_upserted",
            Self::TaskRemoved { .. } => "task_removed",
            Self::XpRefreshed(_) => "xp_refreshed",
            Self::SessionStartRequested => "session_start_requested",
            Self::SessionStartFailed => "session_start_failed",
            Self::SessionStarted { .. } => "session_started",
            Self::SessionPaused => "session_paused",
            Self::SessionResumed => "session_resumed",
            Self::SessionStopped => "session_stopped",
            Self::TimerTicked => "timer_ticked",
            Self::WorkDurationChanged(_) => "work_duration_changed",
            Self::CompletionDisplayReset => "completion_display_reset",
        }
    }
}

/// What a reduction produced that the caller has to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    None,
    TaskToggled { task: Task, previous: Task },
    Ticked { remaining_seconds: u32 },
    SessionExpired { session_id: String },
    SessionDiscarded { session_id: String },
    LevelUp { level: u32, level_name: String },
}

#[derive(Debug, Default)]
pub struct AppStore {
    state: Mutex<AppSnapshot>,
}

impl AppStore {
    pub fn new(pomodoro: PomodoroTimer) -> Self {
        Self {
            state: Mutex::new(AppSnapshot {
                pomodoro,
                ..AppSnapshot::default()
            }),
        }
    }

    pub fn dispatch(&self, action: Action) -> Result<Effect, InfraError> {
        let name = action.name();
        let mut state = self.lock()?;
        let effect = reduce(&mut state, action);
        if let Err(error) = &effect {
            tracing::debug!(action = name, %error, "action rejected");
        }
        effect
    }

    pub fn snapshot(&self) -> Result<AppSnapshot, InfraError> {
        Ok(self.lock()?.clone())
    }

    pub fn tasks(&self) -> Result<Vec<Task>, InfraError> {
        Ok(self.lock()?.tasks.clone())
    }

    pub fn timer(&self) -> Result<PomodoroSnapshot, InfraError> {
        Ok(self.lock()?.pomodoro.snapshot())
    }

    fn lock(&self) -> Result<MutexGuard<'_, AppSnapshot>, InfraError> {
        self.state
            .lock()
            .map_err(|error| InfraError::StaleState(format!("store lock poisoned: {error}")))
    }
}

pub fn reduce(state: &mut AppSnapshot, action: Action) -> Result<Effect, InfraError> {
    match action {
        Action::SignedIn(user) => {
            state.user = user;
            Ok(Effect::None)
        }
        Action::SignedOut => {
            let pomodoro = state.pomodoro.clone();
            *state = AppSnapshot::default();
            state.pomodoro = pomodoro;
            if let Some(session_id) = state.pomodoro.stop() {
                return Ok(Effect::SessionDiscarded { session_id });
            }
            Ok(Effect::None)
        }
        Action::TasksLoaded(tasks) => {
            state.tasks = tasks;
            Ok(Effect::None)
        }
        Action::TaskCompletionToggled { index } => {
            let loaded = state.tasks.len();
            let Some(task) = state.tasks.get_mut(index) else {
                return Err(InfraError::Validation(format!(
                    "no task at position {index} ({loaded} loaded)"
                )));
            };
            if state.pending_toggles.contains(&task.id) {
                return Err(InfraError::StaleState(format!(
                    "task {} already has a completion request in flight",
                    task.id
                )));
            }
            let previous = task.clone();
            task.completed = !task.completed;
            let task = task.clone();
            state.pending_toggles.insert(task.id.clone());
            Ok(Effect::TaskToggled { task, previous })
        }
        Action::ToggleSettled { task_id } => {
            state.pending_toggles.remove(&task_id);
            Ok(Effect::None)
        }
        // Only the toggled entry is put back; anything else that landed while
        // the request was in flight stays.
        Action::TaskRestored { previous } => {
            state.pending_toggles.remove(&previous.id);
            if let Some(existing) = state.tasks.iter_mut().find(|task| task.id == previous.id) {
                *existing = previous;
            }
            Ok(Effect::None)
        }
        Action::TaskUpserted(task) => {
            match state.tasks.iter_mut().find(|candidate| candidate.id == task.id) {
                Some(existing) => *existing = task,
                None => state.tasks.push(task),
            }
            Ok(Effect::None)
        }
        Action::TaskRemoved { task_id } => {
            state.tasks.retain(|task| task.id != task_id);
            state.pending_toggles.remove(&task_id);
            Ok(Effect::None)
        }
        Action::XpRefreshed(xp) => {
            let previous_level = state.xp.as_ref().map(|current| current.level);
            let effect = match previous_level {
                Some(level) if xp.level > level => Effect::LevelUp {
                    level: xp.level,
                    level_name: xp.level_name.clone(),
                },
                _ => Effect::None,
            };
            state.xp = Some(xp);
            Ok(effect)
        }
        Action::SessionStartRequested => {
            if state.session_starting {
                return Err(InfraError::StaleState(
                    "a session start is already in flight".to_string(),
                ));
            }
            if !state.pomodoro.is_stopped() {
                return Err(InfraError::Validation(
                    "timer must be stopped before start".to_string(),
                ));
            }
            state.session_starting = true;
            Ok(Effect::None)
        }
        Action::SessionStartFailed => {
            state.session_starting = false;
            Ok(Effect::None)
        }
        Action::SessionStarted {
            session_id,
            started_at,
        } => {
            state.session_starting = false;
            state
                .pomodoro
                .begin(&session_id, started_at)
                .map_err(InfraError::Validation)?;
            Ok(Effect::None)
        }
        Action::SessionPaused => {
            state.pomodoro.pause();
            Ok(Effect::None)
        }
        Action::SessionResumed => {
            state.pomodoro.resume();
            Ok(Effect::None)
        }
        Action::SessionStopped => Ok(match state.pomodoro.stop() {
            Some(session_id) => Effect::SessionDiscarded { session_id },
            None => Effect::None,
        }),
        Action::TimerTicked => Ok(match state.pomodoro.tick() {
            TickOutcome::Idle => Effect::None,
            TickOutcome::Counting { remaining_seconds } => Effect::Ticked { remaining_seconds },
            TickOutcome::Expired { session_id } => Effect::SessionExpired { session_id },
        }),
        Action::WorkDurationChanged(seconds) => {
            state
                .pomodoro
                .set_work_duration(seconds)
                .map_err(InfraError::Validation)?;
            Ok(Effect::None)
        }
        Action::CompletionDisplayReset => {
            state.pomodoro.reset_after_completion();
            Ok(Effect::None)
        }
    }
}
