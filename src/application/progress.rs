use crate::application::notifications::NotificationQueue;
use crate::application::session::{NowProvider, SessionManager};
use crate::application::store::{Action, AppStore, Effect};
use crate::domain::models::{
    Achievement, CompletionAward, DailyCompletions, NotificationEvent, TaskStats, XpState,
};
use crate::infrastructure::api_client::SwampApi;
use crate::infrastructure::error::InfraError;
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

pub const POMODORO_COMPLETED_REASON: &str = "Pomodoro session completed!";
pub const TASK_COMPLETED_REASON: &str = "Task completed!";

/// XP, achievements and completion stats, plus turning awards into
/// notifications.
pub struct ProgressService {
    api: Arc<dyn SwampApi>,
    session: Arc<SessionManager>,
    store: Arc<AppStore>,
    notifications: Arc<NotificationQueue>,
    timezone: Tz,
    now_provider: NowProvider,
}

impl ProgressService {
    pub fn new(
        api: Arc<dyn SwampApi>,
        session: Arc<SessionManager>,
        store: Arc<AppStore>,
        notifications: Arc<NotificationQueue>,
        timezone: Tz,
    ) -> Self {
        Self {
            api,
            session,
            store,
            notifications,
            timezone,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    /// Queues the award as one atomic batch: XP first, then achievements.
    pub fn announce(&self, award: &CompletionAward, reason: &str) -> Result<usize, InfraError> {
        let queued = self.notifications.enqueue(award.notifications(reason))?;
        if queued > 0 {
            tracing::info!(
                xp_awarded = award.xp_awarded,
                achievements = award.achievements_earned.len(),
                reason,
                "award queued"
            );
        }
        Ok(queued)
    }

    pub async fn refresh_xp(&self) -> Result<XpState, InfraError> {
        let access_token = self.session.access_token()?;
        let xp = self
            .api
            .fetch_xp(&access_token)
            .await
            .inspect_err(|error| self.session.note_failure(error))?;

        if let Effect::LevelUp { level, level_name } =
            self.store.dispatch(Action::XpRefreshed(xp.clone()))?
        {
            tracing::info!(level, %level_name, "level up");
            self.notifications
                .enqueue([NotificationEvent::LevelUp { level, level_name }])?;
        }
        Ok(xp)
    }

    /// Refresh that only logs on failure; used after awards where the XP
    /// bar is cosmetic.
    pub async fn refresh_xp_quietly(&self) {
        if let Err(error) = self.refresh_xp().await {
            tracing::warn!(%error, "xp refresh failed");
        }
    }

    pub fn cached_xp(&self) -> Result<Option<XpState>, InfraError> {
        Ok(self.store.snapshot()?.xp)
    }

    pub async fn achievements(&self) -> Result<Vec<Achievement>, InfraError> {
        let access_token = self.session.access_token()?;
        self.api
            .list_achievements(&access_token)
            .await
            .inspect_err(|error| self.session.note_failure(error))
    }

    pub fn today(&self) -> NaiveDate {
        (self.now_provider)().with_timezone(&self.timezone).date_naive()
    }

    pub async fn stats_between(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<TaskStats, InfraError> {
        if end_date < start_date {
            return Err(InfraError::Validation(format!(
                "end date {end_date} is before start date {start_date}"
            )));
        }
        let access_token = self.session.access_token()?;
        self.api
            .task_stats(&access_token, start_date, end_date)
            .await
            .inspect_err(|error| self.session.note_failure(error))
    }

    pub async fn stats_today(&self) -> Result<TaskStats, InfraError> {
        let today = self.today();
        self.stats_between(today, today).await
    }

    /// Per-day completed counts for the last week, as labelled by the server.
    pub async fn weekly_completions(&self) -> Result<DailyCompletions, InfraError> {
        let access_token = self.session.access_token()?;
        let week = self
            .api
            .daily_completions(&access_token)
            .await
            .inspect_err(|error| self.session.note_failure(error))?;
        tracing::debug!(days = week.labels.len(), total = week.total(), "weekly completions fetched");
        Ok(week)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::FakeSwampApi;
    use crate::infrastructure::credential_store::InMemoryCredentialStore;
    use chrono::{DateTime, TimeZone};
    use std::sync::atomic::Ordering;

    struct Harness {
        api: Arc<FakeSwampApi>,
        notifications: Arc<NotificationQueue>,
        progress: ProgressService,
    }

    fn harness(timezone: Tz) -> Harness {
        let api = Arc::new(FakeSwampApi::default());
        let store = Arc::new(AppStore::default());
        let credentials = Arc::new(InMemoryCredentialStore::with_token(FakeSwampApi::token()));
        let session = Arc::new(SessionManager::new(
            Arc::clone(&api) as Arc<dyn SwampApi>,
            credentials,
            Arc::clone(&store),
        ));
        let notifications = Arc::new(NotificationQueue::default());
        let progress = ProgressService::new(
            Arc::clone(&api) as Arc<dyn SwampApi>,
            session,
            store,
            Arc::clone(&notifications),
            timezone,
        );
        Harness {
            api,
            notifications,
            progress,
        }
    }

    #[test]
    fn announce_queues_xp_then_achievements() {
        let harness = harness(chrono_tz::UTC);
        let award = CompletionAward {
            xp_awarded: 10,
            achievements_earned: vec![
                FakeSwampApi::achievement("First Task"),
                FakeSwampApi::achievement("On A Roll"),
            ],
        };
        assert_eq!(
            harness
                .progress
                .announce(&award, TASK_COMPLETED_REASON)
                .expect("announce"),
            3
        );
        assert_eq!(harness.notifications.pending_len().expect("pending"), 3);
    }

    #[test]
    fn empty_award_queues_nothing() {
        let harness = harness(chrono_tz::UTC);
        let queued = harness
            .progress
            .announce(&CompletionAward::default(), TASK_COMPLETED_REASON)
            .expect("announce");
        assert_eq!(queued, 0);
        assert!(harness.notifications.is_idle().expect("idle"));
    }

    #[tokio::test]
    async fn level_increase_queues_level_up_event() {
        let harness = harness(chrono_tz::UTC);
        harness.progress.refresh_xp().await.expect("first refresh");
        assert!(harness.notifications.is_idle().expect("idle"));

        harness.api.set_xp(Ok(FakeSwampApi::xp(2, 110)));
        harness.progress.refresh_xp().await.expect("second refresh");

        let now = tokio::time::Instant::now();
        let shown = harness.notifications.poll(now).expect("poll");
        assert_eq!(
            shown,
            Some(crate::application::notifications::DisplayChange::Shown(
                NotificationEvent::LevelUp {
                    level: 2,
                    level_name: "Level 2".to_string()
                }
            ))
        );
        assert_eq!(harness.api.fetch_xp_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stats_today_uses_configured_timezone() {
        let instant: DateTime<Utc> = Utc
            .with_ymd_and_hms(2026, 3, 10, 2, 30, 0)
            .single()
            .expect("instant");
        let harness = harness(chrono_tz::America::New_York);
        let progress = harness
            .progress
            .with_now_provider(Arc::new(move || instant));

        progress.stats_today().await.expect("stats");
        let ranges = harness.api.stats_ranges.lock().expect("ranges").clone();
        let expected = NaiveDate::from_ymd_opt(2026, 3, 9).expect("date");
        assert_eq!(ranges, vec![(expected, expected)]);
    }

    #[tokio::test]
    async fn weekly_completions_pass_through_server_labels() {
        let harness = harness(chrono_tz::UTC);
        harness.api.set_week(Ok(DailyCompletions {
            labels: vec!["Mon".to_string(), "Tue".to_string()],
            data: vec![3, 1],
        }));
        let week = harness.progress.weekly_completions().await.expect("week");
        assert_eq!(week.days().collect::<Vec<_>>(), vec![("Mon", 3), ("Tue", 1)]);
    }

    #[tokio::test]
    async fn weekly_completions_unauthorized_signs_out() {
        let harness = harness(chrono_tz::UTC);
        harness
            .api
            .set_week(Err(InfraError::Unauthorized("expired".to_string())));
        assert!(harness.progress.weekly_completions().await.is_err());
        let error = harness
            .progress
            .weekly_completions()
            .await
            .expect_err("signed out");
        assert!(matches!(error, InfraError::Unauthorized(message) if message.contains("not signed in")));
    }

    #[tokio::test]
    async fn stats_rejects_inverted_range() {
        let harness = harness(chrono_tz::UTC);
        let start = NaiveDate::from_ymd_opt(2026, 3, 9).expect("date");
        let end = NaiveDate::from_ymd_opt(2026, 3, 1).expect("date");
        let error = harness
            .progress
            .stats_between(start, end)
            .await
            .expect_err("inverted");
        assert!(matches!(error, InfraError::Validation(_)));
    }
}
