use crate::application::progress::{ProgressService, TASK_COMPLETED_REASON};
use crate::application::session::{NowProvider, SessionManager};
use crate::application::store::{Action, AppStore, Effect};
use crate::domain::models::{CompletionAward, Task, TaskDraft};
use crate::infrastructure::api_client::SwampApi;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::task_cache::{CachedTasks, TaskCacheRepository};
use chrono::{NaiveDate, Utc};
use std::cmp::Reverse;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub task: Task,
    pub award: CompletionAward,
}

pub struct TaskService {
    api: Arc<dyn SwampApi>,
    session: Arc<SessionManager>,
    store: Arc<AppStore>,
    progress: Arc<ProgressService>,
    cache: Arc<dyn TaskCacheRepository>,
    now_provider: NowProvider,
}

impl TaskService {
    pub fn new(
        api: Arc<dyn SwampApi>,
        session: Arc<SessionManager>,
        store: Arc<AppStore>,
        progress: Arc<ProgressService>,
        cache: Arc<dyn TaskCacheRepository>,
    ) -> Self {
        Self {
            api,
            session,
            store,
            progress,
            cache,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn tasks(&self) -> Result<Vec<Task>, InfraError> {
        self.store.tasks()
    }

    pub async fn refresh(&self) -> Result<Vec<Task>, InfraError> {
        let access_token = self.session.access_token()?;
        let tasks = self
            .api
            .list_tasks(&access_token)
            .await
            .inspect_err(|error| {
                tracing::warn!(%error, "failed to list tasks");
                self.session.note_failure(error);
            })?;
        for task in &tasks {
            task.validate().map_err(InfraError::MalformedResponse)?;
        }

        self.store.dispatch(Action::TasksLoaded(tasks.clone()))?;
        self.persist_cache(&tasks);
        tracing::info!(count = tasks.len(), "tasks refreshed");
        Ok(tasks)
    }

    /// Seeds the store from the last list the server returned for this account.
    pub fn load_cached(&self) -> Result<Option<CachedTasks>, InfraError> {
        let account_key = self.session.account_key()?;
        let cached = self.cache.load(&account_key)?;
        if let Some(cached) = &cached {
            self.store.dispatch(Action::TasksLoaded(cached.tasks.clone()))?;
            tracing::debug!(
                count = cached.tasks.len(),
                refreshed_at = %cached.refreshed_at,
                "loaded cached tasks"
            );
        }
        Ok(cached)
    }

    pub async fn create(&self, draft: &TaskDraft) -> Result<Task, InfraError> {
        let draft = draft.normalized();
        draft.validate().map_err(InfraError::Validation)?;
        let access_token = self.session.access_token()?;

        let task = self
            .api
            .create_task(&access_token, &draft, (self.now_provider)())
            .await
            .inspect_err(|error| {
                tracing::warn!(%error, "failed to create task");
                self.session.note_failure(error);
            })?;
        self.store.dispatch(Action::TaskUpserted(task.clone()))?;
        self.persist_store_cache();
        tracing::info!(task_id = %task.id, "task created");
        Ok(task)
    }

    pub async fn update(&self, task_id: &str, draft: &TaskDraft) -> Result<Task, InfraError> {
        let task_id = required_task_id(task_id)?;
        let draft = draft.normalized();
        draft.validate().map_err(InfraError::Validation)?;
        let access_token = self.session.access_token()?;

        let task = self
            .api
            .update_task(&access_token, task_id, &draft)
            .await
            .inspect_err(|error| {
                tracing::warn!(task_id, %error, "failed to update task");
                self.session.note_failure(error);
            })?;
        self.store.dispatch(Action::TaskUpserted(task.clone()))?;
        self.persist_store_cache();
        tracing::info!(task_id, "task updated");
        Ok(task)
    }

    pub async fn delete(&self, task_id: &str) -> Result<(), InfraError> {
        let task_id = required_task_id(task_id)?;
        let access_token = self.session.access_token()?;

        self.api
            .delete_task(&access_token, task_id)
            .await
            .inspect_err(|error| {
                tracing::warn!(task_id, %error, "failed to delete task");
                self.session.note_failure(error);
            })?;
        self.store.dispatch(Action::TaskRemoved {
            task_id: task_id.to_string(),
        })?;
        self.persist_store_cache();
        tracing::info!(task_id, "task deleted");
        Ok(())
    }

    /// Flips the task at `index` locally, then confirms with the server. A
    /// failed or cancelled request puts that task back as it was; changes to
    /// other tasks made meanwhile are kept.
    pub async fn toggle_complete(
        &self,
        index: usize,
        cancel: CancellationToken,
    ) -> Result<ToggleOutcome, InfraError> {
        let access_token = self.session.access_token()?;
        let Effect::TaskToggled { task, previous } = self
            .store
            .dispatch(Action::TaskCompletionToggled { index })?
        else {
            return Err(InfraError::StaleState(format!(
                "task at position {index} was not toggled"
            )));
        };
        tracing::debug!(task_id = %task.id, completed = task.completed, "optimistic toggle applied");

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(InfraError::Cancelled(format!(
                "completion of task {} was cancelled",
                task.id
            ))),
            result = self.api.complete_task(&access_token, &task.id) => result,
        };

        let award = match result {
            Ok(award) => award,
            Err(error) => {
                self.store.dispatch(Action::TaskRestored { previous })?;
                tracing::warn!(task_id = %task.id, %error, "task completion failed; restored previous state");
                self.session.note_failure(&error);
                return Err(error);
            }
        };

        self.store.dispatch(Action::ToggleSettled {
            task_id: task.id.clone(),
        })?;
        self.persist_store_cache();
        tracing::info!(task_id = %task.id, xp_awarded = award.xp_awarded, "task completion confirmed");

        if let Err(error) = self.progress.announce(&award, TASK_COMPLETED_REASON) {
            tracing::warn!(%error, "failed to queue task award");
        }
        if award.xp_awarded > 0 {
            self.progress.refresh_xp_quietly().await;
        }
        Ok(ToggleOutcome { task, award })
    }

    pub fn position_of(&self, task_id: &str) -> Result<Option<usize>, InfraError> {
        Ok(self
            .store
            .tasks()?
            .iter()
            .position(|task| task.id == task_id))
    }

    /// High first; ties keep server order.
    pub fn sorted_by_priority(&self) -> Result<Vec<Task>, InfraError> {
        let mut tasks = self.store.tasks()?;
        tasks.sort_by_key(|task| Reverse(task.priority));
        Ok(tasks)
    }

    /// Earliest due date first; undated tasks last.
    pub fn sorted_by_deadline(&self) -> Result<Vec<Task>, InfraError> {
        let mut tasks = self.store.tasks()?;
        tasks.sort_by_key(|task| (task.due_date.is_none(), task.due_date));
        Ok(tasks)
    }

    pub fn overdue(&self, today: NaiveDate) -> Result<Vec<Task>, InfraError> {
        Ok(self
            .store
            .tasks()?
            .into_iter()
            .filter(|task| task.is_overdue(today))
            .collect())
    }

    pub fn clear_cache(&self) -> Result<(), InfraError> {
        let account_key = self.session.account_key()?;
        self.cache.clear(&account_key)
    }

    fn persist_store_cache(&self) {
        match self.store.tasks() {
            Ok(tasks) => self.persist_cache(&tasks),
            Err(error) => tracing::warn!(%error, "failed to read tasks for cache"),
        }
    }

    fn persist_cache(&self, tasks: &[Task]) {
        let result = self
            .session
            .account_key()
            .and_then(|account_key| self.cache.save(&account_key, tasks, (self.now_provider)()));
        if let Err(error) = result {
            tracing::warn!(%error, "failed to write task cache");
        }
    }
}

fn required_task_id(task_id: &str) -> Result<&str, InfraError> {
    let task_id = task_id.trim();
    if task_id.is_empty() {
        return Err(InfraError::Validation("task id must not be empty".to_string()));
    }
    Ok(task_id)
}
