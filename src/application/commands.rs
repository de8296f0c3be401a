use crate::application::boards::BoardService;
use crate::application::bootstrap::{BootstrapResult, bootstrap_workspace};
use crate::application::notifications::NotificationQueue;
use crate::application::pomodoro::PomodoroService;
use crate::application::progress::ProgressService;
use crate::application::session::SessionManager;
use crate::application::store::{Action, AppStore};
use crate::application::tasks::{TaskService, ToggleOutcome};
use crate::domain::boards::{
    Board, BoardDraft, BoardInvite, BoardMember, BoardMembers, BoardTask, BoardTaskDraft,
    BoardTaskStatus,
};
use crate::domain::models::{
    Achievement, AuthToken, DailyCompletions, Priority, ProfileUpdate, Task, TaskDraft,
    UserProfile, XpState, parse_date_prefix,
};
use crate::domain::pomodoro::{PomodoroSnapshot, PomodoroTimer};
use crate::infrastructure::api_client::{ReqwestSwampApi, SwampApi};
use crate::infrastructure::config::{ClientConfig, save_work_duration};
use crate::infrastructure::credential_store::{CredentialStore, KeyringCredentialStore};
use crate::infrastructure::error::{ErrorKind, InfraError};
use crate::infrastructure::task_cache::{SqliteTaskCacheRepository, TaskCacheRepository};
use chrono::NaiveDate;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const KEYRING_ACCOUNT: &str = "default";

/// Wired services for one workspace.
pub struct AppState {
    api: Arc<dyn SwampApi>,
    config_dir: PathBuf,
    database_path: PathBuf,
    config: ClientConfig,
    store: Arc<AppStore>,
    notifications: Arc<NotificationQueue>,
    session: Arc<SessionManager>,
    progress: Arc<ProgressService>,
    pomodoro: Arc<PomodoroService>,
    tasks: Arc<TaskService>,
    boards: Arc<BoardService>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let api = Arc::new(ReqwestSwampApi::new(bootstrap.config.api_base_url.clone()));
        let credentials = Arc::new(KeyringCredentialStore::new(
            bootstrap.config.keyring_service.clone(),
            KEYRING_ACCOUNT,
        ));
        let cache = Arc::new(SqliteTaskCacheRepository::new(&bootstrap.database_path));
        Self::with_backends(bootstrap, api, credentials, cache)
    }

    pub fn with_backends(
        bootstrap: BootstrapResult,
        api: Arc<dyn SwampApi>,
        credentials: Arc<dyn CredentialStore>,
        cache: Arc<dyn TaskCacheRepository>,
    ) -> Result<Self, InfraError> {
        let config = bootstrap.config;
        let timer =
            PomodoroTimer::new(config.work_duration_seconds).map_err(InfraError::InvalidConfig)?;
        let store = Arc::new(AppStore::new(timer));
        let notifications = Arc::new(NotificationQueue::default());
        let session = Arc::new(SessionManager::new(
            Arc::clone(&api),
            credentials,
            Arc::clone(&store),
        ));
        let progress = Arc::new(ProgressService::new(
            Arc::clone(&api),
            Arc::clone(&session),
            Arc::clone(&store),
            Arc::clone(&notifications),
            config.timezone,
        ));
        let pomodoro = Arc::new(PomodoroService::new(
            Arc::clone(&api),
            Arc::clone(&session),
            Arc::clone(&store),
            Arc::clone(&progress),
            Duration::from_millis(config.completion_reset_delay_ms),
        ));
        let tasks = Arc::new(TaskService::new(
            Arc::clone(&api),
            Arc::clone(&session),
            Arc::clone(&store),
            Arc::clone(&progress),
            cache,
        ));
        let boards = Arc::new(BoardService::new(Arc::clone(&api), Arc::clone(&session)));

        if let Some(token) = session.current_token()? {
            store.dispatch(Action::SignedIn(token.user))?;
        }

        Ok(Self {
            api,
            config_dir: bootstrap.config_dir,
            database_path: bootstrap.database_path,
            config,
            store,
            notifications,
            session,
            progress,
            pomodoro,
            tasks,
            boards,
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<AppStore> {
        Arc::clone(&self.store)
    }

    pub fn notifications(&self) -> Arc<NotificationQueue> {
        Arc::clone(&self.notifications)
    }

    pub fn pomodoro(&self) -> Arc<PomodoroService> {
        Arc::clone(&self.pomodoro)
    }

    pub fn tasks(&self) -> Arc<TaskService> {
        Arc::clone(&self.tasks)
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        tracing::error!(command, kind = ?error.kind(), %error, "command failed");
        error.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskOrder {
    #[default]
    Server,
    Priority,
    Deadline,
}

#[derive(Debug, Clone)]
pub struct TaskListing {
    pub tasks: Vec<Task>,
    /// Set when the server was unreachable and the cached list is shown.
    pub from_cache: bool,
}

/// Field-wise edit; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct TaskEdit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<String>,
    pub priority: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatsResponse {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_completed: u32,
}

pub async fn health_impl(state: &AppState) -> Result<String, InfraError> {
    state.api.health().await
}

pub async fn login_impl(
    state: &AppState,
    email: String,
    password: String,
) -> Result<AuthToken, InfraError> {
    state.session.login(&email, &password).await
}

pub async fn register_impl(
    state: &AppState,
    email: String,
    password: String,
    username: Option<String>,
) -> Result<String, InfraError> {
    state
        .session
        .register(&email, &password, username.as_deref())
        .await
}

pub async fn logout_impl(state: &AppState) -> Result<bool, InfraError> {
    if let Err(error) = state.tasks.clear_cache() {
        tracing::warn!(%error, "failed to clear task cache on logout");
    }
    state.session.logout().await
}

pub async fn list_tasks_impl(state: &AppState, order: TaskOrder) -> Result<TaskListing, InfraError> {
    let from_cache = match state.tasks.refresh().await {
        Ok(_) => false,
        Err(error) if error.kind() == ErrorKind::NetworkFailure => {
            if state.tasks.load_cached()?.is_none() {
                return Err(error);
            }
            tracing::warn!(%error, "server unreachable; showing cached tasks");
            true
        }
        Err(error) => return Err(error),
    };

    let tasks = match order {
        TaskOrder::Server => state.tasks.tasks()?,
        TaskOrder::Priority => state.tasks.sorted_by_priority()?,
        TaskOrder::Deadline => state.tasks.sorted_by_deadline()?,
    };
    Ok(TaskListing { tasks, from_cache })
}

pub async fn create_task_impl(
    state: &AppState,
    title: String,
    description: Option<String>,
    due_date: Option<String>,
    priority: Option<String>,
) -> Result<Task, InfraError> {
    let draft = TaskDraft {
        title,
        description,
        due_date: parse_due_date(due_date.as_deref())?,
        priority: parse_priority(priority.as_deref())?,
    };
    state.tasks.create(&draft).await
}

pub async fn update_task_impl(
    state: &AppState,
    task_id: String,
    edit: TaskEdit,
) -> Result<Task, InfraError> {
    let current = find_task(state, &task_id).await?;
    let mut draft = current.to_draft();
    if let Some(title) = edit.title {
        draft.title = title;
    }
    if let Some(description) = edit.description {
        draft.description = Some(description);
    }
    if let Some(due_date) = edit.due_date {
        draft.due_date = parse_due_date(Some(&due_date))?;
    }
    if edit.priority.is_some() {
        draft.priority = parse_priority(edit.priority.as_deref())?;
    }
    state.tasks.update(&current.id, &draft).await
}

pub async fn delete_task_impl(state: &AppState, task_id: String) -> Result<(), InfraError> {
    state.tasks.delete(&task_id).await
}

pub async fn complete_task_impl(
    state: &AppState,
    task_id: String,
    cancel: CancellationToken,
) -> Result<ToggleOutcome, InfraError> {
    let task = find_task(state, &task_id).await?;
    let index = state.tasks.position_of(&task.id)?.ok_or_else(|| {
        InfraError::StaleState(format!("task {} disappeared before toggling", task.id))
    })?;
    state.tasks.toggle_complete(index, cancel).await
}

pub async fn xp_impl(state: &AppState) -> Result<XpState, InfraError> {
    state.progress.refresh_xp().await
}

pub async fn achievements_impl(state: &AppState) -> Result<Vec<Achievement>, InfraError> {
    state.progress.achievements().await
}

pub async fn stats_impl(
    state: &AppState,
    start_date: Option<String>,
    end_date: Option<String>,
) -> Result<StatsResponse, InfraError> {
    let today = state.progress.today();
    let start_date = match start_date {
        Some(raw) => parse_required_date(&raw, "start date")?,
        None => today,
    };
    let end_date = match end_date {
        Some(raw) => parse_required_date(&raw, "end date")?,
        None => start_date.max(today),
    };
    let stats = state.progress.stats_between(start_date, end_date).await?;
    Ok(StatsResponse {
        start_date,
        end_date,
        total_completed: stats.total_completed,
    })
}

pub fn set_work_duration_impl(state: &AppState, seconds: u32) -> Result<PomodoroSnapshot, InfraError> {
    let snapshot = state.pomodoro.set_work_duration(seconds)?;
    save_work_duration(&state.config_dir, seconds)?;
    Ok(snapshot)
}

pub async fn start_focus_impl(
    state: &AppState,
    seconds: Option<u32>,
) -> Result<PomodoroSnapshot, InfraError> {
    if let Some(seconds) = seconds {
        state.pomodoro.set_work_duration(seconds)?;
    }
    state.pomodoro.start().await
}

/// `None` keeps the stored value; an empty string clears it.
pub async fn update_profile_impl(
    state: &AppState,
    major: Option<String>,
    year: Option<String>,
) -> Result<UserProfile, InfraError> {
    if major.is_none() && year.is_none() {
        return Err(InfraError::Validation(
            "nothing to update; pass --major and/or --year".to_string(),
        ));
    }
    let current = state
        .session
        .current_token()?
        .and_then(|token| token.user)
        .unwrap_or_default();
    let update = ProfileUpdate {
        major: major.or(current.major).unwrap_or_default(),
        year: year.or(current.year).unwrap_or_default(),
    };
    state.session.update_profile(&update).await
}

pub async fn weekly_stats_impl(state: &AppState) -> Result<DailyCompletions, InfraError> {
    state.progress.weekly_completions().await
}

pub async fn list_boards_impl(state: &AppState) -> Result<Vec<Board>, InfraError> {
    state.boards.list().await
}

pub async fn create_board_impl(
    state: &AppState,
    name: String,
    description: Option<String>,
) -> Result<Board, InfraError> {
    state.boards.create(&BoardDraft { name, description }).await
}

pub async fn delete_board_impl(state: &AppState, board_id: String) -> Result<Board, InfraError> {
    state.boards.delete(&board_id).await
}

pub async fn board_tasks_impl(state: &AppState, board_id: String) -> Result<Vec<BoardTask>, InfraError> {
    state.boards.tasks(&board_id).await
}

pub async fn add_board_task_impl(
    state: &AppState,
    board_id: String,
    title: String,
    description: Option<String>,
    due_date: Option<String>,
    priority: Option<String>,
    assigned_to: Option<String>,
) -> Result<BoardTask, InfraError> {
    let draft = BoardTaskDraft {
        title,
        description,
        due_date: parse_due_date(due_date.as_deref())?,
        priority: parse_priority(priority.as_deref())?,
        assigned_to,
    };
    state.boards.add_task(&board_id, &draft).await
}

pub async fn move_board_task_impl(
    state: &AppState,
    board_id: String,
    task_id: String,
    status: String,
) -> Result<BoardTaskStatus, InfraError> {
    let status = BoardTaskStatus::parse(&status).ok_or_else(|| {
        InfraError::Validation(format!(
            "status must be todo, in_progress or done, got '{}'",
            status.trim()
        ))
    })?;
    state.boards.move_task(&board_id, &task_id, status).await?;
    Ok(status)
}

pub async fn invite_member_impl(
    state: &AppState,
    board_id: String,
    username: String,
) -> Result<String, InfraError> {
    state.boards.invite(&board_id, &username).await
}

pub async fn board_members_impl(state: &AppState, board_id: String) -> Result<BoardMembers, InfraError> {
    state.boards.members(&board_id).await
}

pub async fn remove_member_impl(
    state: &AppState,
    board_id: String,
    member: String,
) -> Result<BoardMember, InfraError> {
    state.boards.remove_member(&board_id, &member).await
}

pub async fn list_invites_impl(state: &AppState) -> Result<Vec<BoardInvite>, InfraError> {
    state.boards.invites().await
}

pub async fn answer_invite_impl(
    state: &AppState,
    invite_id: String,
    accept: bool,
) -> Result<(), InfraError> {
    state.boards.answer_invite(&invite_id, accept).await
}

async fn find_task(state: &AppState, task_id: &str) -> Result<Task, InfraError> {
    let task_id = task_id.trim();
    if task_id.is_empty() {
        return Err(InfraError::Validation("task id must not be empty".to_string()));
    }
    let lookup = |tasks: Vec<Task>| tasks.into_iter().find(|task| task.id == task_id);
    if let Some(task) = lookup(state.tasks.tasks()?) {
        return Ok(task);
    }
    lookup(state.tasks.refresh().await?)
        .ok_or_else(|| InfraError::Validation(format!("task not found: {task_id}")))
}

fn parse_due_date(raw: Option<&str>) -> Result<Option<NaiveDate>, InfraError> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => parse_required_date(value, "due date").map(Some),
        None => Ok(None),
    }
}

fn parse_required_date(raw: &str, field_name: &str) -> Result<NaiveDate, InfraError> {
    let raw = raw.trim();
    if raw.len() != 10 {
        return Err(InfraError::Validation(format!(
            "{field_name} must be YYYY-MM-DD, got '{raw}'"
        )));
    }
    parse_date_prefix(raw).ok_or_else(|| {
        InfraError::Validation(format!("{field_name} must be YYYY-MM-DD, got '{raw}'"))
    })
}

fn parse_priority(raw: Option<&str>) -> Result<Priority, InfraError> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => Priority::parse(value).ok_or_else(|| {
            InfraError::Validation(format!("priority must be Low, Medium or High, got '{value}'"))
        }),
        None => Ok(Priority::default()),
    }
}
