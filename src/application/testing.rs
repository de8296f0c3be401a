//! Scripted `SwampApi` shared by the service tests.

use crate::domain::boards::{
    Board, BoardDraft, BoardInvite, BoardMember, BoardMembers, BoardRole, BoardTask,
    BoardTaskDraft, BoardTaskStatus,
};
use crate::domain::models::{
    Achievement, AuthToken, CompletionAward, DailyCompletions, Priority, ProfileUpdate, Task,
    TaskDraft, TaskStats, UserProfile, XpState,
};
use crate::infrastructure::api_client::{LoginRequest, LoginResponse, RegisterRequest, SwampApi};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

type Reply<T> = Mutex<Result<T, InfraError>>;
type Gate = Mutex<Option<Arc<Notify>>>;

pub struct FakeSwampApi {
    pub start_calls: AtomicUsize,
    pub complete_session_calls: AtomicUsize,
    pub complete_task_calls: AtomicUsize,
    pub fetch_xp_calls: AtomicUsize,
    pub list_tasks_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub completed_sessions: Mutex<Vec<String>>,
    pub stats_ranges: Mutex<Vec<(NaiveDate, NaiveDate)>>,
    /// Board, invite and profile mutations in call order, e.g. `invite 3 carl`.
    pub board_calls: Mutex<Vec<String>>,
    login: Reply<LoginResponse>,
    logout: Reply<()>,
    start_session: Reply<String>,
    start_session_gate: Gate,
    complete_session: Reply<CompletionAward>,
    complete_session_gate: Gate,
    complete_task: Reply<CompletionAward>,
    complete_task_gate: Gate,
    task_replies: Mutex<HashMap<String, Result<CompletionAward, InfraError>>>,
    task_gates: Mutex<HashMap<String, Arc<Notify>>>,
    xp: Reply<XpState>,
    tasks: Reply<Vec<Task>>,
    mutation_error: Mutex<Option<InfraError>>,
    achievements: Reply<Vec<Achievement>>,
    stats: Reply<TaskStats>,
    week: Reply<DailyCompletions>,
    boards: Reply<Vec<Board>>,
    board_tasks: Reply<Vec<BoardTask>>,
    members: Reply<BoardMembers>,
    invites: Reply<Vec<BoardInvite>>,
}

impl Default for FakeSwampApi {
    fn default() -> Self {
        Self {
            start_calls: AtomicUsize::new(0),
            complete_session_calls: AtomicUsize::new(0),
            complete_task_calls: AtomicUsize::new(0),
            fetch_xp_calls: AtomicUsize::new(0),
            list_tasks_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            completed_sessions: Mutex::new(Vec::new()),
            stats_ranges: Mutex::new(Vec::new()),
            board_calls: Mutex::new(Vec::new()),
            login: Mutex::new(Ok(LoginResponse {
                access_token: "jwt-test".to_string(),
                user: None,
            })),
            logout: Mutex::new(Ok(())),
            start_session: Mutex::new(Ok("42".to_string())),
            start_session_gate: Mutex::new(None),
            complete_session: Mutex::new(Ok(CompletionAward::default())),
            complete_session_gate: Mutex::new(None),
            complete_task: Mutex::new(Ok(CompletionAward::default())),
            complete_task_gate: Mutex::new(None),
            task_replies: Mutex::new(HashMap::new()),
            task_gates: Mutex::new(HashMap::new()),
            xp: Mutex::new(Ok(Self::xp(1, 40))),
            tasks: Mutex::new(Ok(Vec::new())),
            mutation_error: Mutex::new(None),
            achievements: Mutex::new(Ok(Vec::new())),
            stats: Mutex::new(Ok(TaskStats { total_completed: 0 })),
            week: Mutex::new(Ok(DailyCompletions::default())),
            boards: Mutex::new(Ok(Vec::new())),
            board_tasks: Mutex::new(Ok(Vec::new())),
            members: Mutex::new(Ok(BoardMembers::default())),
            invites: Mutex::new(Ok(Vec::new())),
        }
    }
}

impl FakeSwampApi {
    pub fn token() -> AuthToken {
        AuthToken {
            access_token: "jwt-test".to_string(),
            user: Some(UserProfile {
                id: Some("1".to_string()),
                email: Some("albert@ufl.edu".to_string()),
                username: Some("albert".to_string()),
                major: None,
                year: None,
            }),
            saved_at: Utc::now(),
        }
    }

    pub fn xp(level: u32, total_xp: u32) -> XpState {
        XpState {
            total_xp,
            level,
            level_name: format!("Level {level}"),
            min_xp_for_level: (level - 1) * 100,
            max_xp_for_level: Some(level * 100),
            progress_percent: total_xp % 100,
            xp_to_next_level: 100 - total_xp % 100,
        }
    }

    pub fn task(id: &str, completed: bool) -> Task {
        Task {
            id: id.to_string(),
            title: format!("Task {id}"),
            description: None,
            due_date: None,
            priority: Priority::Medium,
            completed,
            create_date: None,
            assignee: None,
        }
    }

    pub fn achievement(name: &str) -> Achievement {
        Achievement {
            id: name.to_lowercase().replace(' ', "-"),
            name: name.to_string(),
            description: format!("{name} unlocked"),
            icon: "🐊".to_string(),
            xp_reward: 25,
        }
    }

    pub fn board(id: &str, role: BoardRole) -> Board {
        Board {
            id: id.to_string(),
            name: format!("Board {id}"),
            description: None,
            role,
            created_by: Some("albert".to_string()),
            created_at: None,
        }
    }

    pub fn member(id: &str, username: &str, role: BoardRole) -> BoardMember {
        BoardMember {
            id: id.to_string(),
            username: Some(username.to_string()),
            email: None,
            role,
        }
    }

    pub fn board_task(id: &str, status: BoardTaskStatus) -> BoardTask {
        BoardTask {
            id: id.to_string(),
            title: format!("Board task {id}"),
            description: None,
            status,
            priority: Priority::Medium,
            due_date: None,
            assigned_to: None,
        }
    }

    pub fn set_login(&self, reply: Result<LoginResponse, InfraError>) {
        *self.login.lock().expect("fake lock") = reply;
    }

    pub fn set_logout(&self, reply: Result<(), InfraError>) {
        *self.logout.lock().expect("fake lock") = reply;
    }

    pub fn set_start_session(&self, reply: Result<String, InfraError>) {
        *self.start_session.lock().expect("fake lock") = reply;
    }

    pub fn set_complete_session(&self, reply: Result<CompletionAward, InfraError>) {
        *self.complete_session.lock().expect("fake lock") = reply;
    }

    pub fn set_complete_task(&self, reply: Result<CompletionAward, InfraError>) {
        *self.complete_task.lock().expect("fake lock") = reply;
    }

    /// Holds `complete_task` until the returned handle is notified.
    pub fn hold_complete_task(&self) -> Arc<Notify> {
        close_gate(&self.complete_task_gate)
    }

    /// Like `hold_complete_task`, for a single task id.
    pub fn hold_complete_task_for(&self, task_id: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.task_gates
            .lock()
            .expect("fake lock")
            .insert(task_id.to_string(), Arc::clone(&gate));
        gate
    }

    pub fn set_complete_task_for(&self, task_id: &str, reply: Result<CompletionAward, InfraError>) {
        self.task_replies
            .lock()
            .expect("fake lock")
            .insert(task_id.to_string(), reply);
    }

    pub fn hold_start_session(&self) -> Arc<Notify> {
        close_gate(&self.start_session_gate)
    }

    pub fn hold_complete_session(&self) -> Arc<Notify> {
        close_gate(&self.complete_session_gate)
    }

    pub fn set_xp(&self, reply: Result<XpState, InfraError>) {
        *self.xp.lock().expect("fake lock") = reply;
    }

    pub fn set_tasks(&self, reply: Result<Vec<Task>, InfraError>) {
        *self.tasks.lock().expect("fake lock") = reply;
    }

    pub fn fail_mutations(&self, error: InfraError) {
        *self.mutation_error.lock().expect("fake lock") = Some(error);
    }

    pub fn set_achievements(&self, reply: Result<Vec<Achievement>, InfraError>) {
        *self.achievements.lock().expect("fake lock") = reply;
    }

    pub fn set_stats(&self, reply: Result<TaskStats, InfraError>) {
        *self.stats.lock().expect("fake lock") = reply;
    }

    pub fn set_week(&self, reply: Result<DailyCompletions, InfraError>) {
        *self.week.lock().expect("fake lock") = reply;
    }

    pub fn set_boards(&self, reply: Result<Vec<Board>, InfraError>) {
        *self.boards.lock().expect("fake lock") = reply;
    }

    pub fn set_board_tasks(&self, reply: Result<Vec<BoardTask>, InfraError>) {
        *self.board_tasks.lock().expect("fake lock") = reply;
    }

    pub fn set_members(&self, reply: Result<BoardMembers, InfraError>) {
        *self.members.lock().expect("fake lock") = reply;
    }

    pub fn set_invites(&self, reply: Result<Vec<BoardInvite>, InfraError>) {
        *self.invites.lock().expect("fake lock") = reply;
    }

    pub fn board_log(&self) -> Vec<String> {
        self.board_calls.lock().expect("fake lock").clone()
    }

    fn record(&self, call: String) -> Result<(), InfraError> {
        self.board_calls.lock().expect("fake lock").push(call);
        self.mutation_result()
    }

    fn mutation_result(&self) -> Result<(), InfraError> {
        match self.mutation_error.lock().expect("fake lock").as_ref() {
            Some(error) => Err(copy_error(error)),
            None => Ok(()),
        }
    }
}

fn close_gate(gate: &Gate) -> Arc<Notify> {
    let notify = Arc::new(Notify::new());
    *gate.lock().expect("fake lock") = Some(Arc::clone(&notify));
    notify
}

async fn pass_gate(gate: &Gate) {
    let notify = gate.lock().expect("fake lock").clone();
    if let Some(notify) = notify {
        notify.notified().await;
    }
}

fn replay<T: Clone>(reply: &Reply<T>) -> Result<T, InfraError> {
    match &*reply.lock().expect("fake lock") {
        Ok(value) => Ok(value.clone()),
        Err(error) => Err(copy_error(error)),
    }
}

fn copy_error(error: &InfraError) -> InfraError {
    match error {
        InfraError::Network(message) => InfraError::Network(message.clone()),
        InfraError::Unauthorized(message) => InfraError::Unauthorized(message.clone()),
        InfraError::Rejected { status, message } => InfraError::Rejected {
            status: *status,
            message: message.clone(),
        },
        InfraError::MalformedResponse(message) => InfraError::MalformedResponse(message.clone()),
        InfraError::Validation(message) => InfraError::Validation(message.clone()),
        other => InfraError::Network(other.to_string()),
    }
}

fn task_from_draft(id: String, draft: &TaskDraft, create_date: Option<DateTime<Utc>>) -> Task {
    Task {
        id,
        title: draft.title.clone(),
        description: draft.description.clone(),
        due_date: draft.due_date,
        priority: draft.priority,
        completed: false,
        create_date,
        assignee: None,
    }
}

#[async_trait]
impl SwampApi for FakeSwampApi {
    async fn health(&self) -> Result<String, InfraError> {
        Ok("ok".to_string())
    }

    async fn login(&self, _request: &LoginRequest) -> Result<LoginResponse, InfraError> {
        replay(&self.login)
    }

    async fn register(&self, _request: &RegisterRequest) -> Result<String, InfraError> {
        Ok("User successfully created".to_string())
    }

    async fn logout(&self, _access_token: &str) -> Result<(), InfraError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        replay(&self.logout)
    }

    async fn start_session(&self, _access_token: &str) -> Result<String, InfraError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        pass_gate(&self.start_session_gate).await;
        replay(&self.start_session)
    }

    async fn complete_session(
        &self,
        _access_token: &str,
        session_id: &str,
    ) -> Result<CompletionAward, InfraError> {
        self.complete_session_calls.fetch_add(1, Ordering::SeqCst);
        self.completed_sessions
            .lock()
            .expect("fake lock")
            .push(session_id.to_string());
        pass_gate(&self.complete_session_gate).await;
        replay(&self.complete_session)
    }

    async fn complete_task(
        &self,
        _access_token: &str,
        task_id: &str,
    ) -> Result<CompletionAward, InfraError> {
        self.complete_task_calls.fetch_add(1, Ordering::SeqCst);
        let task_gate = self.task_gates.lock().expect("fake lock").get(task_id).cloned();
        match task_gate {
            Some(gate) => gate.notified().await,
            None => pass_gate(&self.complete_task_gate).await,
        }
        let scripted = self
            .task_replies
            .lock()
            .expect("fake lock")
            .get(task_id)
            .map(|reply| match reply {
                Ok(award) => Ok(award.clone()),
                Err(error) => Err(copy_error(error)),
            });
        scripted.unwrap_or_else(|| replay(&self.complete_task))
    }

    async fn fetch_xp(&self, _access_token: &str) -> Result<XpState, InfraError> {
        self.fetch_xp_calls.fetch_add(1, Ordering::SeqCst);
        replay(&self.xp)
    }

    async fn list_tasks(&self, _access_token: &str) -> Result<Vec<Task>, InfraError> {
        self.list_tasks_calls.fetch_add(1, Ordering::SeqCst);
        replay(&self.tasks)
    }

    async fn create_task(
        &self,
        _access_token: &str,
        draft: &TaskDraft,
        create_date: DateTime<Utc>,
    ) -> Result<Task, InfraError> {
        let sequence = self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.mutation_result()?;
        Ok(task_from_draft(
            format!("new-{}", sequence + 1),
            draft,
            Some(create_date),
        ))
    }

    async fn update_task(
        &self,
        _access_token: &str,
        task_id: &str,
        draft: &TaskDraft,
    ) -> Result<Task, InfraError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.mutation_result()?;
        Ok(task_from_draft(task_id.to_string(), draft, None))
    }

    async fn delete_task(&self, _access_token: &str, _task_id: &str) -> Result<(), InfraError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.mutation_result()
    }

    async fn list_achievements(&self, _access_token: &str) -> Result<Vec<Achievement>, InfraError> {
        replay(&self.achievements)
    }

    async fn task_stats(
        &self,
        _access_token: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<TaskStats, InfraError> {
        self.stats_ranges
            .lock()
            .expect("fake lock")
            .push((start_date, end_date));
        replay(&self.stats)
    }

    async fn daily_completions(&self, _access_token: &str) -> Result<DailyCompletions, InfraError> {
        replay(&self.week)
    }

    async fn update_profile(
        &self,
        _access_token: &str,
        update: &ProfileUpdate,
    ) -> Result<UserProfile, InfraError> {
        self.record(format!("profile {}/{}", update.major, update.year))?;
        let mut user = Self::token().user.unwrap_or_default();
        user.major = Some(update.major.clone()).filter(|value| !value.is_empty());
        user.year = Some(update.year.clone()).filter(|value| !value.is_empty());
        Ok(user)
    }

    async fn list_boards(&self, _access_token: &str) -> Result<Vec<Board>, InfraError> {
        replay(&self.boards)
    }

    async fn create_board(&self, _access_token: &str, draft: &BoardDraft) -> Result<Board, InfraError> {
        self.record(format!("create_board {}", draft.name))?;
        Ok(Board {
            name: draft.name.clone(),
            description: draft.description.clone(),
            ..Self::board("new", BoardRole::Admin)
        })
    }

    async fn delete_board(&self, _access_token: &str, board_id: &str) -> Result<(), InfraError> {
        self.record(format!("delete_board {board_id}"))
    }

    async fn list_board_tasks(
        &self,
        _access_token: &str,
        _board_id: &str,
    ) -> Result<Vec<BoardTask>, InfraError> {
        replay(&self.board_tasks)
    }

    async fn create_board_task(
        &self,
        _access_token: &str,
        board_id: &str,
        draft: &BoardTaskDraft,
    ) -> Result<BoardTask, InfraError> {
        self.record(format!("add_task {board_id} {}", draft.title))?;
        Ok(BoardTask {
            title: draft.title.clone(),
            description: draft.description.clone(),
            priority: draft.priority,
            due_date: draft.due_date,
            assigned_to: draft.assigned_to.clone(),
            ..Self::board_task("new", BoardTaskStatus::Todo)
        })
    }

    async fn update_board_task_status(
        &self,
        _access_token: &str,
        board_id: &str,
        task_id: &str,
        status: BoardTaskStatus,
    ) -> Result<(), InfraError> {
        self.record(format!("move {board_id} {task_id} {}", status.as_str()))
    }

    async fn invite_to_board(
        &self,
        _access_token: &str,
        board_id: &str,
        username: &str,
    ) -> Result<String, InfraError> {
        self.record(format!("invite {board_id} {username}"))?;
        Ok(format!("Invited {username}"))
    }

    async fn list_board_members(
        &self,
        _access_token: &str,
        _board_id: &str,
    ) -> Result<BoardMembers, InfraError> {
        replay(&self.members)
    }

    async fn remove_board_member(
        &self,
        _access_token: &str,
        board_id: &str,
        member_id: &str,
    ) -> Result<(), InfraError> {
        self.record(format!("remove_member {board_id} {member_id}"))
    }

    async fn list_invites(&self, _access_token: &str) -> Result<Vec<BoardInvite>, InfraError> {
        replay(&self.invites)
    }

    async fn respond_to_invite(
        &self,
        _access_token: &str,
        invite_id: &str,
        accept: bool,
    ) -> Result<(), InfraError> {
        let action = if accept { "accept" } else { "decline" };
        self.record(format!("{action} {invite_id}"))
    }
}
