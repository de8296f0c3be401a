use crate::domain::boards::{
    Board, BoardDraft, BoardInvite, BoardMembers, BoardTask, BoardTaskDraft, BoardTaskStatus,
};
use crate::domain::models::{
    deserialize_optional_id, Achievement, CompletionAward, DailyCompletions, ProfileUpdate, Task,
    TaskDraft, TaskStats, UserProfile, XpState,
};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginResponse {
    pub access_token: String,
    pub user: Option<UserProfile>,
}

/// Remote SwampScheduler API. Every authenticated call takes the bearer token
/// explicitly; the caller decides where it comes from.
#[async_trait]
pub trait SwampApi: Send + Sync {
    async fn health(&self) -> Result<String, InfraError>;

    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, InfraError>;

    async fn register(&self, request: &RegisterRequest) -> Result<String, InfraError>;

    async fn logout(&self, access_token: &str) -> Result<(), InfraError>;

    async fn start_session(&self, access_token: &str) -> Result<String, InfraError>;

    async fn complete_session(
        &self,
        access_token: &str,
        session_id: &str,
    ) -> Result<CompletionAward, InfraError>;

    async fn complete_task(
        &self,
        access_token: &str,
        task_id: &str,
    ) -> Result<CompletionAward, InfraError>;

    async fn fetch_xp(&self, access_token: &str) -> Result<XpState, InfraError>;

    async fn list_tasks(&self, access_token: &str) -> Result<Vec<Task>, InfraError>;

    async fn create_task(
        &self,
        access_token: &str,
        draft: &TaskDraft,
        create_date: DateTime<Utc>,
    ) -> Result<Task, InfraError>;

    async fn update_task(
        &self,
        access_token: &str,
        task_id: &str,
        draft: &TaskDraft,
    ) -> Result<Task, InfraError>;

    async fn delete_task(&self, access_token: &str, task_id: &str) -> Result<(), InfraError>;

    async fn list_achievements(&self, access_token: &str) -> Result<Vec<Achievement>, InfraError>;

    async fn task_stats(
        &self,
        access_token: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<TaskStats, InfraError>;

    async fn daily_completions(&self, access_token: &str) -> Result<DailyCompletions, InfraError>;

    async fn update_profile(
        &self,
        access_token: &str,
        update: &ProfileUpdate,
    ) -> Result<UserProfile, InfraError>;

    async fn list_boards(&self, access_token: &str) -> Result<Vec<Board>, InfraError>;

    async fn create_board(&self, access_token: &str, draft: &BoardDraft) -> Result<Board, InfraError>;

    async fn delete_board(&self, access_token: &str, board_id: &str) -> Result<(), InfraError>;

    async fn list_board_tasks(
        &self,
        access_token: &str,
        board_id: &str,
    ) -> Result<Vec<BoardTask>, InfraError>;

    async fn create_board_task(
        &self,
        access_token: &str,
        board_id: &str,
        draft: &BoardTaskDraft,
    ) -> Result<BoardTask, InfraError>;

    async fn update_board_task_status(
        &self,
        access_token: &str,
        board_id: &str,
        task_id: &str,
        status: BoardTaskStatus,
    ) -> Result<(), InfraError>;

    /// Returns the server's confirmation message.
    async fn invite_to_board(
        &self,
        access_token: &str,
        board_id: &str,
        username: &str,
    ) -> Result<String, InfraError>;

    async fn list_board_members(
        &self,
        access_token: &str,
        board_id: &str,
    ) -> Result<BoardMembers, InfraError>;

    async fn remove_board_member(
        &self,
        access_token: &str,
        board_id: &str,
        member_id: &str,
    ) -> Result<(), InfraError>;

    async fn list_invites(&self, access_token: &str) -> Result<Vec<BoardInvite>, InfraError>;

    /// Accepts or declines a pending board invite.
    async fn respond_to_invite(
        &self,
        access_token: &str,
        invite_id: &str,
        accept: bool,
    ) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestSwampApi {
    client: Client,
    base_url: Url,
}

impl ReqwestSwampApi {
    pub fn new(base_url: Url) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::Validation(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn ensure_token(access_token: &str) -> Result<(), InfraError> {
        if access_token.trim().is_empty() {
            return Err(InfraError::Unauthorized("no access token".to_string()));
        }
        Ok(())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, InfraError> {
        build_endpoint(&self.base_url, segments)
    }

    async fn send(&self, request: RequestBuilder, operation: &str) -> Result<String, InfraError> {
        let response = request
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("network error while {operation}: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Network(format!("failed reading {operation} response: {error}")))?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(InfraError::Unauthorized(error_message(status, &body)));
        }
        if !status.is_success() {
            return Err(InfraError::Rejected {
                status: status.as_u16(),
                message: error_message(status, &body),
            });
        }
        Ok(body)
    }

    async fn send_decoded<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        operation: &str,
    ) -> Result<T, InfraError> {
        let body = self.send(request, operation).await?;
        decode(&body, operation)
    }
}

#[derive(Debug, serde::Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, serde::Serialize)]
struct RegisterBody<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
}

#[derive(Debug, serde::Serialize)]
struct TaskBody<'a> {
    title: &'a str,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    due_date: Option<String>,
    priority: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    create_date: Option<String>,
}

impl<'a> TaskBody<'a> {
    fn from_draft(draft: &'a TaskDraft, create_date: Option<DateTime<Utc>>) -> Self {
        Self {
            title: draft.title.as_str(),
            description: draft.description.as_deref().unwrap_or(""),
            due_date: draft.due_date.map(|date| date.format("%Y-%m-%d").to_string()),
            priority: draft.priority.as_str(),
            create_date: create_date.map(|value| value.to_rfc3339()),
        }
    }
}

#[derive(Debug, serde::Serialize)]
struct BoardBody<'a> {
    name: &'a str,
    description: &'a str,
}

#[derive(Debug, serde::Serialize)]
struct BoardTaskBody<'a> {
    title: &'a str,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    due_date: Option<String>,
    priority: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    assigned_to: Option<&'a str>,
    status: &'static str,
}

impl<'a> BoardTaskBody<'a> {
    fn from_draft(draft: &'a BoardTaskDraft) -> Self {
        Self {
            title: draft.title.as_str(),
            description: draft.description.as_deref().unwrap_or(""),
            due_date: draft.due_date.map(|date| date.format("%Y-%m-%d").to_string()),
            priority: draft.priority.as_str(),
            assigned_to: draft.assigned_to.as_deref(),
            status: BoardTaskStatus::Todo.as_str(),
        }
    }
}

#[derive(Debug, serde::Serialize)]
struct StatusBody {
    status: &'static str,
}

#[derive(Debug, serde::Serialize)]
struct InviteBody<'a> {
    username: &'a str,
}

#[derive(Debug, serde::Deserialize)]
struct LoginPayload {
    access_token: String,
    #[serde(default)]
    user: Option<UserProfile>,
}

#[derive(Debug, serde::Deserialize)]
struct MessagePayload {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct StartSessionPayload {
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    session_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    id: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct CompletionPayload {
    #[serde(default)]
    xp_awarded: Option<i64>,
    #[serde(default)]
    achievements_earned: Option<Vec<Achievement>>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum TaskListPayload {
    Wrapped { tasks: Vec<Task> },
    Bare(Vec<Task>),
}

#[derive(Debug, serde::Deserialize)]
struct TaskPayload {
    task: Task,
}

#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum AchievementListPayload {
    Wrapped { achievements: Vec<Achievement> },
    Bare(Vec<Achievement>),
}

#[derive(Debug, serde::Deserialize)]
struct ProfilePayload {
    user: UserProfile,
}

#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum BoardListPayload {
    Wrapped { boards: Vec<Board> },
    Bare(Vec<Board>),
}

#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum BoardPayload {
    Wrapped { board: Board },
    Bare(Board),
}

#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum BoardTaskListPayload {
    Wrapped { tasks: Vec<BoardTask> },
    Bare(Vec<BoardTask>),
}

#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum BoardTaskPayload {
    Wrapped { task: BoardTask },
    Bare(BoardTask),
}

#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum InviteListPayload {
    Wrapped { invites: Vec<BoardInvite> },
    Bare(Vec<BoardInvite>),
}

#[derive(Debug, serde::Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

#[async_trait]
impl SwampApi for ReqwestSwampApi {
    async fn health(&self) -> Result<String, InfraError> {
        let endpoint = self.endpoint(&["health"])?;
        let payload: MessagePayload = self
            .send_decoded(self.client.get(endpoint), "checking api health")
            .await?;
        Ok(payload
            .status
            .or(payload.message)
            .unwrap_or_else(|| "ok".to_string()))
    }

    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, InfraError> {
        Self::ensure_non_empty(&request.email, "email")?;
        Self::ensure_non_empty(&request.password, "password")?;

        let endpoint = self.endpoint(&["auth", "login"])?;
        let body = LoginBody {
            email: request.email.trim(),
            password: &request.password,
        };
        let payload: LoginPayload = self
            .send_decoded(self.client.post(endpoint).json(&body), "logging in")
            .await?;
        if payload.access_token.trim().is_empty() {
            return Err(InfraError::MalformedResponse(
                "login response did not include access_token".to_string(),
            ));
        }
        Ok(LoginResponse {
            access_token: payload.access_token,
            user: payload.user,
        })
    }

    async fn register(&self, request: &RegisterRequest) -> Result<String, InfraError> {
        Self::ensure_non_empty(&request.email, "email")?;
        Self::ensure_non_empty(&request.password, "password")?;

        let endpoint = self.endpoint(&["auth", "register"])?;
        let body = RegisterBody {
            email: request.email.trim(),
            password: &request.password,
            username: request
                .username
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty()),
        };
        let payload: MessagePayload = self
            .send_decoded(self.client.post(endpoint).json(&body), "registering")
            .await?;
        Ok(payload
            .message
            .unwrap_or_else(|| "User successfully created".to_string()))
    }

    async fn logout(&self, access_token: &str) -> Result<(), InfraError> {
        Self::ensure_token(access_token)?;
        let endpoint = self.endpoint(&["auth", "logout"])?;
        self.send(self.client.post(endpoint).bearer_auth(access_token), "logging out")
            .await?;
        Ok(())
    }

    async fn start_session(&self, access_token: &str) -> Result<String, InfraError> {
        Self::ensure_token(access_token)?;
        let endpoint = self.endpoint(&["pomodoro", "start"])?;
        let body = self
            .send(
                self.client.post(endpoint).bearer_auth(access_token),
                "starting pomodoro session",
            )
            .await?;
        decode_session_id(&body)
    }

    async fn complete_session(
        &self,
        access_token: &str,
        session_id: &str,
    ) -> Result<CompletionAward, InfraError> {
        Self::ensure_token(access_token)?;
        Self::ensure_non_empty(session_id, "session id")?;
        let endpoint = self.endpoint(&["pomodoro", session_id.trim(), "complete"])?;
        let body = self
            .send(
                self.client.post(endpoint).bearer_auth(access_token),
                "completing pomodoro session",
            )
            .await?;
        decode_award(&body, "pomodoro completion")
    }

    async fn complete_task(
        &self,
        access_token: &str,
        task_id: &str,
    ) -> Result<CompletionAward, InfraError> {
        Self::ensure_token(access_token)?;
        Self::ensure_non_empty(task_id, "task id")?;
        let endpoint = self.endpoint(&["tasks", task_id.trim(), "complete"])?;
        let body = self
            .send(
                self.client.post(endpoint).bearer_auth(access_token),
                "completing task",
            )
            .await?;
        decode_award(&body, "task completion")
    }

    async fn fetch_xp(&self, access_token: &str) -> Result<XpState, InfraError> {
        Self::ensure_token(access_token)?;
        let endpoint = self.endpoint(&["xp"])?;
        let xp: XpState = self
            .send_decoded(self.client.get(endpoint).bearer_auth(access_token), "fetching xp")
            .await?;
        Ok(xp.normalized())
    }

    async fn list_tasks(&self, access_token: &str) -> Result<Vec<Task>, InfraError> {
        Self::ensure_token(access_token)?;
        let endpoint = self.endpoint(&["tasks"])?;
        let payload: TaskListPayload = self
            .send_decoded(self.client.get(endpoint).bearer_auth(access_token), "listing tasks")
            .await?;
        Ok(match payload {
            TaskListPayload::Wrapped { tasks } | TaskListPayload::Bare(tasks) => tasks,
        })
    }

    async fn create_task(
        &self,
        access_token: &str,
        draft: &TaskDraft,
        create_date: DateTime<Utc>,
    ) -> Result<Task, InfraError> {
        Self::ensure_token(access_token)?;
        Self::ensure_non_empty(&draft.title, "title")?;
        let endpoint = self.endpoint(&["tasks"])?;
        let body = TaskBody::from_draft(draft, Some(create_date));
        let payload: TaskPayload = self
            .send_decoded(
                self.client.post(endpoint).bearer_auth(access_token).json(&body),
                "creating task",
            )
            .await?;
        Ok(payload.task)
    }

    async fn update_task(
        &self,
        access_token: &str,
        task_id: &str,
        draft: &TaskDraft,
    ) -> Result<Task, InfraError> {
        Self::ensure_token(access_token)?;
        Self::ensure_non_empty(task_id, "task id")?;
        Self::ensure_non_empty(&draft.title, "title")?;
        let endpoint = self.endpoint(&["tasks", task_id.trim()])?;
        let body = TaskBody::from_draft(draft, None);
        let payload: TaskPayload = self
            .send_decoded(
                self.client.put(endpoint).bearer_auth(access_token).json(&body),
                "updating task",
            )
            .await?;
        Ok(payload.task)
    }

    async fn delete_task(&self, access_token: &str, task_id: &str) -> Result<(), InfraError> {
        Self::ensure_token(access_token)?;
        Self::ensure_non_empty(task_id, "task id")?;
        let endpoint = self.endpoint(&["tasks", task_id.trim()])?;
        self.send(
            self.client.delete(endpoint).bearer_auth(access_token),
            "deleting task",
        )
        .await?;
        Ok(())
    }

    async fn list_achievements(&self, access_token: &str) -> Result<Vec<Achievement>, InfraError> {
        Self::ensure_token(access_token)?;
        let endpoint = self.endpoint(&["achievements"])?;
        let payload: AchievementListPayload = self
            .send_decoded(
                self.client.get(endpoint).bearer_auth(access_token),
                "listing achievements",
            )
            .await?;
        Ok(match payload {
            AchievementListPayload::Wrapped { achievements }
            | AchievementListPayload::Bare(achievements) => achievements,
        })
    }

    async fn task_stats(
        &self,
        access_token: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<TaskStats, InfraError> {
        Self::ensure_token(access_token)?;
        if end_date < start_date {
            return Err(InfraError::Validation(
                "end_date must not be before start_date".to_string(),
            ));
        }
        let endpoint = self.endpoint(&["analytics", "tasks"])?;
        let request = self.client.get(endpoint).bearer_auth(access_token).query(&[
            ("start_date", start_date.format("%Y-%m-%d").to_string()),
            ("end_date", end_date.format("%Y-%m-%d").to_string()),
        ]);
        self.send_decoded(request, "fetching task stats").await
    }

    async fn daily_completions(&self, access_token: &str) -> Result<DailyCompletions, InfraError> {
        Self::ensure_token(access_token)?;
        let endpoint = self.endpoint(&["analytics", "daily-completions"])?;
        let body = self
            .send(
                self.client.get(endpoint).bearer_auth(access_token),
                "fetching daily completions",
            )
            .await?;
        decode_daily_completions(&body)
    }

    async fn update_profile(
        &self,
        access_token: &str,
        update: &ProfileUpdate,
    ) -> Result<UserProfile, InfraError> {
        Self::ensure_token(access_token)?;
        let endpoint = self.endpoint(&["user", "profile"])?;
        let payload: ProfilePayload = self
            .send_decoded(
                self.client.put(endpoint).bearer_auth(access_token).json(update),
                "updating profile",
            )
            .await?;
        Ok(payload.user)
    }

    async fn list_boards(&self, access_token: &str) -> Result<Vec<Board>, InfraError> {
        Self::ensure_token(access_token)?;
        let endpoint = self.endpoint(&["boards"])?;
        let payload: BoardListPayload = self
            .send_decoded(self.client.get(endpoint).bearer_auth(access_token), "listing boards")
            .await?;
        Ok(match payload {
            BoardListPayload::Wrapped { boards } | BoardListPayload::Bare(boards) => boards,
        })
    }

    async fn create_board(&self, access_token: &str, draft: &BoardDraft) -> Result<Board, InfraError> {
        Self::ensure_token(access_token)?;
        Self::ensure_non_empty(&draft.name, "board name")?;
        let endpoint = self.endpoint(&["boards"])?;
        let body = BoardBody {
            name: draft.name.as_str(),
            description: draft.description.as_deref().unwrap_or(""),
        };
        let payload: BoardPayload = self
            .send_decoded(
                self.client.post(endpoint).bearer_auth(access_token).json(&body),
                "creating board",
            )
            .await?;
        Ok(match payload {
            BoardPayload::Wrapped { board } | BoardPayload::Bare(board) => board,
        })
    }

    async fn delete_board(&self, access_token: &str, board_id: &str) -> Result<(), InfraError> {
        Self::ensure_token(access_token)?;
        Self::ensure_non_empty(board_id, "board id")?;
        let endpoint = self.endpoint(&["boards", board_id.trim()])?;
        self.send(
            self.client.delete(endpoint).bearer_auth(access_token),
            "deleting board",
        )
        .await?;
        Ok(())
    }

    async fn list_board_tasks(
        &self,
        access_token: &str,
        board_id: &str,
    ) -> Result<Vec<BoardTask>, InfraError> {
        Self::ensure_token(access_token)?;
        Self::ensure_non_empty(board_id, "board id")?;
        let endpoint = self.endpoint(&["boards", board_id.trim(), "tasks"])?;
        let payload: BoardTaskListPayload = self
            .send_decoded(
                self.client.get(endpoint).bearer_auth(access_token),
                "listing board tasks",
            )
            .await?;
        Ok(match payload {
            BoardTaskListPayload::Wrapped { tasks } | BoardTaskListPayload::Bare(tasks) => tasks,
        })
    }

    async fn create_board_task(
        &self,
        access_token: &str,
        board_id: &str,
        draft: &BoardTaskDraft,
    ) -> Result<BoardTask, InfraError> {
        Self::ensure_token(access_token)?;
        Self::ensure_non_empty(board_id, "board id")?;
        Self::ensure_non_empty(&draft.title, "title")?;
        let endpoint = self.endpoint(&["boards", board_id.trim(), "tasks"])?;
        let body = BoardTaskBody::from_draft(draft);
        let payload: BoardTaskPayload = self
            .send_decoded(
                self.client.post(endpoint).bearer_auth(access_token).json(&body),
                "creating board task",
            )
            .await?;
        Ok(match payload {
            BoardTaskPayload::Wrapped { task } | BoardTaskPayload::Bare(task) => task,
        })
    }

    async fn update_board_task_status(
        &self,
        access_token: &str,
        board_id: &str,
        task_id: &str,
        status: BoardTaskStatus,
    ) -> Result<(), InfraError> {
        Self::ensure_token(access_token)?;
        Self::ensure_non_empty(board_id, "board id")?;
        Self::ensure_non_empty(task_id, "task id")?;
        let endpoint = self.endpoint(&["boards", board_id.trim(), "tasks", task_id.trim()])?;
        let body = StatusBody {
            status: status.as_str(),
        };
        self.send(
            self.client.put(endpoint).bearer_auth(access_token).json(&body),
            "moving board task",
        )
        .await?;
        Ok(())
    }

    async fn invite_to_board(
        &self,
        access_token: &str,
        board_id: &str,
        username: &str,
    ) -> Result<String, InfraError> {
        Self::ensure_token(access_token)?;
        Self::ensure_non_empty(board_id, "board id")?;
        Self::ensure_non_empty(username, "username")?;
        let endpoint = self.endpoint(&["boards", board_id.trim(), "invite"])?;
        let body = InviteBody {
            username: username.trim(),
        };
        let response = self
            .send(
                self.client.post(endpoint).bearer_auth(access_token).json(&body),
                "inviting board member",
            )
            .await?;
        Ok(decode_message(&response).unwrap_or_else(|| format!("Invited {}", username.trim())))
    }

    async fn list_board_members(
        &self,
        access_token: &str,
        board_id: &str,
    ) -> Result<BoardMembers, InfraError> {
        Self::ensure_token(access_token)?;
        Self::ensure_non_empty(board_id, "board id")?;
        let endpoint = self.endpoint(&["boards", board_id.trim(), "members"])?;
        self.send_decoded(
            self.client.get(endpoint).bearer_auth(access_token),
            "listing board members",
        )
        .await
    }

    async fn remove_board_member(
        &self,
        access_token: &str,
        board_id: &str,
        member_id: &str,
    ) -> Result<(), InfraError> {
        Self::ensure_token(access_token)?;
        Self::ensure_non_empty(board_id, "board id")?;
        Self::ensure_non_empty(member_id, "member id")?;
        let endpoint = self.endpoint(&["boards", board_id.trim(), "members", member_id.trim()])?;
        self.send(
            self.client.delete(endpoint).bearer_auth(access_token),
            "removing board member",
        )
        .await?;
        Ok(())
    }

    async fn list_invites(&self, access_token: &str) -> Result<Vec<BoardInvite>, InfraError> {
        Self::ensure_token(access_token)?;
        let endpoint = self.endpoint(&["invites"])?;
        let payload: InviteListPayload = self
            .send_decoded(self.client.get(endpoint).bearer_auth(access_token), "listing invites")
            .await?;
        Ok(match payload {
            InviteListPayload::Wrapped { invites } | InviteListPayload::Bare(invites) => invites,
        })
    }

    async fn respond_to_invite(
        &self,
        access_token: &str,
        invite_id: &str,
        accept: bool,
    ) -> Result<(), InfraError> {
        Self::ensure_token(access_token)?;
        Self::ensure_non_empty(invite_id, "invite id")?;
        let action = if accept { "accept" } else { "decline" };
        let endpoint = self.endpoint(&["invites", invite_id.trim(), action])?;
        self.send(
            self.client.post(endpoint).bearer_auth(access_token),
            "answering invite",
        )
        .await?;
        Ok(())
    }
}

fn build_endpoint(base_url: &Url, segments: &[&str]) -> Result<Url, InfraError> {
    let mut url = base_url.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| InfraError::InvalidConfig("api base URL cannot be a base".to_string()))?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

fn decode<T: DeserializeOwned>(body: &str, operation: &str) -> Result<T, InfraError> {
    serde_json::from_str(body).map_err(|error| {
        InfraError::MalformedResponse(format!("invalid payload while {operation}: {error}; body={body}"))
    })
}

fn decode_session_id(body: &str) -> Result<String, InfraError> {
    let payload: StartSessionPayload = decode(body, "starting pomodoro session")?;
    payload.session_id.or(payload.id).ok_or_else(|| {
        InfraError::MalformedResponse(format!(
            "pomodoro start response did not include session_id; body={body}"
        ))
    })
}

fn decode_award(body: &str, operation: &str) -> Result<CompletionAward, InfraError> {
    // Some endpoints answer 204 or an empty body when nothing was awarded.
    if body.trim().is_empty() {
        return Ok(CompletionAward::default());
    }
    let payload: CompletionPayload = decode(body, operation)?;
    let xp_awarded = match payload.xp_awarded {
        None => 0,
        Some(value) => u32::try_from(value).map_err(|_| {
            InfraError::MalformedResponse(format!("{operation} returned invalid xp_awarded {value}"))
        })?,
    };
    Ok(CompletionAward {
        xp_awarded,
        achievements_earned: payload.achievements_earned.unwrap_or_default(),
    })
}

fn decode_daily_completions(body: &str) -> Result<DailyCompletions, InfraError> {
    let week: DailyCompletions = decode(body, "fetching daily completions")?;
    week.validate().map_err(InfraError::MalformedResponse)?;
    Ok(week)
}

fn decode_message(body: &str) -> Option<String> {
    serde_json::from_str::<MessagePayload>(body)
        .ok()
        .and_then(|payload| payload.message)
        .filter(|message| !message.trim().is_empty())
}

fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ErrorPayload>(body) {
        let error = payload.error.map(|value| match value {
            serde_json::Value::String(text) => text,
            other => other.to_string(),
        });
        match (error, payload.message) {
            (Some(error), Some(message)) => return format!("{error}: {message}"),
            (Some(error), None) => return error,
            (None, Some(message)) => return message,
            (None, None) => {}
        }
    }
    if body.trim().is_empty() {
        format!("http {}", status.as_u16())
    } else {
        format!("http {}; body={body}", status.as_u16())
    }
}
