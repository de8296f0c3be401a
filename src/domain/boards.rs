use crate::domain::models::{
    deserialize_id, deserialize_optional_date, deserialize_optional_id, deserialize_optional_text,
    deserialize_optional_timestamp, Priority,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// What the signed-in user may do on a board. The server calls the creator
/// `owner` in member lists and `admin` in board lists; both manage the board.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum BoardRole {
    Owner,
    Admin,
    #[default]
    Member,
}

impl BoardRole {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "owner" => Self::Owner,
            "admin" => Self::Admin,
            _ => Self::Member,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }

    pub fn can_manage(self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }
}

impl<'de> Deserialize<'de> for BoardRole {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<String>::deserialize(deserializer)?
            .map(|value| Self::parse(&value))
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Board {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    pub description: Option<String>,
    #[serde(default)]
    pub role: BoardRole,
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub created_by: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoardDraft {
    pub name: String,
    pub description: Option<String>,
}

impl BoardDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("board.name must not be empty".to_string());
        }
        Ok(())
    }

    pub fn normalized(&self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            description: self
                .description
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToOwned::to_owned),
        }
    }
}

/// Column a board task sits in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum BoardTaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
}

impl BoardTaskStatus {
    pub const ALL: [Self; 3] = [Self::Todo, Self::InProgress, Self::Done];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "todo" | "to_do" => Some(Self::Todo),
            "in_progress" | "doing" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Todo => "To Do",
            Self::InProgress => "In Progress",
            Self::Done => "Done",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoardTask {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub title: String,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: BoardTaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    pub assigned_to: Option<String>,
}

/// Input for a new board task. It always lands in the `todo` column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoardTaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub priority: Priority,
    pub assigned_to: Option<String>,
}

impl BoardTaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            due_date: None,
            priority: Priority::default(),
            assigned_to: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("board task.title must not be empty".to_string());
        }
        Ok(())
    }

    pub fn normalized(&self) -> Self {
        let trimmed = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToOwned::to_owned)
        };
        Self {
            title: self.title.trim().to_string(),
            description: trimmed(&self.description),
            due_date: self.due_date,
            priority: self.priority,
            assigned_to: trimmed(&self.assigned_to),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoardMember {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    pub email: Option<String>,
    #[serde(default)]
    pub role: BoardRole,
}

impl BoardMember {
    pub fn display_name(&self) -> &str {
        self.username
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(self.id.as_str())
    }

    pub fn is_owner(&self) -> bool {
        self.role == BoardRole::Owner
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoardMembers {
    #[serde(default)]
    pub members: Vec<BoardMember>,
    /// Whether the signed-in user owns the board.
    #[serde(default)]
    pub is_owner: bool,
}

impl BoardMembers {
    pub fn find(&self, member: &str) -> Option<&BoardMember> {
        let member = member.trim();
        self.members.iter().find(|candidate| {
            candidate.id == member
                || candidate
                    .username
                    .as_deref()
                    .is_some_and(|name| name.eq_ignore_ascii_case(member))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoardInvite {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub board_name: String,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    pub invited_by: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    pub message: Option<String>,
}
