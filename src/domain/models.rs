use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

const XP_DISPLAY_SECONDS: u64 = 4;
const EVENT_DISPLAY_SECONDS: u64 = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub title: String,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub create_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    pub assignee: Option<String>,
}

impl Task {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task.id")?;
        validate_non_empty(&self.title, "task.title")?;
        Ok(())
    }

    /// Open tasks whose due date lies before `today` in the user's zone.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.completed && self.due_date.is_some_and(|due| due < today)
    }

    pub fn to_draft(&self) -> TaskDraft {
        TaskDraft {
            title: self.title.clone(),
            description: self.description.clone(),
            due_date: self.due_date,
            priority: self.priority,
        }
    }
}

/// Client-side input for creating or editing a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub priority: Priority,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            due_date: None,
            priority: Priority::default(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.title, "task.title")
    }

    pub fn normalized(&self) -> Self {
        Self {
            title: self.title.trim().to_string(),
            description: self
                .description
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToOwned::to_owned),
            due_date: self.due_date,
            priority: self.priority,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Achievement {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default, deserialize_with = "deserialize_lenient_u32")]
    pub xp_reward: u32,
}

/// Award carried by task and session completion responses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionAward {
    pub xp_awarded: u32,
    pub achievements_earned: Vec<Achievement>,
}

impl CompletionAward {
    /// XP first, then achievements in the order the server listed them.
    pub fn notifications(&self, reason: &str) -> Vec<NotificationEvent> {
        let mut events = Vec::with_capacity(self.achievements_earned.len() + 1);
        if self.xp_awarded > 0 {
            events.push(NotificationEvent::Xp {
                xp_amount: self.xp_awarded,
                reason: Some(reason.to_string()),
            });
        }
        events.extend(
            self.achievements_earned
                .iter()
                .cloned()
                .map(NotificationEvent::Achievement),
        );
        events
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    Xp {
        xp_amount: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Achievement(Achievement),
    #[serde(rename = "levelup")]
    LevelUp { level: u32, level_name: String },
}

impl NotificationEvent {
    pub fn display_duration(&self) -> Duration {
        match self {
            Self::Xp { .. } => Duration::from_secs(XP_DISPLAY_SECONDS),
            Self::Achievement(_) | Self::LevelUp { .. } => Duration::from_secs(EVENT_DISPLAY_SECONDS),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Xp { .. } => "xp",
            Self::Achievement(_) => "achievement",
            Self::LevelUp { .. } => "levelup",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct XpState {
    #[serde(default, deserialize_with = "deserialize_lenient_u32")]
    pub total_xp: u32,
    #[serde(default, deserialize_with = "deserialize_lenient_u32")]
    pub level: u32,
    #[serde(default)]
    pub level_name: String,
    #[serde(default, deserialize_with = "deserialize_lenient_u32")]
    pub min_xp_for_level: u32,
    #[serde(default, deserialize_with = "deserialize_optional_bound")]
    pub max_xp_for_level: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_lenient_u32")]
    pub progress_percent: u32,
    #[serde(default, deserialize_with = "deserialize_lenient_u32")]
    pub xp_to_next_level: u32,
}

impl XpState {
    pub const MAX_LEVEL: u32 = 10;

    pub fn is_max_level(&self) -> bool {
        self.level >= Self::MAX_LEVEL
    }

    /// Clamps a server payload: a maxed-out level (or one without an upper
    /// bound) is always 100% with nothing left to earn.
    pub fn normalized(mut self) -> Self {
        if self.is_max_level() || self.max_xp_for_level.is_none() {
            self.max_xp_for_level = None;
            self.progress_percent = 100;
            self.xp_to_next_level = 0;
        } else {
            self.progress_percent = self.progress_percent.min(100);
        }
        self
    }

    pub fn xp_in_level(&self) -> u32 {
        self.total_xp.saturating_sub(self.min_xp_for_level)
    }

    pub fn xp_needed_for_level(&self) -> u32 {
        match self.max_xp_for_level {
            Some(max) if !self.is_max_level() => max.saturating_sub(self.min_xp_for_level),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    pub major: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_scalar")]
    pub year: Option<String>,
}

impl UserProfile {
    /// Key used to separate cached data between accounts.
    pub fn account_key(&self) -> String {
        self.id
            .as_deref()
            .or(self.email.as_deref())
            .or(self.username.as_deref())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or("default")
            .to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthToken {
    pub access_token: String,
    pub user: Option<UserProfile>,
    pub saved_at: DateTime<Utc>,
}

impl AuthToken {
    pub fn is_usable(&self) -> bool {
        !self.access_token.trim().is_empty()
    }

    pub fn account_key(&self) -> String {
        self.user
            .as_ref()
            .map(UserProfile::account_key)
            .unwrap_or_else(|| "default".to_string())
    }
}

/// Academic details a user can edit on their profile. Blank fields clear the
/// stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub major: String,
    pub year: String,
}

impl ProfileUpdate {
    pub fn normalized(&self) -> Self {
        Self {
            major: self.major.trim().to_string(),
            year: self.year.trim().to_string(),
        }
    }
}

/// Completed-task counts per day, oldest first, as the weekly chart shows them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyCompletions {
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_counts")]
    pub data: Vec<u32>,
}

impl DailyCompletions {
    pub fn validate(&self) -> Result<(), String> {
        if self.labels.len() != self.data.len() {
            return Err(format!(
                "daily completions has {} labels but {} values",
                self.labels.len(),
                self.data.len()
            ));
        }
        Ok(())
    }

    pub fn days(&self) -> impl Iterator<Item = (&str, u32)> + '_ {
        self.labels.iter().map(String::as_str).zip(self.data.iter().copied())
    }

    pub fn total(&self) -> u32 {
        self.data.iter().fold(0u32, |sum, count| sum.saturating_add(*count))
    }

    pub fn busiest_day(&self) -> Option<(&str, u32)> {
        self.days()
            .filter(|(_, count)| *count > 0)
            .fold(None, |best: Option<(&str, u32)>, day| match best {
                Some(current) if current.1 >= day.1 => Some(current),
                _ => Some(day),
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskStats {
    #[serde(default, deserialize_with = "deserialize_lenient_u32")]
    pub total_completed: u32,
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Integer(i64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            Self::Text(value) => value.trim().to_string(),
            Self::Integer(value) => value.to_string(),
        }
    }
}

/// Server ids arrive as integers or strings; both are held as strings.
pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let id = RawId::deserialize(deserializer)?.into_string();
    if id.is_empty() {
        return Err(serde::de::Error::custom("id must not be empty"));
    }
    Ok(id)
}

pub(crate) fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RawId>::deserialize(deserializer)?
        .map(RawId::into_string)
        .filter(|value| !value.is_empty()))
}

pub(crate) fn deserialize_optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty()))
}

pub(crate) fn deserialize_optional_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    parse_date_prefix(raw)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid date '{raw}'")))
}

pub(crate) fn deserialize_optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    parse_timestamp(raw)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
}

pub(crate) fn deserialize_lenient_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
    Ok(clamp_to_u32(value).unwrap_or(u32::MAX))
}

/// Free-form fields the server may store as text or as a number.
fn deserialize_optional_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_optional_id(deserializer)
}

fn deserialize_lenient_counts<'de, D>(deserializer: D) -> Result<Vec<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Option::<Vec<Option<f64>>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(values
        .into_iter()
        .map(|value| clamp_to_u32(value.unwrap_or(0.0)).unwrap_or(u32::MAX))
        .collect())
}

fn deserialize_optional_bound<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.and_then(clamp_to_u32))
}

fn clamp_to_u32(value: f64) -> Option<u32> {
    if value.is_nan() || value > u32::MAX as f64 {
        return None;
    }
    Some(value.max(0.0) as u32)
}

pub(crate) fn parse_date_prefix(value: &str) -> Option<NaiveDate> {
    let prefix = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed.and_utc());
        }
    }
    parse_date_prefix(value)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|value| value.and_utc())
}
