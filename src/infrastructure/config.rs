use crate::domain::pomodoro::DEFAULT_WORK_DURATION_SECONDS;
use crate::infrastructure::credential_store::DEFAULT_KEYRING_SERVICE;
use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use url::Url;

const APP_JSON: &str = "app.json";
const POMODORO_JSON: &str = "pomodoro.json";
const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api/";
const DEFAULT_RESET_DELAY_MS: u64 = 1_000;

const ENV_API_BASE_URL: &[&str] = &["SWAMP_API_BASE_URL"];
const ENV_WORK_DURATION: &[&str] = &["SWAMP_WORK_DURATION_SECONDS"];

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub api_base_url: Url,
    pub timezone: Tz,
    pub keyring_service: String,
    pub work_duration_seconds: u32,
    pub completion_reset_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: Url::parse(DEFAULT_API_BASE_URL).expect("valid default api url"),
            timezone: Tz::UTC,
            keyring_service: DEFAULT_KEYRING_SERVICE.to_string(),
            work_duration_seconds: DEFAULT_WORK_DURATION_SECONDS,
            completion_reset_delay_ms: DEFAULT_RESET_DELAY_MS,
        }
    }
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "SwampScheduler",
                "apiBaseUrl": DEFAULT_API_BASE_URL,
                "timezone": "UTC",
                "keyringService": DEFAULT_KEYRING_SERVICE
            }),
        ),
        (
            POMODORO_JSON,
            serde_json::json!({
                "schema": 1,
                "workDurationSeconds": DEFAULT_WORK_DURATION_SECONDS,
                "completionResetDelayMs": DEFAULT_RESET_DELAY_MS
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_client_config(config_dir: &Path) -> Result<ClientConfig, InfraError> {
    load_client_config_with_lookup(config_dir, |key| std::env::var(key).ok())
}

pub fn load_client_config_with_lookup<F>(
    config_dir: &Path,
    lookup: F,
) -> Result<ClientConfig, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let app = read_config(&config_dir.join(APP_JSON))?;
    let pomodoro = read_config(&config_dir.join(POMODORO_JSON))?;
    let defaults = ClientConfig::default();

    let api_base_url = match optional_lookup_value(&lookup, ENV_API_BASE_URL)
        .or_else(|| string_field(&app, "apiBaseUrl"))
    {
        Some(raw) => parse_base_url(&raw)?,
        None => defaults.api_base_url,
    };

    let timezone = match string_field(&app, "timezone") {
        Some(raw) => raw
            .parse::<Tz>()
            .map_err(|error| InfraError::InvalidConfig(format!("invalid timezone '{raw}': {error}")))?,
        None => defaults.timezone,
    };

    let keyring_service =
        string_field(&app, "keyringService").unwrap_or(defaults.keyring_service);

    let work_duration_seconds = match optional_lookup_value(&lookup, ENV_WORK_DURATION) {
        Some(raw) => parse_work_duration(&raw)?,
        None => match pomodoro.get("workDurationSeconds") {
            Some(value) => value
                .as_u64()
                .and_then(|value| u32::try_from(value).ok())
                .filter(|value| *value > 0)
                .ok_or_else(|| {
                    InfraError::InvalidConfig(
                        "workDurationSeconds must be a positive integer".to_string(),
                    )
                })?,
            None => defaults.work_duration_seconds,
        },
    };

    let completion_reset_delay_ms = pomodoro
        .get("completionResetDelayMs")
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(defaults.completion_reset_delay_ms);

    Ok(ClientConfig {
        api_base_url,
        timezone,
        keyring_service,
        work_duration_seconds,
        completion_reset_delay_ms,
    })
}

pub fn save_work_duration(config_dir: &Path, seconds: u32) -> Result<(), InfraError> {
    if seconds == 0 {
        return Err(InfraError::InvalidConfig(
            "workDurationSeconds must be > 0".to_string(),
        ));
    }

    let path = config_dir.join(POMODORO_JSON);
    let mut pomodoro = read_config(&path)?;
    let object = pomodoro.as_object_mut().ok_or_else(|| {
        InfraError::InvalidConfig(format!("invalid object structure in {}", path.display()))
    })?;
    object.insert(
        "workDurationSeconds".to_string(),
        serde_json::Value::from(seconds),
    );

    let formatted = serde_json::to_string_pretty(&pomodoro)?;
    fs::write(path, format!("{formatted}\n"))?;
    Ok(())
}

/// `Url::join` drops the last path segment unless the base ends with a slash.
pub fn parse_base_url(raw: &str) -> Result<Url, InfraError> {
    let trimmed = raw.trim();
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let url = Url::parse(&normalized)
        .map_err(|error| InfraError::InvalidConfig(format!("invalid apiBaseUrl '{raw}': {error}")))?;
    if url.cannot_be_a_base() {
        return Err(InfraError::InvalidConfig(format!(
            "apiBaseUrl '{raw}' cannot be a base url"
        )));
    }
    Ok(url)
}

fn parse_work_duration(raw: &str) -> Result<u32, InfraError> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|value| *value > 0)
        .ok_or_else(|| {
            InfraError::InvalidConfig(format!(
                "work duration must be a positive integer, got '{raw}'"
            ))
        })
}

fn string_field(value: &serde_json::Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn optional_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    for key in keys {
        if let Some(value) = lookup(key) {
            let normalized = value.trim();
            if !normalized.is_empty() {
                return Some(normalized.to_string());
            }
        }
    }
    None
}
