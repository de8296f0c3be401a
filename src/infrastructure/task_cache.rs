use crate::domain::models::Task;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::open_database;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedTasks {
    pub tasks: Vec<Task>,
    pub refreshed_at: DateTime<Utc>,
}

/// Last task list the server returned, kept per account for offline display.
pub trait TaskCacheRepository: Send + Sync {
    fn load(&self, account_key: &str) -> Result<Option<CachedTasks>, InfraError>;
    fn save(
        &self,
        account_key: &str,
        tasks: &[Task],
        refreshed_at: DateTime<Utc>,
    ) -> Result<(), InfraError>;
    fn clear(&self, account_key: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteTaskCacheRepository {
    db_path: PathBuf,
}

impl SqliteTaskCacheRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_database(&self.db_path)
    }
}

impl TaskCacheRepository for SqliteTaskCacheRepository {
    fn load(&self, account_key: &str) -> Result<Option<CachedTasks>, InfraError> {
        let connection = self.connect()?;
        let refreshed_at_raw: Option<String> = connection
            .query_row(
                "SELECT refreshed_at FROM task_cache_meta WHERE account_key = ?1",
                params![account_key],
                |row| row.get(0),
            )
            .optional()?;

        let Some(refreshed_at_raw) = refreshed_at_raw else {
            return Ok(None);
        };
        let refreshed_at = DateTime::parse_from_rfc3339(&refreshed_at_raw)
            .map_err(|error| {
                InfraError::InvalidConfig(format!(
                    "invalid task_cache_meta.refreshed_at '{}': {error}",
                    refreshed_at_raw
                ))
            })?
            .with_timezone(&Utc);

        let mut statement = connection.prepare(
            "SELECT payload FROM task_cache WHERE account_key = ?1 ORDER BY position ASC",
        )?;
        let payloads = statement
            .query_map(params![account_key], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let tasks = payloads
            .iter()
            .map(|payload| serde_json::from_str::<Task>(payload))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(CachedTasks {
            tasks,
            refreshed_at,
        }))
    }

    fn save(
        &self,
        account_key: &str,
        tasks: &[Task],
        refreshed_at: DateTime<Utc>,
    ) -> Result<(), InfraError> {
        let mut connection = self.connect()?;
        let transaction = connection.transaction()?;
        transaction.execute(
            "DELETE FROM task_cache WHERE account_key = ?1",
            params![account_key],
        )?;
        for (position, task) in tasks.iter().enumerate() {
            let payload = serde_json::to_string(task)?;
            transaction.execute(
                "INSERT INTO task_cache (account_key, position, task_id, payload)
                 VALUES (?1, ?2, ?3, ?4)",
                params![account_key, position as i64, task.id, payload],
            )?;
        }
        transaction.execute(
            "INSERT INTO task_cache_meta (account_key, refreshed_at)
             VALUES (?1, ?2)
             ON CONFLICT(account_key) DO UPDATE SET refreshed_at = excluded.refreshed_at",
            params![account_key, refreshed_at.to_rfc3339()],
        )?;
        transaction.commit()?;
        Ok(())
    }

    fn clear(&self, account_key: &str) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "DELETE FROM task_cache WHERE account_key = ?1",
            params![account_key],
        )?;
        connection.execute(
            "DELETE FROM task_cache_meta WHERE account_key = ?1",
            params![account_key],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTaskCacheRepository {
    entries: Mutex<HashMap<String, CachedTasks>>,
}

impl TaskCacheRepository for InMemoryTaskCacheRepository {
    fn load(&self, account_key: &str) -> Result<Option<CachedTasks>, InfraError> {
        let entries = self
            .entries
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("task cache lock poisoned: {error}")))?;
        Ok(entries.get(account_key).cloned())
    }

    fn save(
        &self,
        account_key: &str,
        tasks: &[Task],
        refreshed_at: DateTime<Utc>,
    ) -> Result<(), InfraError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("task cache lock poisoned: {error}")))?;
        entries.insert(
            account_key.to_string(),
            CachedTasks {
                tasks: tasks.to_vec(),
                refreshed_at,
            },
        );
        Ok(())
    }

    fn clear(&self, account_key: &str) -> Result<(), InfraError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("task cache lock poisoned: {error}")))?;
        entries.remove(account_key);
        Ok(())
    }
}
