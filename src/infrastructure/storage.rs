use crate::infrastructure::error::InfraError;
use rusqlite::Connection;
use std::path::Path;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");
pub const SCHEMA_VERSION: i32 = 1;

/// Creates the cache tables and stamps `user_version`. A database written by
/// a newer client is refused rather than silently downgraded.
pub fn initialize_database(path: &Path) -> Result<(), InfraError> {
    let connection = open_database(path)?;
    let version: i32 = connection.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version > SCHEMA_VERSION {
        return Err(InfraError::InvalidConfig(format!(
            "{} uses cache schema {version}; this client supports {SCHEMA_VERSION}",
            path.display()
        )));
    }
    connection.execute_batch(SCHEMA_SQL)?;
    connection.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

pub fn open_database(path: &Path) -> Result<Connection, InfraError> {
    let connection = Connection::open(path)?;
    connection.busy_timeout(std::time::Duration::from_secs(2))?;
    Ok(connection)
}
