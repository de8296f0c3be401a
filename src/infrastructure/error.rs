use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Credential store error: {0}")]
    Credential(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Authentication required: {0}")]
    Unauthorized(String),
    #[error("Server rejected request: http {status}; {message}")]
    Rejected { status: u16, message: String },
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Stale state: {0}")]
    StaleState(String),
    #[error("Operation cancelled: {0}")]
    Cancelled(String),
}

/// Coarse classification used by callers to decide how to surface a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NetworkFailure,
    AuthFailure,
    ValidationFailure,
    ServerRejection,
    RaceOrStaleState,
    Local,
}

impl InfraError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::NetworkFailure,
            Self::Unauthorized(_) => ErrorKind::AuthFailure,
            Self::Validation(_) => ErrorKind::ValidationFailure,
            Self::Rejected { .. } | Self::MalformedResponse(_) => ErrorKind::ServerRejection,
            Self::StaleState(_) => ErrorKind::RaceOrStaleState,
            Self::Io(_)
            | Self::Json(_)
            | Self::Sqlite(_)
            | Self::InvalidConfig(_)
            | Self::Credential(_)
            | Self::Cancelled(_) => ErrorKind::Local,
        }
    }
}

/// Failure of `POST /pomodoro/start`; the timer stays stopped.
pub type SessionStartError = InfraError;
