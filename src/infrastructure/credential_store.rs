use crate::domain::models::AuthToken;
use crate::infrastructure::error::InfraError;
use std::sync::{Mutex, MutexGuard};

pub const DEFAULT_KEYRING_SERVICE: &str = "swamp.auth.token";

/// Persisted bearer token storage. A missing entry means unauthenticated.
pub trait CredentialStore: Send + Sync {
    fn save_token(&self, token: &AuthToken) -> Result<(), InfraError>;
    fn load_token(&self) -> Result<Option<AuthToken>, InfraError>;
    fn delete_token(&self) -> Result<(), InfraError>;
}

/// Token kept in the OS keyring under `service`/`account` as JSON. A bare
/// token string (as the web client keeps in local storage) is also accepted.
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service: String,
    account: String,
}

impl KeyringCredentialStore {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, InfraError> {
        keyring::Entry::new(&self.service, &self.account).map_err(keyring_error)
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new(DEFAULT_KEYRING_SERVICE, "default")
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn save_token(&self, token: &AuthToken) -> Result<(), InfraError> {
        let payload = serde_json::to_string(token)?;
        self.entry()?.set_password(&payload).map_err(keyring_error)
    }

    fn load_token(&self) -> Result<Option<AuthToken>, InfraError> {
        match self.entry()?.get_password() {
            Ok(payload) => Ok(decode_stored_token(&payload).filter(AuthToken::is_usable)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(keyring_error(error)),
        }
    }

    fn delete_token(&self) -> Result<(), InfraError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(keyring_error(error)),
        }
    }
}

fn keyring_error(error: keyring::Error) -> InfraError {
    InfraError::Credential(format!("keyring: {error}"))
}

fn decode_stored_token(payload: &str) -> Option<AuthToken> {
    let payload = payload.trim();
    if payload.starts_with('{') {
        return serde_json::from_str(payload).ok();
    }
    Some(AuthToken {
        access_token: payload.to_string(),
        user: None,
        saved_at: chrono::Utc::now(),
    })
}

#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    token: Mutex<Option<AuthToken>>,
}

impl InMemoryCredentialStore {
    pub fn with_token(token: AuthToken) -> Self {
        Self {
            token: Mutex::new(Some(token)),
        }
    }

    fn slot(&self) -> Result<MutexGuard<'_, Option<AuthToken>>, InfraError> {
        self.token
            .lock()
            .map_err(|error| InfraError::Credential(format!("token slot poisoned: {error}")))
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn save_token(&self, token: &AuthToken) -> Result<(), InfraError> {
        *self.slot()? = Some(token.clone());
        Ok(())
    }

    fn load_token(&self) -> Result<Option<AuthToken>, InfraError> {
        Ok(self.slot()?.clone().filter(AuthToken::is_usable))
    }

    fn delete_token(&self) -> Result<(), InfraError> {
        *self.slot()? = None;
        Ok(())
    }
}
