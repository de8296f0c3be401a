use crate::application::store::{Action, AppStore};
use crate::domain::models::{AuthToken, ProfileUpdate, UserProfile};
use crate::infrastructure::api_client::{LoginRequest, RegisterRequest, SwampApi};
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Owns the bearer token: sign-in, sign-out and the 401 handling every
/// authenticated call shares.
pub struct SessionManager {
    api: Arc<dyn SwampApi>,
    credential_store: Arc<dyn CredentialStore>,
    store: Arc<AppStore>,
    now_provider: NowProvider,
}

impl SessionManager {
    pub fn new(
        api: Arc<dyn SwampApi>,
        credential_store: Arc<dyn CredentialStore>,
        store: Arc<AppStore>,
    ) -> Self {
        Self {
            api,
            credential_store,
            store,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthToken, InfraError> {
        let response = self
            .api
            .login(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await
            .inspect_err(|error| tracing::warn!(%error, "login failed"))?;

        let user = response.user.or_else(|| {
            Some(UserProfile {
                id: None,
                email: Some(email.trim().to_string()),
                username: None,
                major: None,
                year: None,
            })
        });
        let token = AuthToken {
            access_token: response.access_token,
            user: user.clone(),
            saved_at: (self.now_provider)(),
        };
        self.credential_store.save_token(&token)?;
        self.store.dispatch(Action::SignedIn(user))?;
        tracing::info!(account = %token.account_key(), "signed in");
        Ok(token)
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        username: Option<&str>,
    ) -> Result<String, InfraError> {
        self.api
            .register(&RegisterRequest {
                email: email.to_string(),
                password: password.to_string(),
                username: username.map(ToOwned::to_owned),
            })
            .await
            .inspect_err(|error| tracing::warn!(%error, "registration failed"))
    }

    /// Server logout is best effort; the local token is always dropped.
    pub async fn logout(&self) -> Result<bool, InfraError> {
        let Some(token) = self.credential_store.load_token()? else {
            self.store.dispatch(Action::SignedOut)?;
            return Ok(false);
        };
        if let Err(error) = self.api.logout(&token.access_token).await {
            tracing::warn!(%error, "server logout failed; clearing local token anyway");
        }
        self.credential_store.delete_token()?;
        self.store.dispatch(Action::SignedOut)?;
        tracing::info!(account = %token.account_key(), "signed out");
        Ok(true)
    }

    /// Saves major and year on the server, then mirrors them into the stored
    /// token. Identity fields the server leaves out keep their local values.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, InfraError> {
        let Some(mut token) = self.credential_store.load_token()? else {
            return Err(InfraError::Unauthorized(
                "not signed in; run `swamp login`".to_string(),
            ));
        };
        let update = update.normalized();
        let returned = match self.api.update_profile(&token.access_token, &update).await {
            Ok(user) => user,
            Err(error) => {
                tracing::warn!(%error, "profile update failed");
                self.note_failure(&error);
                return Err(error);
            }
        };

        let mut user = token.user.take().unwrap_or_default();
        user.id = user.id.or(returned.id);
        user.email = user.email.or(returned.email);
        user.username = returned.username.or(user.username);
        user.major = returned
            .major
            .or_else(|| Some(update.major.clone()).filter(|value| !value.is_empty()));
        user.year = returned
            .year
            .or_else(|| Some(update.year.clone()).filter(|value| !value.is_empty()));

        token.user = Some(user.clone());
        self.credential_store.save_token(&token)?;
        self.store.dispatch(Action::SignedIn(Some(user.clone())))?;
        tracing::info!(account = %token.account_key(), "profile updated");
        Ok(user)
    }

    pub fn current_token(&self) -> Result<Option<AuthToken>, InfraError> {
        self.credential_store.load_token()
    }

    /// Bearer token for the next request, or AuthFailure before any I/O.
    pub fn access_token(&self) -> Result<String, InfraError> {
        self.credential_store
            .load_token()?
            .map(|token| token.access_token)
            .ok_or_else(|| InfraError::Unauthorized("not signed in; run `swamp login`".to_string()))
    }

    pub fn account_key(&self) -> Result<String, InfraError> {
        Ok(self
            .credential_store
            .load_token()?
            .map(|token| token.account_key())
            .unwrap_or_else(|| "default".to_string()))
    }

    /// A 401 means the stored token is dead; forget it so the next call
    /// fails fast instead of hitting the server again.
    pub fn note_failure(&self, error: &InfraError) {
        if !matches!(error, InfraError::Unauthorized(_)) {
            return;
        }
        if let Err(delete_error) = self.credential_store.delete_token() {
            tracing::warn!(error = %delete_error, "failed to clear rejected token");
        }
        if let Err(dispatch_error) = self.store.dispatch(Action::SignedOut) {
            tracing::warn!(error = %dispatch_error, "failed to reset state after 401");
        }
        tracing::warn!(%error, "access token rejected; signed out");
    }
}
