//! Session lifecycle: sign-in, restore from the vault, and sign-out.
//!
//! The server only verifies tokens via the profile endpoint, so every path
//! into an authenticated session runs the same verification step. A token
//! that fails it is cleared from the vault rather than retried.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use shared::domain::{
    Session, UserId, UserProfile, DEFAULT_STORAGE_LIMIT_BYTES, NEW_ACCOUNT_STORAGE_LIMIT_BYTES,
};
use shared::protocol::{LoginRequest, RegisterRequest};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::credentials::CredentialStore;

/// Partial update of the locally held account settings. `None` leaves a
/// field untouched; an empty AI key clears the stored one.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub ai_api_key: Option<String>,
    pub quantum_keys_enabled: Option<bool>,
}

#[derive(Default)]
struct SessionState {
    session: Option<Session>,
    profile: Option<UserProfile>,
}

pub struct SessionManager {
    api: Arc<ApiClient>,
    store: Arc<dyn CredentialStore>,
    inner: Mutex<SessionState>,
}

impl SessionManager {
    pub fn new(api: Arc<ApiClient>, store: Arc<dyn CredentialStore>) -> Arc<Self> {
        Arc::new(Self {
            api,
            store,
            inner: Mutex::new(SessionState::default()),
        })
    }

    /// Rehydrates the session from the vault. Absent credentials stay
    /// unauthenticated without touching the network; a persisted token that
    /// fails verification is cleared so the next start skips it too.
    pub async fn restore(&self) -> Result<bool> {
        let Some(persisted) = self.store.load().await? else {
            debug!("session: no persisted credentials");
            return Ok(false);
        };
        self.api.set_auth_token(&persisted.auth_token).await;
        let response = match self.api.fetch_profile().await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "session: persisted token failed verification; clearing it");
                self.teardown().await?;
                return Ok(false);
            }
        };

        let mut profile = response.into_profile();
        profile.storage_limit_bytes = DEFAULT_STORAGE_LIMIT_BYTES;
        let profile = merge_cached_settings(profile, persisted.profile);
        let session = Session {
            user_id: profile.user_id,
            email: profile.email.clone(),
            username: profile.username.clone(),
            auth_token: persisted.auth_token,
        };
        self.store.update_profile(&profile).await?;
        {
            let mut state = self.inner.lock().await;
            state.session = Some(session.clone());
            state.profile = Some(profile);
        }
        info!(user_id = session.user_id.0, "session: restored persisted session");
        Ok(true)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        let response = self
            .api
            .login(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await
            .context("login failed")?;
        let token = response
            .bearer_token()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("login succeeded but no access token was returned"))?;
        self.complete_authentication(token, email, response.user_id, DEFAULT_STORAGE_LIMIT_BYTES)
            .await
    }

    /// Registers an account and signs in. The register endpoint only returns
    /// the created user id, so a login with the same credentials follows
    /// unless the response unexpectedly carried a token already.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<Session> {
        let response = self
            .api
            .register(&RegisterRequest {
                username: username.to_string(),
                email: email.to_string(),
                password: password.to_string(),
            })
            .await
            .context("registration failed")?;
        if let Some(token) = response.bearer_token() {
            let token = token.to_string();
            return self
                .complete_authentication(
                    token,
                    email,
                    response.user_id,
                    NEW_ACCOUNT_STORAGE_LIMIT_BYTES,
                )
                .await;
        }

        debug!("session: register returned no token; signing in with the new credentials");
        let login_response = self
            .api
            .login(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await
            .context("sign-in after registration failed")?;
        let token = login_response
            .bearer_token()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("login succeeded but no access token was returned"))?;
        self.complete_authentication(
            token,
            email,
            login_response.user_id.or(response.user_id),
            NEW_ACCOUNT_STORAGE_LIMIT_BYTES,
        )
        .await
    }

    async fn complete_authentication(
        &self,
        token: String,
        email: &str,
        hinted_user_id: Option<UserId>,
        default_storage_limit: u64,
    ) -> Result<Session> {
        let cached = self.store.load().await?.and_then(|persisted| persisted.profile);

        // The token is persisted before verification; a failed profile
        // fetch below clears it again.
        let placeholder = UserProfile::new(hinted_user_id.unwrap_or(UserId(0)), email, "");
        self.store.save(&token, &placeholder).await?;
        self.api.set_auth_token(&token).await;

        let response = match self.api.fetch_profile().await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "session: profile verification failed; clearing credentials");
                self.teardown().await?;
                return Err(
                    anyhow::Error::new(err).context("profile verification failed after sign-in")
                );
            }
        };

        let mut profile = response.into_profile();
        profile.storage_limit_bytes = default_storage_limit;
        let profile = merge_cached_settings(profile, cached);
        let session = Session {
            user_id: profile.user_id,
            email: profile.email.clone(),
            username: profile.username.clone(),
            auth_token: token.clone(),
        };
        self.store.save(&token, &profile).await?;
        {
            let mut state = self.inner.lock().await;
            state.session = Some(session.clone());
            state.profile = Some(profile);
        }
        info!(
            user_id = session.user_id.0,
            username = %session.username,
            "session: authenticated"
        );
        Ok(session)
    }

    /// Drops the session locally. The server keeps no session state, so no
    /// request is made.
    pub async fn logout(&self) -> Result<()> {
        self.teardown().await?;
        info!("session: signed out");
        Ok(())
    }

    async fn teardown(&self) -> Result<()> {
        self.store.clear().await?;
        self.api.clear_auth_token().await;
        let mut state = self.inner.lock().await;
        state.session = None;
        state.profile = None;
        Ok(())
    }

    /// Applies account-settings changes locally and re-persists the profile
    /// blob. The server exposes no endpoint for these fields.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<UserProfile> {
        let (mut profile, mut session) = {
            let state = self.inner.lock().await;
            let session = state
                .session
                .clone()
                .ok_or_else(|| anyhow!("not logged in: no active session"))?;
            let profile = state.profile.clone().unwrap_or_else(|| {
                UserProfile::new(session.user_id, session.email.clone(), session.username.clone())
            });
            (profile, session)
        };

        if let Some(username) = update.username {
            profile.username = username;
        }
        if let Some(email) = update.email {
            profile.email = email;
        }
        if let Some(key) = update.ai_api_key {
            profile.ai_api_key = if key.is_empty() { None } else { Some(key) };
        }
        if let Some(enabled) = update.quantum_keys_enabled {
            profile.quantum_keys_enabled = enabled;
        }
        session.username = profile.username.clone();
        session.email = profile.email.clone();

        self.store.update_profile(&profile).await?;
        {
            let mut state = self.inner.lock().await;
            state.profile = Some(profile.clone());
            state.session = Some(session);
        }
        info!("session: profile settings updated");
        Ok(profile)
    }

    pub async fn current(&self) -> Option<Session> {
        self.inner.lock().await.session.clone()
    }

    pub async fn profile(&self) -> Option<UserProfile> {
        self.inner.lock().await.profile.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.lock().await.session.is_some()
    }

    pub async fn require(&self) -> Result<Session> {
        self.current()
            .await
            .ok_or_else(|| anyhow!("not logged in: no active session"))
    }
}

/// Local-only settings survive re-authentication as long as the account is
/// the same one the blob was written for.
fn merge_cached_settings(mut live: UserProfile, cached: Option<UserProfile>) -> UserProfile {
    if let Some(cached) = cached {
        if cached.user_id == live.user_id {
            live.ai_api_key = cached.ai_api_key;
            live.quantum_keys_enabled = cached.quantum_keys_enabled;
            live.storage_limit_bytes = cached.storage_limit_bytes;
        }
    }
    live
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
