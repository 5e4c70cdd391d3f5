use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use shared::domain::UserProfile;
use storage::Vault;
use tokio::sync::Mutex;
use tracing::debug;

/// Credentials recovered from a previous run. The profile blob is optional:
/// an unreadable blob degrades to a token-only restore.
#[derive(Debug, Clone)]
pub struct PersistedCredentials {
    pub auth_token: String,
    pub profile: Option<UserProfile>,
}

/// Persistence seam for the single-slot credential record.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn save(&self, auth_token: &str, profile: &UserProfile) -> Result<()>;
    async fn load(&self) -> Result<Option<PersistedCredentials>>;
    async fn update_profile(&self, profile: &UserProfile) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

/// Store backed by the sqlite vault, shared by the messenger and drive
/// binaries so one sign-in covers both.
pub struct DurableCredentialStore {
    vault: Vault,
}

impl DurableCredentialStore {
    pub async fn initialize(database_url: &str) -> Result<Arc<Self>> {
        let vault = Vault::new(database_url)
            .await
            .context("failed to open the credential vault")?;
        Ok(Arc::new(Self { vault }))
    }
}

#[async_trait]
impl CredentialStore for DurableCredentialStore {
    async fn save(&self, auth_token: &str, profile: &UserProfile) -> Result<()> {
        let blob = serde_json::to_string(profile).context("failed to encode the profile")?;
        self.vault.save_credentials(auth_token, &blob).await
    }

    async fn load(&self) -> Result<Option<PersistedCredentials>> {
        let Some(stored) = self.vault.load_credentials().await? else {
            return Ok(None);
        };
        let profile = match serde_json::from_str::<UserProfile>(&stored.profile_json) {
            Ok(profile) => Some(profile),
            Err(err) => {
                debug!(error = %err, "credentials: stored profile blob is unreadable");
                None
            }
        };
        Ok(Some(PersistedCredentials {
            auth_token: stored.auth_token,
            profile,
        }))
    }

    async fn update_profile(&self, profile: &UserProfile) -> Result<()> {
        let blob = serde_json::to_string(profile).context("failed to encode the profile")?;
        let rows = self.vault.update_profile_json(&blob).await?;
        if rows == 0 {
            debug!("credentials: no stored record to carry the profile update");
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.vault.clear_credentials().await
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<(String, UserProfile)>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn save(&self, auth_token: &str, profile: &UserProfile) -> Result<()> {
        *self.slot.lock().await = Some((auth_token.to_string(), profile.clone()));
        Ok(())
    }

    async fn load(&self) -> Result<Option<PersistedCredentials>> {
        Ok(self
            .slot
            .lock()
            .await
            .as_ref()
            .map(|(auth_token, profile)| PersistedCredentials {
                auth_token: auth_token.clone(),
                profile: Some(profile.clone()),
            }))
    }

    async fn update_profile(&self, profile: &UserProfile) -> Result<()> {
        if let Some((_, stored)) = self.slot.lock().await.as_mut() {
            *stored = profile.clone();
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.slot.lock().await = None;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/credentials_tests.rs"]
mod tests;
