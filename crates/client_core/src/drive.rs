//! File listing state for the drive: the cached listing, the active view
//! and filters, and the multi-select set.
//!
//! Star toggles, folders, share links, and deletions are local mutations —
//! the server exposes no endpoints for them. Each one bumps a revision
//! counter, and a refresh snapshot fetched under an older revision is
//! discarded so it cannot roll those mutations back.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use shared::domain::{
    EncryptionStatus, FileId, FileItem, FileKind, ShareLink, SharePermission,
    DEFAULT_STORAGE_LIMIT_BYTES,
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::{ApiClient, UploadPayload};
use crate::projections::{self, DriveView, FileFilters};
use crate::session::SessionManager;
use crate::ClientEvent;

/// Knobs for a new share link. The prefilled access cap matches the share
/// dialog's default of 10 uses.
#[derive(Debug, Clone)]
pub struct ShareLinkOptions {
    pub permission: SharePermission,
    pub expires_at: Option<DateTime<Utc>>,
    pub password: Option<String>,
    pub max_access: Option<u32>,
}

impl Default for ShareLinkOptions {
    fn default() -> Self {
        Self {
            permission: SharePermission::View,
            expires_at: None,
            password: None,
            max_access: Some(10),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StorageUsage {
    pub used_bytes: u64,
    pub limit_bytes: u64,
}

impl StorageUsage {
    pub fn percent_used(&self) -> f64 {
        if self.limit_bytes == 0 {
            return 0.0;
        }
        (self.used_bytes as f64 / self.limit_bytes as f64) * 100.0
    }
}

struct DriveState {
    files: Vec<FileItem>,
    revision: u64,
    view: DriveView,
    filters: FileFilters,
    selection: HashSet<FileId>,
    uploading: bool,
    // Locally created entries get negative ids so they can never shadow a
    // server-assigned one.
    next_local_id: i64,
}

impl Default for DriveState {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            revision: 0,
            view: DriveView::default(),
            filters: FileFilters::default(),
            selection: HashSet::new(),
            uploading: false,
            next_local_id: -1,
        }
    }
}

pub struct DriveClient {
    api: Arc<ApiClient>,
    session: Arc<SessionManager>,
    inner: Mutex<DriveState>,
    events: broadcast::Sender<ClientEvent>,
}

impl DriveClient {
    pub fn new(api: Arc<ApiClient>, session: Arc<SessionManager>) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            api,
            session,
            inner: Mutex::new(DriveState::default()),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Reloads the listing from the server. A snapshot that raced a local
    /// mutation is discarded; a failed fetch keeps the cached listing and
    /// returns an empty result.
    pub async fn refresh(&self) -> Result<Vec<FileItem>> {
        self.session.require().await?;
        let snapshot_revision = { self.inner.lock().await.revision };
        let listing = match self.api.list_files().await {
            Ok(listing) => listing,
            Err(err) => {
                warn!(error = %err, "drive: listing refresh failed; keeping the cached listing");
                let _ = self.events.send(ClientEvent::Error(err.to_string()));
                return Ok(Vec::new());
            }
        };
        {
            let mut state = self.inner.lock().await;
            if state.revision != snapshot_revision {
                debug!(
                    snapshot_revision,
                    current_revision = state.revision,
                    "drive: discarding a stale listing snapshot"
                );
                return Ok(state.files.clone());
            }
            state.files = listing.clone();
        }
        let _ = self.events.send(ClientEvent::FilesRefreshed {
            count: listing.len(),
        });
        Ok(listing)
    }

    /// Pushes files to the drive and appends whatever the server reports
    /// back as created. The uploading flag is visible for the duration.
    pub async fn upload(&self, payloads: Vec<UploadPayload>) -> Result<Vec<FileItem>> {
        self.session.require().await?;
        if payloads.is_empty() {
            return Ok(Vec::new());
        }
        {
            self.inner.lock().await.uploading = true;
        }
        let outcome = self.api.upload_files(payloads).await;
        let mut state = self.inner.lock().await;
        state.uploading = false;
        let new_files = match outcome {
            Ok(new_files) => new_files,
            Err(err) => {
                drop(state);
                return Err(anyhow::Error::new(err).context("upload failed"));
            }
        };
        state.files.extend(new_files.iter().cloned());
        state.revision += 1;
        drop(state);
        let _ = self.events.send(ClientEvent::FilesUploaded {
            count: new_files.len(),
        });
        info!(count = new_files.len(), "drive: upload complete");
        Ok(new_files)
    }

    pub async fn is_uploading(&self) -> bool {
        self.inner.lock().await.uploading
    }

    /// Flips the star on a file. Returns the new value.
    pub async fn toggle_star(&self, file_id: FileId) -> Result<bool> {
        let mut state = self.inner.lock().await;
        let file = state
            .files
            .iter_mut()
            .find(|file| file.file_id == file_id)
            .ok_or_else(|| anyhow!("unknown file id {}", file_id.0))?;
        file.starred = !file.starred;
        let starred = file.starred;
        state.revision += 1;
        debug!(file_id = file_id.0, starred, "drive: star toggled");
        Ok(starred)
    }

    /// Mints a share link for a file and marks it shared. Links are purely
    /// client-side records; the server never sees them.
    pub async fn create_share_link(
        &self,
        file_id: FileId,
        options: ShareLinkOptions,
    ) -> Result<ShareLink> {
        let session = self.session.require().await?;
        let link = ShareLink {
            id: Uuid::new_v4().to_string(),
            file_id,
            url: format!("{}/s/{}", self.api.base_url(), Uuid::new_v4().simple()),
            expires_at: options.expires_at,
            access_count: 0,
            max_access: options.max_access,
            password: options.password,
            permissions: options.permission,
            created_at: Utc::now(),
            created_by: session.user_id,
        };
        {
            let mut state = self.inner.lock().await;
            let file = state
                .files
                .iter_mut()
                .find(|file| file.file_id == file_id)
                .ok_or_else(|| anyhow!("unknown file id {}", file_id.0))?;
            file.shared = true;
            file.share_links.push(link.clone());
            state.revision += 1;
        }
        let _ = self.events.send(ClientEvent::ShareLinkCreated {
            file_id,
            url: link.url.clone(),
        });
        info!(file_id = file_id.0, "drive: share link created");
        Ok(link)
    }

    /// Adds a folder entry to the listing. Folders exist only client-side.
    pub async fn create_folder(&self, name: &str) -> Result<FileItem> {
        let session = self.session.require().await?;
        let name = name.trim();
        if name.is_empty() {
            bail!("folder name must not be empty");
        }
        let now = Utc::now();
        let mut state = self.inner.lock().await;
        let file_id = FileId(state.next_local_id);
        state.next_local_id -= 1;
        let folder = FileItem {
            file_id,
            name: name.to_string(),
            kind: FileKind::Folder,
            size_bytes: 0,
            mime_type: None,
            created_at: now,
            modified_at: now,
            starred: false,
            shared: false,
            owner: session.username.clone(),
            path: format!("/{name}"),
            version: 1,
            encryption_status: EncryptionStatus::Encrypted,
            quantum_key_id: Some("1".to_string()),
            share_links: Vec::new(),
        };
        state.files.push(folder.clone());
        state.revision += 1;
        info!(file_id = file_id.0, name = %folder.name, "drive: folder created");
        Ok(folder)
    }

    /// Removes entries from the listing and clears the whole selection,
    /// matching the toolbar's behavior after a bulk delete.
    pub async fn delete_files(&self, file_ids: &[FileId]) -> Result<usize> {
        self.session.require().await?;
        let removed = {
            let mut state = self.inner.lock().await;
            let before = state.files.len();
            state.files.retain(|file| !file_ids.contains(&file.file_id));
            state.selection.clear();
            state.revision += 1;
            before - state.files.len()
        };
        info!(removed, "drive: entries deleted");
        Ok(removed)
    }

    pub async fn delete_selected(&self) -> Result<usize> {
        let selected: Vec<FileId> = {
            let state = self.inner.lock().await;
            state.selection.iter().copied().collect()
        };
        self.delete_files(&selected).await
    }

    /// Adds or removes a file from the multi-select set. Returns whether the
    /// file is selected afterwards. Ids not present in the listing are
    /// tolerated; they simply select nothing visible.
    pub async fn toggle_select(&self, file_id: FileId) -> bool {
        let mut state = self.inner.lock().await;
        if state.selection.remove(&file_id) {
            false
        } else {
            state.selection.insert(file_id);
            true
        }
    }

    pub async fn selection(&self) -> Vec<FileId> {
        let state = self.inner.lock().await;
        let mut selected: Vec<FileId> = state.selection.iter().copied().collect();
        selected.sort_by_key(|file_id| file_id.0);
        selected
    }

    pub async fn clear_selection(&self) {
        self.inner.lock().await.selection.clear();
    }

    pub async fn download(&self, file_id: FileId) -> Result<Vec<u8>> {
        self.session.require().await?;
        let bytes = self
            .api
            .download_file(file_id)
            .await
            .context("download failed")?;
        info!(file_id = file_id.0, bytes = bytes.len(), "drive: file downloaded");
        Ok(bytes)
    }

    pub async fn set_view(&self, view: DriveView) {
        self.inner.lock().await.view = view;
    }

    pub async fn set_filters(&self, filters: FileFilters) {
        self.inner.lock().await.filters = filters;
    }

    pub async fn files(&self) -> Vec<FileItem> {
        self.inner.lock().await.files.clone()
    }

    /// The listing as rendered: the active view's subset, narrowed by the
    /// search filters.
    pub async fn visible_files(&self) -> Vec<FileItem> {
        let state = self.inner.lock().await;
        let base = projections::apply_view(&state.files, state.view);
        projections::filter_files(&base, &state.filters)
    }

    pub async fn storage_usage(&self) -> StorageUsage {
        let used_bytes = {
            let state = self.inner.lock().await;
            projections::storage_used(&state.files)
        };
        let limit_bytes = self
            .session
            .profile()
            .await
            .map(|profile| profile.storage_limit_bytes)
            .unwrap_or(DEFAULT_STORAGE_LIMIT_BYTES);
        StorageUsage {
            used_bytes,
            limit_bytes,
        }
    }
}

#[cfg(test)]
#[path = "tests/drive_tests.rs"]
mod tests;
