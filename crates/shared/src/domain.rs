use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(UserId);
id_newtype!(MessageId);
id_newtype!(FileId);

/// Storage quota applied when the server reports none.
pub const DEFAULT_STORAGE_LIMIT_BYTES: u64 = 100 * 1024 * 1024 * 1024;

/// Quota granted to freshly registered accounts.
pub const NEW_ACCOUNT_STORAGE_LIMIT_BYTES: u64 = 15 * 1024 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    #[default]
    File,
    Folder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionStatus {
    Encrypted,
    #[default]
    Unencrypted,
    Processing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SharePermission {
    #[default]
    View,
    Download,
    Edit,
}

/// The authenticated identity for the current run. Exactly one exists while
/// logged in; none otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub email: String,
    pub username: String,
    pub auth_token: String,
}

/// Profile blob cached in the credential vault alongside the token. The
/// first three fields come from the profile endpoint; the rest are
/// account-local settings the server has no endpoint for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_api_key: Option<String>,
    #[serde(default)]
    pub quantum_keys_enabled: bool,
    #[serde(default = "default_storage_limit")]
    pub storage_limit_bytes: u64,
}

fn default_storage_limit() -> u64 {
    DEFAULT_STORAGE_LIMIT_BYTES
}

impl UserProfile {
    pub fn new(user_id: UserId, email: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id,
            email: email.into(),
            username: username.into(),
            ai_api_key: None,
            quantum_keys_enabled: false,
            storage_limit_bytes: DEFAULT_STORAGE_LIMIT_BYTES,
        }
    }
}

/// A flattened 1:1 conversation with another user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub peer_id: UserId,
    pub display_name: String,
}

/// Another account that can be messaged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerUser {
    pub user_id: UserId,
    pub username: String,
}

/// Immutable once created; ordering is by creation time. Whether a message
/// is "mine" is derived by comparing `sender_id` to the session user, never
/// stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLink {
    pub id: String,
    pub file_id: FileId,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub access_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_access: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub permissions: SharePermission,
    pub created_at: DateTime<Utc>,
    pub created_by: UserId,
}

/// A file or folder entry in the drive listing. The authoritative copy lives
/// server-side; local state is a best-effort cache. Encryption fields are
/// opaque metadata carried for display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileItem {
    pub file_id: FileId,
    pub name: String,
    pub kind: FileKind,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub starred: bool,
    pub shared: bool,
    pub owner: String,
    pub path: String,
    pub version: u32,
    pub encryption_status: EncryptionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantum_key_id: Option<String>,
    #[serde(default)]
    pub share_links: Vec<ShareLink>,
}
