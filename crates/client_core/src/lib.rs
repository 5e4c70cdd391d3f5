use shared::domain::{FileId, Message, UserId};

pub mod api;
pub mod chat;
pub mod config;
pub mod credentials;
pub mod drive;
pub mod error;
pub mod projections;
pub mod session;

pub use api::{ApiClient, UploadPayload};
pub use chat::MessengerClient;
pub use config::{load_settings, Settings};
pub use credentials::{CredentialStore, DurableCredentialStore, MemoryCredentialStore};
pub use drive::{DriveClient, ShareLinkOptions, StorageUsage};
pub use error::{ApiFailure, ErrorCategory};
pub use projections::{DriveView, FileFilters};
pub use session::{ProfileUpdate, SessionManager};

/// State-change notifications published by the messenger and drive
/// controllers. Subscribers that fall behind simply miss events.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    ConversationsRefreshed { count: usize },
    AvailableUsersRefreshed { count: usize },
    ConversationSelected { peer_id: UserId },
    MessageHistoryApplied { peer_id: UserId, count: usize },
    MessageSent { message: Message },
    FilesRefreshed { count: usize },
    FilesUploaded { count: usize },
    ShareLinkCreated { file_id: FileId, url: String },
    Error(String),
}
