//! Pure projections over cached listings. Lists are small enough that each
//! call recomputes from scratch instead of maintaining indexes.

use shared::domain::{Conversation, FileItem, FileKind, PeerUser};

/// The recent view shows at most this many entries, newest first.
pub const RECENT_WINDOW: usize = 10;

/// Base subsets of the file listing, mirroring the drive's sidebar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriveView {
    #[default]
    All,
    Starred,
    Recent,
    Shared,
}

/// Search criteria applied on top of the active view. All predicates must
/// hold for an entry to stay visible.
#[derive(Debug, Clone, Default)]
pub struct FileFilters {
    /// Case-insensitive substring match on the file name.
    pub query: String,
    pub kind: Option<FileKind>,
    pub starred: Option<bool>,
    pub shared: Option<bool>,
}

pub fn apply_view(files: &[FileItem], view: DriveView) -> Vec<FileItem> {
    match view {
        DriveView::All => files.to_vec(),
        DriveView::Starred => starred_files(files),
        DriveView::Recent => recent_files(files),
        DriveView::Shared => shared_files(files),
    }
}

pub fn starred_files(files: &[FileItem]) -> Vec<FileItem> {
    files.iter().filter(|file| file.starred).cloned().collect()
}

pub fn shared_files(files: &[FileItem]) -> Vec<FileItem> {
    files.iter().filter(|file| file.shared).cloned().collect()
}

pub fn recent_files(files: &[FileItem]) -> Vec<FileItem> {
    let mut sorted = files.to_vec();
    sorted.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
    sorted.truncate(RECENT_WINDOW);
    sorted
}

pub fn filter_files(files: &[FileItem], filters: &FileFilters) -> Vec<FileItem> {
    let query = filters.query.trim().to_lowercase();
    files
        .iter()
        .filter(|file| {
            if !query.is_empty() && !file.name.to_lowercase().contains(&query) {
                return false;
            }
            if let Some(kind) = filters.kind {
                if file.kind != kind {
                    return false;
                }
            }
            if let Some(starred) = filters.starred {
                if file.starred != starred {
                    return false;
                }
            }
            if let Some(shared) = filters.shared {
                if file.shared != shared {
                    return false;
                }
            }
            true
        })
        .cloned()
        .collect()
}

pub fn filter_conversations(conversations: &[Conversation], query: &str) -> Vec<Conversation> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return conversations.to_vec();
    }
    conversations
        .iter()
        .filter(|conversation| conversation.display_name.to_lowercase().contains(&query))
        .cloned()
        .collect()
}

pub fn filter_users(users: &[PeerUser], query: &str) -> Vec<PeerUser> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return users.to_vec();
    }
    users
        .iter()
        .filter(|user| user.username.to_lowercase().contains(&query))
        .cloned()
        .collect()
}

/// Bytes held in the listing; folders carry no size of their own.
pub fn storage_used(files: &[FileItem]) -> u64 {
    files.iter().map(|file| file.size_bytes).sum()
}
