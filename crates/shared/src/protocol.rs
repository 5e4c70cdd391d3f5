//! Wire shapes for the auth, messages, and drive endpoints.
//!
//! Response structs decode permissively: ids arrive as numbers or numeric
//! strings, timestamps as RFC 3339, naive ISO, or epoch seconds, and any
//! missing field falls back to a safe default instead of failing the fetch.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::{
    Conversation, EncryptionStatus, FileId, FileItem, FileKind, Message, MessageId, PeerUser,
    ShareLink, SharePermission, UserId, UserProfile,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub receiver_id: UserId,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartConversationRequest {
    pub other_user_id: UserId,
}

/// Success body of the login and register endpoints. Login carries
/// `access_token` (older deployments used `token`); register usually
/// carries only the created user id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthResponse {
    pub message: Option<String>,
    pub access_token: Option<String>,
    pub token: Option<String>,
    pub token_type: Option<String>,
    #[serde(deserialize_with = "opt_user_id")]
    pub user_id: Option<UserId>,
}

impl AuthResponse {
    pub fn bearer_token(&self) -> Option<&str> {
        self.access_token.as_deref().or(self.token.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileResponse {
    #[serde(deserialize_with = "require_user_id")]
    pub id: UserId,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
}

impl ProfileResponse {
    pub fn into_profile(self) -> UserProfile {
        UserProfile::new(self.id, self.email, self.username)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationEntry {
    #[serde(deserialize_with = "opt_user_id")]
    pub user_id: Option<UserId>,
    pub username: Option<String>,
}

impl ConversationEntry {
    /// Entries without a usable counterparty id are unselectable and dropped.
    pub fn into_conversation(self) -> Option<Conversation> {
        Some(Conversation {
            peer_id: self.user_id?,
            display_name: self.username.unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserEntry {
    #[serde(deserialize_with = "opt_user_id")]
    pub id: Option<UserId>,
    pub username: Option<String>,
}

impl UserEntry {
    pub fn into_peer(self) -> Option<PeerUser> {
        Some(PeerUser {
            user_id: self.id?,
            username: self.username.unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageRecord {
    #[serde(deserialize_with = "opt_message_id")]
    pub id: Option<MessageId>,
    #[serde(deserialize_with = "opt_user_id")]
    pub sender_id: Option<UserId>,
    #[serde(deserialize_with = "opt_user_id")]
    pub receiver_id: Option<UserId>,
    pub content: Option<String>,
    #[serde(deserialize_with = "opt_datetime")]
    pub created_at: Option<DateTime<Utc>>,
}

impl MessageRecord {
    pub fn into_message(self) -> Message {
        Message {
            message_id: self.id.unwrap_or(MessageId(0)),
            sender_id: self.sender_id.unwrap_or(UserId(0)),
            receiver_id: self.receiver_id.unwrap_or(UserId(0)),
            content: self.content.unwrap_or_default(),
            created_at: self.created_at.unwrap_or(DateTime::UNIX_EPOCH),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StartConversationResponse {
    pub message: Option<String>,
    #[serde(deserialize_with = "opt_user_id")]
    pub receiver_id: Option<UserId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareLinkRecord {
    pub id: Option<String>,
    #[serde(deserialize_with = "opt_file_id")]
    pub file_id: Option<FileId>,
    pub url: Option<String>,
    #[serde(deserialize_with = "opt_datetime")]
    pub expires_at: Option<DateTime<Utc>>,
    pub access_count: Option<u32>,
    pub max_access: Option<u32>,
    pub password: Option<String>,
    pub permissions: Option<String>,
    #[serde(deserialize_with = "opt_datetime")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "opt_user_id")]
    pub created_by: Option<UserId>,
}

impl ShareLinkRecord {
    pub fn into_link(self, fallback_file: FileId) -> ShareLink {
        ShareLink {
            id: self.id.unwrap_or_default(),
            file_id: self.file_id.unwrap_or(fallback_file),
            url: self.url.unwrap_or_default(),
            expires_at: self.expires_at,
            access_count: self.access_count.unwrap_or(0),
            max_access: self.max_access,
            password: self.password,
            permissions: parse_permission(self.permissions.as_deref()),
            created_at: self.created_at.unwrap_or(DateTime::UNIX_EPOCH),
            created_by: self.created_by.unwrap_or(UserId(0)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileRecord {
    #[serde(deserialize_with = "opt_file_id")]
    pub id: Option<FileId>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub size: Option<u64>,
    #[serde(alias = "mimeType")]
    pub mime_type: Option<String>,
    #[serde(alias = "createdAt", deserialize_with = "opt_datetime")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(alias = "modifiedAt", alias = "modified_at", deserialize_with = "opt_datetime")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(alias = "isStarred")]
    pub is_starred: Option<bool>,
    #[serde(alias = "isShared")]
    pub is_shared: Option<bool>,
    pub owner: Option<Value>,
    pub path: Option<String>,
    pub version: Option<u32>,
    #[serde(alias = "encryptionStatus")]
    pub encryption_status: Option<String>,
    #[serde(alias = "quantumKeyId")]
    pub quantum_key_id: Option<String>,
    #[serde(alias = "shareLinks")]
    pub share_links: Option<Vec<ShareLinkRecord>>,
}

impl FileRecord {
    /// Records without a usable id cannot be addressed and are dropped;
    /// everything else is defaulted per field.
    pub fn into_item(self) -> Option<FileItem> {
        let file_id = self.id?;
        let name = self
            .name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        let path = self.path.unwrap_or_else(|| format!("/{name}"));
        let share_links = self
            .share_links
            .unwrap_or_default()
            .into_iter()
            .map(|record| record.into_link(file_id))
            .collect();
        Some(FileItem {
            file_id,
            kind: parse_file_kind(self.kind.as_deref()),
            size_bytes: self.size.unwrap_or(0),
            mime_type: self.mime_type,
            created_at: self.created_at.unwrap_or(DateTime::UNIX_EPOCH),
            modified_at: self.updated_at.unwrap_or(DateTime::UNIX_EPOCH),
            starred: self.is_starred.unwrap_or(false),
            shared: self.is_shared.unwrap_or(false),
            owner: owner_name(self.owner.as_ref()),
            version: self.version.unwrap_or(1),
            encryption_status: parse_encryption_status(self.encryption_status.as_deref()),
            quantum_key_id: self.quantum_key_id,
            share_links,
            name,
            path,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(rename = "newFiles", alias = "new_files", default)]
    pub new_files: Vec<FileRecord>,
}

fn parse_file_kind(raw: Option<&str>) -> FileKind {
    match raw {
        Some(kind) if kind.eq_ignore_ascii_case("folder") => FileKind::Folder,
        _ => FileKind::File,
    }
}

fn parse_encryption_status(raw: Option<&str>) -> EncryptionStatus {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        Some("encrypted") => EncryptionStatus::Encrypted,
        Some("processing") => EncryptionStatus::Processing,
        _ => EncryptionStatus::Unencrypted,
    }
}

fn parse_permission(raw: Option<&str>) -> SharePermission {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        Some("download") => SharePermission::Download,
        Some("edit") => SharePermission::Edit,
        _ => SharePermission::View,
    }
}

fn owner_name(raw: Option<&Value>) -> String {
    match raw {
        Some(Value::String(name)) if !name.is_empty() => name.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => "unknown".to_string(),
    }
}

fn id_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(num) => num.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn opt_raw_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(id_from_value))
}

fn opt_user_id<'de, D>(deserializer: D) -> Result<Option<UserId>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(opt_raw_id(deserializer)?.map(UserId))
}

fn opt_message_id<'de, D>(deserializer: D) -> Result<Option<MessageId>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(opt_raw_id(deserializer)?.map(MessageId))
}

fn opt_file_id<'de, D>(deserializer: D) -> Result<Option<FileId>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(opt_raw_id(deserializer)?.map(FileId))
}

fn require_user_id<'de, D>(deserializer: D) -> Result<UserId, D::Error>
where
    D: Deserializer<'de>,
{
    opt_user_id(deserializer)?.ok_or_else(|| serde::de::Error::custom("missing user id"))
}

fn opt_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(datetime_from_value))
}

fn datetime_from_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => parse_datetime(text),
        Value::Number(num) => num.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    }
}

/// The backend emits naive ISO timestamps without an offset; treat those as UTC.
pub fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_decode_from_numbers_and_numeric_strings() {
        let by_number: ProfileResponse =
            serde_json::from_value(serde_json::json!({"id": 7, "email": "a@x.com"})).expect("profile");
        assert_eq!(by_number.id, UserId(7));
        assert_eq!(by_number.username, "");

        let by_string: ProfileResponse =
            serde_json::from_value(serde_json::json!({"id": "12", "username": "alice"}))
                .expect("profile");
        assert_eq!(by_string.id, UserId(12));
    }

    #[test]
    fn profile_without_id_is_rejected() {
        let result: Result<ProfileResponse, _> =
            serde_json::from_value(serde_json::json!({"email": "a@x.com"}));
        assert!(result.is_err());
    }

    #[test]
    fn login_token_prefers_access_token() {
        let body: AuthResponse = serde_json::from_value(serde_json::json!({
            "message": "Login successful",
            "access_token": "t1",
            "token": "legacy",
            "token_type": "bearer"
        }))
        .expect("auth body");
        assert_eq!(body.bearer_token(), Some("t1"));

        let legacy: AuthResponse =
            serde_json::from_value(serde_json::json!({"token": "t2"})).expect("auth body");
        assert_eq!(legacy.bearer_token(), Some("t2"));
    }

    #[test]
    fn sparse_file_record_gets_safe_defaults() {
        let record: FileRecord =
            serde_json::from_value(serde_json::json!({"id": "41"})).expect("file record");
        let item = record.into_item().expect("has id");
        assert_eq!(item.file_id, FileId(41));
        assert_eq!(item.name, "unknown");
        assert_eq!(item.size_bytes, 0);
        assert_eq!(item.kind, FileKind::File);
        assert!(!item.starred);
        assert!(!item.shared);
        assert_eq!(item.owner, "unknown");
        assert_eq!(item.path, "/unknown");
        assert_eq!(item.version, 1);
        assert_eq!(item.encryption_status, EncryptionStatus::Unencrypted);
        assert!(item.share_links.is_empty());
    }

    #[test]
    fn file_record_without_id_is_dropped() {
        let record: FileRecord =
            serde_json::from_value(serde_json::json!({"name": "notes.txt"})).expect("file record");
        assert!(record.into_item().is_none());
    }

    #[test]
    fn file_record_accepts_camel_case_aliases() {
        let record: FileRecord = serde_json::from_value(serde_json::json!({
            "id": 9,
            "name": "report.pdf",
            "mimeType": "application/pdf",
            "isStarred": true,
            "modifiedAt": "2024-01-15T10:30:00",
            "encryptionStatus": "encrypted"
        }))
        .expect("file record");
        let item = record.into_item().expect("has id");
        assert_eq!(item.mime_type.as_deref(), Some("application/pdf"));
        assert!(item.starred);
        assert_eq!(item.encryption_status, EncryptionStatus::Encrypted);
        assert_eq!(
            item.modified_at,
            parse_datetime("2024-01-15T10:30:00").expect("naive timestamp")
        );
    }

    #[test]
    fn naive_and_offset_timestamps_both_parse() {
        let naive = parse_datetime("2024-03-01T08:00:00.123").expect("naive");
        let offset = parse_datetime("2024-03-01T08:00:00.123+00:00").expect("rfc3339");
        assert_eq!(naive, offset);
        assert!(parse_datetime("not a time").is_none());
    }

    #[test]
    fn unknown_enum_strings_fall_back() {
        let record: FileRecord = serde_json::from_value(serde_json::json!({
            "id": 1,
            "type": "mystery",
            "encryption_status": "quantum-warp"
        }))
        .expect("file record");
        let item = record.into_item().expect("has id");
        assert_eq!(item.kind, FileKind::File);
        assert_eq!(item.encryption_status, EncryptionStatus::Unencrypted);
    }

    #[test]
    fn message_record_defaults_to_epoch() {
        let record: MessageRecord =
            serde_json::from_value(serde_json::json!({"id": 3, "content": "hi"}))
                .expect("message record");
        let message = record.into_message();
        assert_eq!(message.message_id, MessageId(3));
        assert_eq!(message.content, "hi");
        assert_eq!(message.created_at, DateTime::UNIX_EPOCH);
    }

    #[test]
    fn conversation_entry_without_id_is_dropped() {
        let entry: ConversationEntry =
            serde_json::from_value(serde_json::json!({"username": "ghost"})).expect("entry");
        assert!(entry.into_conversation().is_none());

        let entry: ConversationEntry =
            serde_json::from_value(serde_json::json!({"user_id": 4})).expect("entry");
        let conversation = entry.into_conversation().expect("has id");
        assert_eq!(conversation.peer_id, UserId(4));
        assert_eq!(conversation.display_name, "unknown");
    }

    #[test]
    fn upload_response_reads_new_files_key() {
        let body: UploadResponse = serde_json::from_value(serde_json::json!({
            "newFiles": [{"id": 1, "name": "a.txt"}, {"id": 2, "name": "b.txt"}]
        }))
        .expect("upload body");
        assert_eq!(body.new_files.len(), 2);
    }
}
