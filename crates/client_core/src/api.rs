//! Typed HTTP surface over the auth, messages, and drive endpoints.

use reqwest::{
    multipart::{Form, Part},
    Client, Response,
};
use serde::de::DeserializeOwned;
use shared::domain::{Conversation, FileId, FileItem, Message, PeerUser, UserId};
use shared::error::ErrorBody;
use shared::protocol::{
    AuthResponse, ConversationEntry, FileRecord, LoginRequest, MessageRecord, ProfileResponse,
    RegisterRequest, SendMessageRequest, StartConversationRequest, StartConversationResponse,
    UploadResponse, UserEntry,
};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::ApiFailure;

/// One file to push to the drive. The part content type is guessed from the
/// file name; unknown extensions are sent without one.
#[derive(Debug, Clone)]
pub struct UploadPayload {
    pub filename: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadPayload {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        let filename = filename.into();
        let mime_type = mime_guess::from_path(&filename)
            .first()
            .map(|mime| mime.essence_str().to_string());
        Self {
            filename,
            mime_type,
            bytes,
        }
    }
}

/// Stateless request layer. The bearer token is the only piece of shared
/// state; the session manager sets and clears it.
pub struct ApiClient {
    http: Client,
    base_url: String,
    request_log: bool,
    auth_token: RwLock<Option<String>>,
}

impl ApiClient {
    pub fn new(base_url: &str, request_log: bool) -> anyhow::Result<Self> {
        let url = crate::config::validate_base_url(base_url)?;
        Ok(Self {
            http: Client::new(),
            base_url: url.as_str().trim_end_matches('/').to_string(),
            request_log,
            auth_token: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn set_auth_token(&self, token: &str) {
        *self.auth_token.write().await = Some(token.to_string());
    }

    pub async fn clear_auth_token(&self) {
        *self.auth_token.write().await = None;
    }

    pub async fn has_auth_token(&self) -> bool {
        self.auth_token.read().await.is_some()
    }

    /// Requests below this line never leave the process without a token.
    async fn bearer(&self) -> Result<String, ApiFailure> {
        self.auth_token
            .read()
            .await
            .clone()
            .ok_or(ApiFailure::NotAuthenticated)
    }

    fn trace(&self, method: &str, path: &str) {
        if self.request_log {
            debug!(%method, %path, "api: request");
        }
    }

    /// Non-success responses are turned into a status failure carrying the
    /// `detail` string the server attaches to rejections.
    async fn check(response: Response) -> Result<Response, ApiFailure> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.detail);
        Err(ApiFailure::Status {
            status: status.as_u16(),
            detail,
        })
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiFailure> {
        Self::check(response)
            .await?
            .json::<T>()
            .await
            .map_err(|err| ApiFailure::Decode(err.to_string()))
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ApiFailure> {
        self.trace("POST", "/auth/register");
        let response = self
            .http
            .post(format!("{}/auth/register", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(ApiFailure::Transport)?;
        Self::read_json(response).await
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, ApiFailure> {
        self.trace("POST", "/auth/login");
        let response = self
            .http
            .post(format!("{}/auth/login", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(ApiFailure::Transport)?;
        Self::read_json(response).await
    }

    pub async fn fetch_profile(&self) -> Result<ProfileResponse, ApiFailure> {
        let token = self.bearer().await?;
        self.trace("GET", "/auth/profile");
        let response = self
            .http
            .get(format!("{}/auth/profile", self.base_url))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(ApiFailure::Transport)?;
        Self::read_json(response).await
    }

    pub async fn list_conversations(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Conversation>, ApiFailure> {
        let token = self.bearer().await?;
        self.trace("GET", "/messages/conversations");
        let response = self
            .http
            .get(format!(
                "{}/messages/conversations/{}",
                self.base_url, user_id.0
            ))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(ApiFailure::Transport)?;
        let entries: Vec<ConversationEntry> = Self::read_json(response).await?;
        Ok(entries
            .into_iter()
            .filter_map(ConversationEntry::into_conversation)
            .collect())
    }

    pub async fn list_messages_with(&self, peer_id: UserId) -> Result<Vec<Message>, ApiFailure> {
        let token = self.bearer().await?;
        self.trace("GET", "/messages/messages_with");
        let response = self
            .http
            .get(format!(
                "{}/messages/messages_with/{}",
                self.base_url, peer_id.0
            ))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(ApiFailure::Transport)?;
        let records: Vec<MessageRecord> = Self::read_json(response).await?;
        Ok(records.into_iter().map(MessageRecord::into_message).collect())
    }

    pub async fn send_message(
        &self,
        receiver_id: UserId,
        content: &str,
    ) -> Result<Message, ApiFailure> {
        let token = self.bearer().await?;
        self.trace("POST", "/messages/send_message");
        let request = SendMessageRequest {
            receiver_id,
            content: content.to_string(),
        };
        let response = self
            .http
            .post(format!("{}/messages/send_message", self.base_url))
            .bearer_auth(&token)
            .json(&request)
            .send()
            .await
            .map_err(ApiFailure::Transport)?;
        let record: MessageRecord = Self::read_json(response).await?;
        Ok(record.into_message())
    }

    pub async fn list_available_users(
        &self,
        user_id: UserId,
    ) -> Result<Vec<PeerUser>, ApiFailure> {
        let token = self.bearer().await?;
        self.trace("GET", "/messages/available_users");
        let response = self
            .http
            .get(format!(
                "{}/messages/available_users/{}",
                self.base_url, user_id.0
            ))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(ApiFailure::Transport)?;
        let entries: Vec<UserEntry> = Self::read_json(response).await?;
        Ok(entries.into_iter().filter_map(UserEntry::into_peer).collect())
    }

    pub async fn start_conversation(
        &self,
        other_user_id: UserId,
    ) -> Result<StartConversationResponse, ApiFailure> {
        let token = self.bearer().await?;
        self.trace("POST", "/messages/start_conversation");
        let request = StartConversationRequest { other_user_id };
        let response = self
            .http
            .post(format!("{}/messages/start_conversation", self.base_url))
            .bearer_auth(&token)
            .json(&request)
            .send()
            .await
            .map_err(ApiFailure::Transport)?;
        Self::read_json(response).await
    }

    pub async fn list_files(&self) -> Result<Vec<FileItem>, ApiFailure> {
        let token = self.bearer().await?;
        self.trace("GET", "/drive/get");
        let response = self
            .http
            .get(format!("{}/drive/get", self.base_url))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(ApiFailure::Transport)?;
        let records: Vec<FileRecord> = Self::read_json(response).await?;
        Ok(records.into_iter().filter_map(FileRecord::into_item).collect())
    }

    pub async fn upload_files(
        &self,
        payloads: Vec<UploadPayload>,
    ) -> Result<Vec<FileItem>, ApiFailure> {
        let token = self.bearer().await?;
        self.trace("POST", "/drive/save");
        let mut form = Form::new();
        for payload in payloads {
            let mut part = Part::bytes(payload.bytes).file_name(payload.filename);
            if let Some(mime) = &payload.mime_type {
                part = part.mime_str(mime).map_err(|err| {
                    ApiFailure::Decode(format!("invalid mime type '{mime}': {err}"))
                })?;
            }
            form = form.part("files", part);
        }
        let response = self
            .http
            .post(format!("{}/drive/save", self.base_url))
            .bearer_auth(&token)
            .multipart(form)
            .send()
            .await
            .map_err(ApiFailure::Transport)?;
        let body: UploadResponse = Self::read_json(response).await?;
        Ok(body
            .new_files
            .into_iter()
            .filter_map(FileRecord::into_item)
            .collect())
    }

    pub async fn download_file(&self, file_id: FileId) -> Result<Vec<u8>, ApiFailure> {
        let token = self.bearer().await?;
        self.trace("GET", "/drive/download_encrypted");
        let response = self
            .http
            .get(format!(
                "{}/drive/download_encrypted/{}",
                self.base_url, file_id.0
            ))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(ApiFailure::Transport)?;
        let bytes = Self::check(response)
            .await?
            .bytes()
            .await
            .map_err(ApiFailure::Transport)?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
