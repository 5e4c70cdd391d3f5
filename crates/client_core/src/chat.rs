//! Conversation state for the messenger: the contact list, the selected
//! peer, and the visible message history.
//!
//! Selection changes are guarded by a generation counter. Every new
//! selection bumps it, and a history fetch only lands if the generation it
//! started under is still current, so a slow response for an abandoned
//! selection can never clobber the active one.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use shared::domain::{Conversation, Message, PeerUser, UserId};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::session::SessionManager;
use crate::ClientEvent;

#[derive(Default)]
struct ChatState {
    conversations: Vec<Conversation>,
    available_users: Vec<PeerUser>,
    selected_peer: Option<UserId>,
    selection_generation: u64,
    messages: Vec<Message>,
}

pub struct MessengerClient {
    api: Arc<ApiClient>,
    session: Arc<SessionManager>,
    inner: Mutex<ChatState>,
    events: broadcast::Sender<ClientEvent>,
}

impl MessengerClient {
    pub fn new(api: Arc<ApiClient>, session: Arc<SessionManager>) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            api,
            session,
            inner: Mutex::new(ChatState::default()),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Reloads the conversation list. A failed fetch degrades to an empty
    /// list so the caller always has something to render.
    pub async fn refresh_conversations(&self) -> Result<Vec<Conversation>> {
        let session = self.session.require().await?;
        let conversations = match self.api.list_conversations(session.user_id).await {
            Ok(conversations) => conversations,
            Err(err) => {
                warn!(error = %err, "chat: conversation refresh failed; showing an empty list");
                let _ = self.events.send(ClientEvent::Error(err.to_string()));
                Vec::new()
            }
        };
        {
            let mut state = self.inner.lock().await;
            state.conversations = conversations.clone();
        }
        let _ = self.events.send(ClientEvent::ConversationsRefreshed {
            count: conversations.len(),
        });
        Ok(conversations)
    }

    /// Reloads the users a new conversation can be started with.
    pub async fn refresh_available_users(&self) -> Result<Vec<PeerUser>> {
        let session = self.session.require().await?;
        let users = match self.api.list_available_users(session.user_id).await {
            Ok(users) => users,
            Err(err) => {
                warn!(error = %err, "chat: user refresh failed; showing an empty list");
                let _ = self.events.send(ClientEvent::Error(err.to_string()));
                Vec::new()
            }
        };
        {
            let mut state = self.inner.lock().await;
            state.available_users = users.clone();
        }
        let _ = self.events.send(ClientEvent::AvailableUsersRefreshed { count: users.len() });
        Ok(users)
    }

    /// Switches the active conversation. The visible history clears before
    /// the fetch so the previous peer's messages never bleed through.
    pub async fn select_conversation(&self, peer_id: UserId) -> Result<Vec<Message>> {
        self.session.require().await?;
        let generation = {
            let mut state = self.inner.lock().await;
            state.selected_peer = Some(peer_id);
            state.selection_generation += 1;
            state.messages.clear();
            state.selection_generation
        };
        let _ = self
            .events
            .send(ClientEvent::ConversationSelected { peer_id });
        self.load_history(peer_id, generation).await
    }

    /// Re-fetches history for the current selection, for polling callers.
    /// Does nothing when no conversation is selected.
    pub async fn refresh_selected_history(&self) -> Result<Vec<Message>> {
        self.session.require().await?;
        let (peer_id, generation) = {
            let state = self.inner.lock().await;
            match state.selected_peer {
                Some(peer_id) => (peer_id, state.selection_generation),
                None => return Ok(Vec::new()),
            }
        };
        self.load_history(peer_id, generation).await
    }

    async fn load_history(&self, peer_id: UserId, generation: u64) -> Result<Vec<Message>> {
        let history = match self.api.list_messages_with(peer_id).await {
            Ok(messages) => messages,
            Err(err) => {
                warn!(
                    peer_id = peer_id.0,
                    error = %err,
                    "chat: history fetch failed; showing an empty conversation"
                );
                let _ = self.events.send(ClientEvent::Error(err.to_string()));
                Vec::new()
            }
        };
        {
            let mut state = self.inner.lock().await;
            if state.selection_generation != generation || state.selected_peer != Some(peer_id) {
                debug!(
                    peer_id = peer_id.0,
                    "chat: discarding history for a superseded selection"
                );
                return Ok(Vec::new());
            }
            state.messages = history.clone();
        }
        let _ = self.events.send(ClientEvent::MessageHistoryApplied {
            peer_id,
            count: history.len(),
        });
        Ok(history)
    }

    /// Sends to the selected peer. Whitespace-only content is dropped
    /// without a request, mirroring the compose box.
    pub async fn send_message(&self, content: &str) -> Result<Option<Message>> {
        let session = self.session.require().await?;
        let content = content.trim();
        if content.is_empty() {
            return Ok(None);
        }
        let (peer_id, generation) = {
            let state = self.inner.lock().await;
            let peer_id = state
                .selected_peer
                .ok_or_else(|| anyhow!("no conversation selected"))?;
            (peer_id, state.selection_generation)
        };

        let mut message = self
            .api
            .send_message(peer_id, content)
            .await
            .context("failed to send the message")?;
        // Records missing a sender are attributed to the session user.
        if message.sender_id == UserId(0) {
            message.sender_id = session.user_id;
        }
        {
            let mut state = self.inner.lock().await;
            if state.selection_generation == generation {
                state.messages.push(message.clone());
            }
        }
        let _ = self.events.send(ClientEvent::MessageSent {
            message: message.clone(),
        });
        info!(receiver_id = peer_id.0, "chat: message sent");
        Ok(Some(message))
    }

    /// Opens (or reuses) a conversation with another user, selects it, and
    /// refreshes the conversation list to include the new entry.
    pub async fn start_conversation(&self, other_user_id: UserId) -> Result<UserId> {
        self.session.require().await?;
        let response = self
            .api
            .start_conversation(other_user_id)
            .await
            .context("failed to start the conversation")?;
        let peer_id = response
            .receiver_id
            .ok_or_else(|| anyhow!("server returned no conversation counterpart"))?;
        info!(peer_id = peer_id.0, "chat: conversation started");
        self.select_conversation(peer_id).await?;
        self.refresh_conversations().await?;
        Ok(peer_id)
    }

    pub async fn conversations(&self) -> Vec<Conversation> {
        self.inner.lock().await.conversations.clone()
    }

    pub async fn available_users(&self) -> Vec<PeerUser> {
        self.inner.lock().await.available_users.clone()
    }

    pub async fn selected_peer(&self) -> Option<UserId> {
        self.inner.lock().await.selected_peer
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.inner.lock().await.messages.clone()
    }
}

#[cfg(test)]
#[path = "tests/chat_tests.rs"]
mod tests;
