use tracing::{debug, warn};

use super::{LoadState, OnFailure, Snapshot, Ticket};
use crate::api::ApiClient;
use crate::error::{SyncError, TransportError, ValidationError};
use crate::models::{Contact, Conversation, ConversationKind, PushEvent};
use crate::observable::Subscription;

/// The conversation list, newest first as served by the backend.
pub struct ConversationListStore {
    snapshot: Snapshot<Vec<Conversation>>,
}

impl Default for ConversationListStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationListStore {
    pub fn new() -> Self {
        Self {
            snapshot: Snapshot::new("conversations"),
        }
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.snapshot.value().get()
    }

    pub fn get(&self, chat_id: i64) -> Option<&Conversation> {
        self.snapshot.value().peek().iter().find(|c| c.id == chat_id)
    }

    pub fn state(&self) -> LoadState {
        self.snapshot.state()
    }

    pub fn subscribe(
        &self,
        callback: impl FnMut(&Vec<Conversation>) + Send + 'static,
    ) -> Subscription {
        self.snapshot.value().subscribe(callback)
    }

    pub fn subscribe_state(&self, callback: impl FnMut(&LoadState) + Send + 'static) -> Subscription {
        self.snapshot.subscribe_state(callback)
    }

    pub fn begin_refresh(&mut self) -> Ticket {
        self.snapshot.begin()
    }

    /// Replace the list with a fetched snapshot. A failed fetch empties the
    /// list and marks the store failed.
    pub fn apply_refresh(
        &mut self,
        ticket: Ticket,
        result: Result<Vec<Conversation>, TransportError>,
    ) -> Result<(), SyncError> {
        self.snapshot
            .apply(ticket, result, OnFailure::Clear, Vec::new)
    }

    pub async fn refresh(&mut self, api: &ApiClient) -> Result<(), SyncError> {
        let ticket = self.begin_refresh();
        let result = api.list_conversations().await;
        self.apply_refresh(ticket, result)
    }

    /// Patch the preview of a listed conversation. Events for unknown chats
    /// are dropped; own messages never count as unread.
    pub fn apply_push_event(&mut self, event: &PushEvent) -> bool {
        if !event.is_message() {
            return false;
        }
        let changed = self.snapshot.value_mut().update(|list| {
            let Some(chat) = list.iter_mut().find(|c| c.id == event.chat_id) else {
                return false;
            };
            chat.last = event.text.clone();
            chat.time = event.time.clone();
            if !event.mine {
                chat.unread = chat.unread.saturating_add(1).max(1);
            }
            true
        });
        if !changed {
            debug!(chat_id = event.chat_id, "push event for unlisted conversation");
        }
        changed
    }

    /// Trimmed, non-empty title or [`ValidationError::EmptyTitle`].
    pub fn validate_title(title: &str) -> Result<&str, ValidationError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        Ok(title)
    }

    /// Create a conversation and reload the list so it shows up.
    pub async fn create(
        &mut self,
        api: &ApiClient,
        kind: ConversationKind,
        title: &str,
    ) -> Result<Conversation, SyncError> {
        let title = Self::validate_title(title)?;
        self.create_with(api, kind, title, false).await
    }

    /// Start (or reopen) a direct conversation with `contact`.
    pub async fn create_direct(
        &mut self,
        api: &ApiClient,
        contact: &Contact,
    ) -> Result<Conversation, SyncError> {
        let title = Self::validate_title(&contact.name)?;
        self.create_with(api, ConversationKind::Direct, title, contact.verified)
            .await
    }

    async fn create_with(
        &mut self,
        api: &ApiClient,
        kind: ConversationKind,
        title: &str,
        verified: bool,
    ) -> Result<Conversation, SyncError> {
        let created = api
            .create_conversation(kind, title, verified)
            .await
            .inspect_err(|e| warn!(%kind, error = %e, "create conversation failed"))?;
        self.refresh(api).await?;
        Ok(created)
    }
}
