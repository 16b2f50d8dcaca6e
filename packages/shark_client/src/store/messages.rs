use tracing::debug;

use super::{LoadState, OnFailure, Snapshot, Ticket};
use crate::api::ApiClient;
use crate::error::{SyncError, TransportError, ValidationError};
use crate::models::{Message, PushEvent};
use crate::observable::Subscription;

/// Message history of one open conversation.
///
/// Messages are appended in arrival order after the last snapshot. A pushed
/// message whose id is already present is ignored, so replays are harmless.
/// Sending does not insert anything locally: the message shows up once the
/// backend echoes it over the push channel.
///
/// Messages pushed while a load is in flight are remembered with the ticket
/// that was pending at the time. When that load (or an earlier one) lands, the
/// ones missing from the snapshot are appended again after it.
pub struct ConversationStore {
    chat_id: i64,
    snapshot: Snapshot<Vec<Message>>,
    pushed_during_load: Vec<(Ticket, Message)>,
}

impl ConversationStore {
    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            snapshot: Snapshot::new("messages"),
            pushed_during_load: Vec::new(),
        }
    }

    /// Store for a conversation that was open before. Results of loads issued
    /// up to `last` belong to the previous store and are ignored.
    pub fn reopen(chat_id: i64, last: Ticket) -> Self {
        let mut store = Self::new(chat_id);
        store.snapshot.generation_mut().skip_past(last);
        store
    }

    /// Most recently issued load ticket.
    pub fn last_ticket(&self) -> Option<Ticket> {
        self.snapshot.generation().latest()
    }

    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    pub fn messages(&self) -> Vec<Message> {
        self.snapshot.value().get()
    }

    pub fn len(&self) -> usize {
        self.snapshot.value().peek().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state(&self) -> LoadState {
        self.snapshot.state()
    }

    pub fn subscribe(&self, callback: impl FnMut(&Vec<Message>) + Send + 'static) -> Subscription {
        self.snapshot.value().subscribe(callback)
    }

    pub fn subscribe_state(&self, callback: impl FnMut(&LoadState) + Send + 'static) -> Subscription {
        self.snapshot.subscribe_state(callback)
    }

    pub fn begin_load(&mut self) -> Ticket {
        self.snapshot.begin()
    }

    pub fn apply_load(
        &mut self,
        ticket: Ticket,
        result: Result<Vec<Message>, TransportError>,
    ) -> Result<(), SyncError> {
        let result = result.map(|mut messages| {
            for (pushed_at, message) in &self.pushed_during_load {
                if *pushed_at >= ticket && !messages.iter().any(|m| m.id == message.id) {
                    messages.push(message.clone());
                }
            }
            messages
        });
        self.pushed_during_load.retain(|(pushed_at, _)| *pushed_at > ticket);
        self.snapshot
            .apply(ticket, result, OnFailure::Clear, Vec::new)
    }

    pub async fn load(&mut self, api: &ApiClient) -> Result<(), SyncError> {
        let ticket = self.begin_load();
        let result = api.list_messages(self.chat_id).await;
        self.apply_load(ticket, result)
    }

    pub fn apply_push_event(&mut self, event: &PushEvent) -> bool {
        if !event.is_message() || event.chat_id != self.chat_id {
            return false;
        }
        let appended = self.snapshot.value_mut().update(|messages| {
            if messages.iter().any(|m| m.id == event.id) {
                return false;
            }
            messages.push(Message::from(event));
            true
        });
        if !appended {
            debug!(chat_id = self.chat_id, message_id = event.id, "duplicate push event");
        } else if let Some(pending) = self.snapshot.generation().pending() {
            self.pushed_during_load.push((pending, Message::from(event)));
        }
        appended
    }

    /// Trimmed, non-empty message text or [`ValidationError::EmptyMessage`].
    pub fn validate(text: &str) -> Result<&str, ValidationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyMessage);
        }
        Ok(text)
    }

    pub async fn send(&self, api: &ApiClient, text: &str) -> Result<Message, SyncError> {
        let text = Self::validate(text)?;
        Ok(api.send_message(self.chat_id, text).await?)
    }
}
