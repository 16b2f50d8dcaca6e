//! Wire and domain types shared by the transport, push channel and stores.
//!
//! Enumerations travel as lowercase strings. Unknown values decode to a safe
//! default instead of failing the whole payload.

use serde::{Deserialize, Serialize};

/// Push event kind that carries a new message.
pub const MESSAGE_EVENT: &str = "message";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum ConversationKind {
    #[default]
    Direct,
    Group,
    Channel,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
            Self::Channel => "channel",
        }
    }
}

impl From<String> for ConversationKind {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "group" => Self::Group,
            "channel" => Self::Channel,
            _ => Self::Direct,
        }
    }
}

impl std::fmt::Display for ConversationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the conversation list, with a denormalized preview of the
/// most recent message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    #[serde(default)]
    pub kind: ConversationKind,
    pub title: String,
    /// Preview text of the most recent message
    #[serde(default)]
    pub last: String,
    /// Display timestamp of the most recent message
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub unread: u32,
    #[serde(default)]
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub chat_id: i64,
    /// Authored by the local user
    pub mine: bool,
    pub text: String,
    pub time: String,
    pub status: String,
}

impl From<&PushEvent> for Message {
    fn from(event: &PushEvent) -> Self {
        Self {
            id: event.id,
            chat_id: event.chat_id,
            mine: event.mine,
            text: event.text.clone(),
            time: event.time.clone(),
            status: event.status.clone(),
        }
    }
}

/// Inbound push frame. Only `kind == "message"` is actionable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub chat_id: i64,
    pub id: i64,
    pub mine: bool,
    pub text: String,
    pub time: String,
    pub status: String,
}

impl PushEvent {
    pub fn is_message(&self) -> bool {
        self.kind == MESSAGE_EVENT
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum CallType {
    #[default]
    Voice,
    Video,
}

impl From<String> for CallType {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case("video") {
            Self::Video
        } else {
            Self::Voice
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum CallDirection {
    Incoming,
    Outgoing,
    #[default]
    Missed,
}

impl From<String> for CallDirection {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "incoming" => Self::Incoming,
            "outgoing" => Self::Outgoing,
            _ => Self::Missed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallLogEntry {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub call_type: CallType,
    pub direction: CallDirection,
    pub time: String,
}

/// Body of an append-call-log request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCallLog {
    pub name: String,
    #[serde(rename = "type")]
    pub call_type: CallType,
    pub direction: CallDirection,
    pub time: String,
}

/// User-level toggles. Read/replace only, never patched field by field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub screen_lock: bool,
    pub read_receipts: bool,
    pub link_preview: bool,
    pub safety_alerts: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            screen_lock: true,
            read_receipts: true,
            link_preview: false,
            safety_alerts: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub name: String,
    pub username: String,
    #[serde(default)]
    pub verified: bool,
}

/// Request body for creating a conversation.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct NewConversation<'a> {
    pub kind: ConversationKind,
    pub title: &'a str,
    pub verified: bool,
}

/// Request body for sending a message.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct NewMessage<'a> {
    pub mine: bool,
    pub text: &'a str,
}
