//! REST transport for the chat backend.
//!
//! Thin request/response wrappers: every call either returns the decoded body
//! or a [`TransportError`]. Retrying is the caller's business.

use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::SyncConfig;
use crate::error::TransportError;
use crate::models::{
    CallLogEntry, Contact, Conversation, ConversationKind, Message, NewCallLog, NewConversation,
    NewMessage, Settings,
};

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &SyncConfig) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(TransportError::from_reqwest)?;
        Ok(Self {
            http,
            base_url: config.http_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, TransportError> {
        let resp = request.send().await.map_err(TransportError::from_reqwest)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), %body, "backend rejected request");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = resp.bytes().await.map_err(TransportError::from_reqwest)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// GET /contacts, optionally filtered. A blank query is sent as no query.
    pub async fn search_contacts(&self, query: Option<&str>) -> Result<Vec<Contact>, TransportError> {
        let mut request = self.http.get(self.url("contacts"));
        if let Some(q) = query.map(str::trim).filter(|q| !q.is_empty()) {
            request = request.query(&[("q", q)]);
        }
        self.execute(request).await
    }

    /// GET /chats
    pub async fn list_conversations(&self) -> Result<Vec<Conversation>, TransportError> {
        self.execute(self.http.get(self.url("chats"))).await
    }

    /// POST /chats
    pub async fn create_conversation(
        &self,
        kind: ConversationKind,
        title: &str,
        verified: bool,
    ) -> Result<Conversation, TransportError> {
        let body = NewConversation {
            kind,
            title,
            verified,
        };
        self.execute(self.http.post(self.url("chats")).json(&body))
            .await
    }

    /// GET /chats/{id}/messages
    pub async fn list_messages(&self, chat_id: i64) -> Result<Vec<Message>, TransportError> {
        self.execute(self.http.get(self.url(&format!("chats/{chat_id}/messages"))))
            .await
    }

    /// POST /chats/{id}/messages. Always submitted as authored locally.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<Message, TransportError> {
        let body = NewMessage { mine: true, text };
        self.execute(
            self.http
                .post(self.url(&format!("chats/{chat_id}/messages")))
                .json(&body),
        )
        .await
    }

    /// GET /calls/logs
    pub async fn list_call_logs(&self) -> Result<Vec<CallLogEntry>, TransportError> {
        self.execute(self.http.get(self.url("calls/logs"))).await
    }

    /// POST /calls/logs
    pub async fn append_call_log(&self, entry: &NewCallLog) -> Result<CallLogEntry, TransportError> {
        self.execute(self.http.post(self.url("calls/logs")).json(entry))
            .await
    }

    /// GET /settings
    pub async fn get_settings(&self) -> Result<Settings, TransportError> {
        self.execute(self.http.get(self.url("settings"))).await
    }

    /// PUT /settings
    pub async fn replace_settings(&self, settings: &Settings) -> Result<Settings, TransportError> {
        self.execute(self.http.put(self.url("settings")).json(settings))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CallDirection, CallType};
    use crate::test_helpers::MockBackend;

    #[tokio::test]
    async fn list_conversations_decodes_snapshot() {
        let backend = MockBackend::start().await;
        backend.seed_conversation(1, "Sara", 0);
        backend.seed_conversation(2, "Team", 4);

        let api = backend.api();
        let chats = api.list_conversations().await.unwrap();
        let ids: Vec<i64> = chats.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![2, 1], "backend orders newest first");
        assert_eq!(chats[0].unread, 4);
    }

    #[tokio::test]
    async fn create_conversation_posts_kind_and_title() {
        let backend = MockBackend::start().await;
        let api = backend.api();

        let created = api
            .create_conversation(ConversationKind::Channel, "News", true)
            .await
            .unwrap();
        assert_eq!(created.kind, ConversationKind::Channel);
        assert_eq!(created.title, "News");
        assert!(created.verified);
        assert_eq!(created.last, "Chat started.");
    }

    #[tokio::test]
    async fn send_message_is_always_mine() {
        let backend = MockBackend::start().await;
        backend.seed_conversation(5, "Sara", 0);
        let api = backend.api();

        let sent = api.send_message(5, "hello").await.unwrap();
        assert!(sent.mine);
        assert_eq!(sent.chat_id, 5);
        assert_eq!(sent.status, "Sent");

        let listed = api.list_messages(5).await.unwrap();
        assert_eq!(listed, vec![sent]);
    }

    #[tokio::test]
    async fn missing_chat_maps_to_status_error() {
        let backend = MockBackend::start().await;
        let api = backend.api();

        let err = api.list_messages(99).await.unwrap_err();
        match err {
            TransportError::Status { status, body } => {
                assert_eq!(status, 404);
                assert!(body.contains("chat not found"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_body_maps_to_decode_error() {
        let backend = MockBackend::start().await;
        backend.state().garbage_settings = true;
        let err = backend.api().get_settings().await.unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable() {
        let api = ApiClient::new(&SyncConfig::new("http://127.0.0.1:1")).unwrap();
        let err = api.list_conversations().await.unwrap_err();
        assert!(matches!(err, TransportError::Unavailable), "got {err:?}");
    }

    #[tokio::test]
    async fn blank_contact_query_is_dropped() {
        let backend = MockBackend::start().await;
        backend.seed_contact("Sara", "sara");
        backend.seed_contact("Reza", "reza");
        let api = backend.api();

        assert_eq!(api.search_contacts(Some("   ")).await.unwrap().len(), 2);
        assert_eq!(backend.state().last_contact_query, None);

        let hits = api.search_contacts(Some("sar")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].username, "sara");
        assert_eq!(backend.state().last_contact_query.as_deref(), Some("sar"));
    }

    #[tokio::test]
    async fn call_logs_round_trip_through_backend() {
        let backend = MockBackend::start().await;
        let api = backend.api();

        let added = api
            .append_call_log(&NewCallLog {
                name: "Reza".into(),
                call_type: CallType::Video,
                direction: CallDirection::Missed,
                time: "Today • 22:10".into(),
            })
            .await
            .unwrap();
        assert_eq!(added.call_type, CallType::Video);

        let logs = api.list_call_logs().await.unwrap();
        assert_eq!(logs, vec![added]);
    }

    #[tokio::test]
    async fn settings_replace_returns_server_copy() {
        let backend = MockBackend::start().await;
        let api = backend.api();

        assert_eq!(api.get_settings().await.unwrap(), Settings::default());

        let wanted = Settings {
            screen_lock: false,
            read_receipts: false,
            link_preview: true,
            safety_alerts: true,
        };
        assert_eq!(api.replace_settings(&wanted).await.unwrap(), wanted);
        assert_eq!(api.get_settings().await.unwrap(), wanted);
    }
}
