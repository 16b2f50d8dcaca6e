//! In-process stand-in for the chat backend, served by axum on an ephemeral
//! port. Mirrors the REST routes and the `/ws` push endpoint.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::{broadcast, oneshot};

use crate::api::ApiClient;
use crate::config::SyncConfig;
use crate::models::{
    CallLogEntry, Contact, Conversation, ConversationKind, Message, NewCallLog, PushEvent,
    Settings,
};

#[derive(Default)]
pub(crate) struct BackendState {
    pub chats: Vec<Conversation>,
    pub messages: Vec<Message>,
    pub calls: Vec<CallLogEntry>,
    pub settings: Settings,
    pub contacts: Vec<Contact>,
    next_id: i64,
    /// Answer GET /chats and GET /chats/{id}/messages with 500
    pub fail_reads: bool,
    /// Answer GET /settings with a non-JSON body
    pub garbage_settings: bool,
    pub last_contact_query: Option<String>,
    pub send_calls: usize,
    pub ws_connections: usize,
    pub pings: usize,
    /// Close the next accepted push connection right after the handshake
    pub drop_next_ws: bool,
    /// Per-request delays for GET /chats/{id}/messages, applied after the
    /// history has been read
    pub history_delays: VecDeque<Duration>,
}

impl BackendState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Clone)]
struct AppState {
    inner: Arc<Mutex<BackendState>>,
    frames: broadcast::Sender<String>,
}

impl AppState {
    fn lock(&self) -> MutexGuard<'_, BackendState> {
        self.inner.lock().unwrap()
    }
}

pub(crate) struct MockBackend {
    app: AppState,
    addr: SocketAddr,
    _shutdown: oneshot::Sender<()>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let app = AppState {
            inner: Arc::new(Mutex::new(BackendState {
                next_id: 100,
                ..Default::default()
            })),
            frames: broadcast::channel(64).0,
        };

        let router = Router::new()
            .route("/contacts", get(list_contacts))
            .route("/chats", get(list_chats).post(create_chat))
            .route(
                "/chats/{id}/messages",
                get(list_messages).post(send_message),
            )
            .route("/calls/logs", get(list_calls).post(add_call))
            .route("/settings", get(get_settings).put(put_settings))
            .route("/ws", get(ws_upgrade))
            .with_state(app.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            app,
            addr,
            _shutdown: tx,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Client config pointed at this backend, with short reconnect delays.
    pub fn config(&self) -> SyncConfig {
        let mut config = SyncConfig::new(self.base_url());
        config.reconnect_initial = Duration::from_millis(20);
        config.reconnect_max = Duration::from_millis(100);
        config
    }

    pub fn api(&self) -> ApiClient {
        ApiClient::new(&self.config()).unwrap()
    }

    pub fn state(&self) -> MutexGuard<'_, BackendState> {
        self.app.lock()
    }

    pub fn seed_conversation(&self, id: i64, title: &str, unread: u32) -> Conversation {
        let chat = Conversation {
            id,
            kind: ConversationKind::Direct,
            title: title.to_string(),
            last: "Chat started.".to_string(),
            time: "Now".to_string(),
            unread,
            verified: false,
        };
        self.state().chats.push(chat.clone());
        chat
    }

    pub fn seed_message(&self, chat_id: i64, text: &str, mine: bool) -> Message {
        let mut state = self.state();
        let message = Message {
            id: state.next_id(),
            chat_id,
            mine,
            text: text.to_string(),
            time: "21:30".to_string(),
            status: if mine { "Read" } else { "" }.to_string(),
        };
        state.messages.push(message.clone());
        message
    }

    pub fn seed_contact(&self, name: &str, username: &str) -> Contact {
        let mut state = self.state();
        let contact = Contact {
            id: state.next_id(),
            name: name.to_string(),
            username: username.to_string(),
            verified: false,
        };
        state.contacts.push(contact.clone());
        contact
    }

    /// Broadcast a raw text frame to every connected push client.
    pub fn push_raw(&self, frame: &str) {
        let _ = self.app.frames.send(frame.to_string());
    }

    pub fn push_event(&self, event: &PushEvent) {
        self.push_raw(&serde_json::to_string(event).unwrap());
    }
}

pub(crate) fn message_event(chat_id: i64, id: i64, text: &str) -> PushEvent {
    PushEvent {
        kind: "message".to_string(),
        chat_id,
        id,
        mine: false,
        text: text.to_string(),
        time: "22:00".to_string(),
        status: "Delivered".to_string(),
    }
}

/// Poll `check` until it holds or two seconds pass.
pub(crate) async fn wait_for(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

type Reply<T> = Result<Json<T>, (StatusCode, Json<Value>)>;

fn reject(status: StatusCode, detail: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "detail": detail })))
}

#[derive(Deserialize)]
struct ContactQuery {
    q: Option<String>,
}

async fn list_contacts(
    State(app): State<AppState>,
    Query(query): Query<ContactQuery>,
) -> Json<Vec<Contact>> {
    let mut state = app.lock();
    state.last_contact_query = query.q.clone();
    let needle = query.q.unwrap_or_default().to_lowercase();
    let mut hits: Vec<Contact> = state
        .contacts
        .iter()
        .filter(|c| {
            c.name.to_lowercase().contains(&needle) || c.username.to_lowercase().contains(&needle)
        })
        .cloned()
        .collect();
    hits.sort_by(|a, b| a.name.cmp(&b.name));
    Json(hits)
}

async fn list_chats(State(app): State<AppState>) -> Reply<Vec<Conversation>> {
    let state = app.lock();
    if state.fail_reads {
        return Err(reject(StatusCode::INTERNAL_SERVER_ERROR, "database offline"));
    }
    let mut chats = state.chats.clone();
    chats.sort_by(|a, b| b.id.cmp(&a.id));
    Ok(Json(chats))
}

#[derive(Deserialize)]
struct ChatCreate {
    kind: ConversationKind,
    title: String,
    #[serde(default)]
    verified: bool,
}

async fn create_chat(State(app): State<AppState>, Json(body): Json<ChatCreate>) -> Reply<Conversation> {
    let title = body.title.trim().to_string();
    if title.is_empty() {
        return Err(reject(StatusCode::BAD_REQUEST, "title required"));
    }
    let mut state = app.lock();
    if let Some(existing) = state
        .chats
        .iter()
        .find(|c| c.kind == body.kind && c.title.eq_ignore_ascii_case(&title))
    {
        return Ok(Json(existing.clone()));
    }
    let chat = Conversation {
        id: state.next_id(),
        kind: body.kind,
        title,
        last: "Chat started.".to_string(),
        time: "Now".to_string(),
        unread: 0,
        verified: body.verified,
    };
    state.chats.push(chat.clone());
    Ok(Json(chat))
}

async fn list_messages(State(app): State<AppState>, Path(chat_id): Path<i64>) -> Reply<Vec<Message>> {
    let (messages, delay) = {
        let mut state = app.lock();
        if state.fail_reads {
            return Err(reject(StatusCode::INTERNAL_SERVER_ERROR, "database offline"));
        }
        if !state.chats.iter().any(|c| c.id == chat_id) {
            return Err(reject(StatusCode::NOT_FOUND, "chat not found"));
        }
        let mut messages: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.id);
        (messages, state.history_delays.pop_front())
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    Ok(Json(messages))
}

#[derive(Deserialize)]
struct MessageCreate {
    #[serde(default)]
    mine: bool,
    text: String,
}

async fn send_message(
    State(app): State<AppState>,
    Path(chat_id): Path<i64>,
    Json(body): Json<MessageCreate>,
) -> Reply<Message> {
    let message = {
        let mut state = app.lock();
        state.send_calls += 1;
        if !state.chats.iter().any(|c| c.id == chat_id) {
            return Err(reject(StatusCode::NOT_FOUND, "chat not found"));
        }
        let text = body.text.trim().to_string();
        if text.is_empty() {
            return Err(reject(StatusCode::BAD_REQUEST, "text required"));
        }
        let message = Message {
            id: state.next_id(),
            chat_id,
            mine: body.mine,
            text: text.clone(),
            time: "22:00".to_string(),
            status: "Sent".to_string(),
        };
        state.messages.push(message.clone());
        if let Some(chat) = state.chats.iter_mut().find(|c| c.id == chat_id) {
            chat.last = text;
            chat.time = message.time.clone();
        }
        message
    };

    let event = PushEvent {
        kind: "message".to_string(),
        chat_id,
        id: message.id,
        mine: message.mine,
        text: message.text.clone(),
        time: message.time.clone(),
        status: "Delivered".to_string(),
    };
    let _ = app.frames.send(serde_json::to_string(&event).unwrap());
    Ok(Json(message))
}

async fn list_calls(State(app): State<AppState>) -> Json<Vec<CallLogEntry>> {
    let mut calls = app.lock().calls.clone();
    calls.sort_by(|a, b| b.id.cmp(&a.id));
    Json(calls)
}

async fn add_call(State(app): State<AppState>, Json(body): Json<NewCallLog>) -> Json<CallLogEntry> {
    let mut state = app.lock();
    let entry = CallLogEntry {
        id: state.next_id(),
        name: body.name,
        call_type: body.call_type,
        direction: body.direction,
        time: body.time,
    };
    state.calls.push(entry.clone());
    Json(entry)
}

async fn get_settings(State(app): State<AppState>) -> Response {
    let state = app.lock();
    if state.garbage_settings {
        return "<html>maintenance</html>".into_response();
    }
    Json(state.settings).into_response()
}

async fn put_settings(State(app): State<AppState>, Json(body): Json<Settings>) -> Json<Settings> {
    app.lock().settings = body;
    Json(body)
}

async fn ws_upgrade(State(app): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let frames = app.frames.subscribe();
    ws.on_upgrade(move |socket| serve_push(socket, app, frames))
}

async fn serve_push(mut socket: WebSocket, app: AppState, mut frames: broadcast::Receiver<String>) {
    let drop_now = {
        let mut state = app.lock();
        state.ws_connections += 1;
        std::mem::take(&mut state.drop_next_ws)
    };
    if drop_now {
        let _ = socket.send(WsMessage::Close(None)).await;
        return;
    }

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Ok(frame) = frame else { break };
                if socket.send(WsMessage::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) if text.as_str() == "ping" => {
                        app.lock().pings += 1;
                    }
                    Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}
