//! The sync engine: one actor task that owns every store.
//!
//! Presentation code talks to it through a cloneable [`SyncHandle`]. Push
//! events arrive on the engine's own [`PushSubscription`]. Network calls run in
//! spawned tasks and report back over an internal channel, so events keep
//! being applied while a fetch is in flight and all store mutation (and
//! therefore every observer callback) happens on the engine task.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::error::{SyncError, TransportError};
use crate::models::{
    CallLogEntry, Contact, Conversation, ConversationKind, Message, NewCallLog, PushEvent,
    Settings,
};
use crate::observable::Subscription;
use crate::push::{PushChannel, PushSubscription};
use crate::store::{
    CallLogStore, ConversationListStore, ConversationStore, ContactsStore, SettingsStore, Ticket,
};

type Reply<T> = oneshot::Sender<Result<T, SyncError>>;
type Done<T> = Box<dyn FnOnce(Result<T, SyncError>) + Send>;
type Callback<T> = Box<dyn FnMut(&T) + Send>;

fn reply<T: Send + 'static>(respond_to: Reply<T>) -> Done<T> {
    Box::new(move |result| {
        let _ = respond_to.send(result);
    })
}

enum Command {
    RefreshConversations {
        respond_to: Reply<()>,
    },
    CreateConversation {
        kind: ConversationKind,
        title: String,
        verified: bool,
        respond_to: Reply<Conversation>,
    },
    OpenConversation {
        chat_id: i64,
        respond_to: Reply<()>,
    },
    CloseConversation {
        chat_id: i64,
        respond_to: oneshot::Sender<bool>,
    },
    SendMessage {
        chat_id: i64,
        text: String,
        respond_to: Reply<Message>,
    },
    RefreshCallLogs {
        respond_to: Reply<()>,
    },
    AppendCallLog {
        entry: NewCallLog,
        respond_to: Reply<CallLogEntry>,
    },
    LoadSettings {
        respond_to: Reply<Settings>,
    },
    SaveSettings {
        settings: Settings,
        respond_to: Reply<Settings>,
    },
    LoadContacts {
        query: Option<String>,
        respond_to: Reply<Vec<Contact>>,
    },
    Conversations {
        respond_to: oneshot::Sender<Vec<Conversation>>,
    },
    Messages {
        chat_id: i64,
        respond_to: oneshot::Sender<Option<Vec<Message>>>,
    },
    CallLogs {
        respond_to: oneshot::Sender<Vec<CallLogEntry>>,
    },
    SubscribeConversations {
        callback: Callback<Vec<Conversation>>,
        respond_to: oneshot::Sender<Subscription>,
    },
    SubscribeMessages {
        chat_id: i64,
        callback: Callback<Vec<Message>>,
        respond_to: Reply<Subscription>,
    },
    ApplyPushEvent {
        event: PushEvent,
        respond_to: oneshot::Sender<bool>,
    },
    Shutdown {
        respond_to: oneshot::Sender<()>,
    },
}

/// Results of spawned network calls, applied on the engine task.
enum Completion {
    Conversations {
        ticket: Ticket,
        result: Result<Vec<Conversation>, TransportError>,
        done: Done<()>,
    },
    Messages {
        chat_id: i64,
        ticket: Ticket,
        result: Result<Vec<Message>, TransportError>,
        done: Done<()>,
    },
    CallLogs {
        ticket: Ticket,
        result: Result<Vec<CallLogEntry>, TransportError>,
        done: Done<()>,
    },
    Settings {
        ticket: Ticket,
        result: Result<Settings, TransportError>,
        done: Done<Settings>,
    },
    Contacts {
        ticket: Ticket,
        result: Result<Vec<Contact>, TransportError>,
        done: Done<Vec<Contact>>,
    },
    Created {
        result: Result<Conversation, TransportError>,
        respond_to: Reply<Conversation>,
    },
    CallAppended {
        result: Result<CallLogEntry, TransportError>,
        respond_to: Reply<CallLogEntry>,
    },
}

/// Handle to a running [`SyncEngine`].
#[derive(Clone)]
pub struct SyncHandle {
    sender: mpsc::Sender<Command>,
}

impl SyncHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .map_err(|_| SyncError::EngineGone)?;
        rx.await.map_err(|_| SyncError::EngineGone)
    }

    pub async fn refresh_conversations(&self) -> Result<(), SyncError> {
        self.request(|respond_to| Command::RefreshConversations { respond_to })
            .await?
    }

    /// Create a conversation; resolves after the list has been reloaded.
    pub async fn create_conversation(
        &self,
        kind: ConversationKind,
        title: &str,
    ) -> Result<Conversation, SyncError> {
        self.request(|respond_to| Command::CreateConversation {
            kind,
            title: title.to_string(),
            verified: false,
            respond_to,
        })
        .await?
    }

    pub async fn create_direct(&self, contact: &Contact) -> Result<Conversation, SyncError> {
        self.request(|respond_to| Command::CreateConversation {
            kind: ConversationKind::Direct,
            title: contact.name.clone(),
            verified: contact.verified,
            respond_to,
        })
        .await?
    }

    /// Open (or reload) the per-conversation store for `chat_id`.
    pub async fn open_conversation(&self, chat_id: i64) -> Result<(), SyncError> {
        self.request(|respond_to| Command::OpenConversation {
            chat_id,
            respond_to,
        })
        .await?
    }

    /// Drop the store for `chat_id`. Returns whether it was open.
    pub async fn close_conversation(&self, chat_id: i64) -> Result<bool, SyncError> {
        self.request(|respond_to| Command::CloseConversation {
            chat_id,
            respond_to,
        })
        .await
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<Message, SyncError> {
        self.request(|respond_to| Command::SendMessage {
            chat_id,
            text: text.to_string(),
            respond_to,
        })
        .await?
    }

    pub async fn refresh_call_logs(&self) -> Result<(), SyncError> {
        self.request(|respond_to| Command::RefreshCallLogs { respond_to })
            .await?
    }

    pub async fn append_call_log(&self, entry: NewCallLog) -> Result<CallLogEntry, SyncError> {
        self.request(|respond_to| Command::AppendCallLog { entry, respond_to })
            .await?
    }

    pub async fn load_settings(&self) -> Result<Settings, SyncError> {
        self.request(|respond_to| Command::LoadSettings { respond_to })
            .await?
    }

    pub async fn save_settings(&self, settings: Settings) -> Result<Settings, SyncError> {
        self.request(|respond_to| Command::SaveSettings {
            settings,
            respond_to,
        })
        .await?
    }

    pub async fn load_contacts(&self, query: Option<&str>) -> Result<Vec<Contact>, SyncError> {
        self.request(|respond_to| Command::LoadContacts {
            query: query.map(str::to_string),
            respond_to,
        })
        .await?
    }

    pub async fn conversations(&self) -> Result<Vec<Conversation>, SyncError> {
        self.request(|respond_to| Command::Conversations { respond_to })
            .await
    }

    /// Messages of an open conversation, `None` if it is not open.
    pub async fn messages(&self, chat_id: i64) -> Result<Option<Vec<Message>>, SyncError> {
        self.request(|respond_to| Command::Messages {
            chat_id,
            respond_to,
        })
        .await
    }

    pub async fn call_logs(&self) -> Result<Vec<CallLogEntry>, SyncError> {
        self.request(|respond_to| Command::CallLogs { respond_to })
            .await
    }

    /// Register a callback run on the engine task after every list change.
    pub async fn subscribe_conversations(
        &self,
        callback: impl FnMut(&Vec<Conversation>) + Send + 'static,
    ) -> Result<Subscription, SyncError> {
        self.request(|respond_to| Command::SubscribeConversations {
            callback: Box::new(callback),
            respond_to,
        })
        .await
    }

    pub async fn subscribe_messages(
        &self,
        chat_id: i64,
        callback: impl FnMut(&Vec<Message>) + Send + 'static,
    ) -> Result<Subscription, SyncError> {
        self.request(|respond_to| Command::SubscribeMessages {
            chat_id,
            callback: Box::new(callback),
            respond_to,
        })
        .await?
    }

    /// Feed an event through the same path as the push channel.
    pub async fn apply_push_event(&self, event: PushEvent) -> Result<bool, SyncError> {
        self.request(|respond_to| Command::ApplyPushEvent { event, respond_to })
            .await
    }

    pub async fn shutdown(&self) -> Result<(), SyncError> {
        self.request(|respond_to| Command::Shutdown { respond_to })
            .await
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

pub struct SyncEngine {
    api: ApiClient,
    conversations: ConversationListStore,
    open: HashMap<i64, ConversationStore>,
    /// Last load ticket of each closed conversation, so a reopened store keeps
    /// numbering after it
    closed: HashMap<i64, Ticket>,
    call_logs: CallLogStore,
    settings: SettingsStore,
    contacts: ContactsStore,
    commands: mpsc::Receiver<Command>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    events: Option<PushSubscription>,
}

impl SyncEngine {
    /// Start the engine task. It subscribes to `push` but does not connect it.
    pub fn spawn(api: ApiClient, push: &PushChannel) -> SyncHandle {
        let (sender, commands) = mpsc::channel(32);
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let engine = SyncEngine {
            api,
            conversations: ConversationListStore::new(),
            open: HashMap::new(),
            closed: HashMap::new(),
            call_logs: CallLogStore::new(),
            settings: SettingsStore::new(),
            contacts: ContactsStore::new(),
            commands,
            completions_tx,
            completions,
            events: Some(push.subscribe()),
        };
        tokio::spawn(engine.run());
        SyncHandle { sender }
    }

    async fn run(mut self) {
        debug!("sync engine started");
        loop {
            tokio::select! {
                Some(completion) = self.completions.recv() => self.complete(completion),

                event = next_event(&mut self.events) => match event {
                    Some(event) => {
                        self.apply_event(&event);
                    }
                    None => {
                        debug!("push subscription closed");
                        self.events = None;
                    }
                },

                command = self.commands.recv() => match command {
                    Some(Command::Shutdown { respond_to }) => {
                        let _ = respond_to.send(());
                        break;
                    }
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
        }
        info!("sync engine stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::RefreshConversations { respond_to } => {
                self.refresh_conversations(reply(respond_to));
            }
            Command::CreateConversation {
                kind,
                title,
                verified,
                respond_to,
            } => {
                let title = match ConversationListStore::validate_title(&title) {
                    Ok(title) => title.to_string(),
                    Err(e) => {
                        let _ = respond_to.send(Err(e.into()));
                        return;
                    }
                };
                let api = self.api.clone();
                let tx = self.completions_tx.clone();
                tokio::spawn(async move {
                    let result = api.create_conversation(kind, &title, verified).await;
                    let _ = tx.send(Completion::Created { result, respond_to });
                });
            }
            Command::OpenConversation {
                chat_id,
                respond_to,
            } => {
                let store = self.open.entry(chat_id).or_insert_with(|| {
                    match self.closed.remove(&chat_id) {
                        Some(last) => ConversationStore::reopen(chat_id, last),
                        None => ConversationStore::new(chat_id),
                    }
                });
                let ticket = store.begin_load();
                let api = self.api.clone();
                let tx = self.completions_tx.clone();
                tokio::spawn(async move {
                    let result = api.list_messages(chat_id).await;
                    let _ = tx.send(Completion::Messages {
                        chat_id,
                        ticket,
                        result,
                        done: reply(respond_to),
                    });
                });
            }
            Command::CloseConversation {
                chat_id,
                respond_to,
            } => {
                let store = self.open.remove(&chat_id);
                if let Some(last) = store.as_ref().and_then(ConversationStore::last_ticket) {
                    self.closed.insert(chat_id, last);
                }
                let _ = respond_to.send(store.is_some());
            }
            Command::SendMessage {
                chat_id,
                text,
                respond_to,
            } => {
                let text = match ConversationStore::validate(&text) {
                    Ok(text) => text.to_string(),
                    Err(e) => {
                        let _ = respond_to.send(Err(e.into()));
                        return;
                    }
                };
                if !self.open.contains_key(&chat_id) {
                    let _ = respond_to.send(Err(SyncError::NotOpen(chat_id)));
                    return;
                }
                let api = self.api.clone();
                tokio::spawn(async move {
                    let result = api.send_message(chat_id, &text).await;
                    if let Err(e) = &result {
                        warn!(chat_id, error = %e, "send failed");
                    }
                    let _ = respond_to.send(result.map_err(SyncError::from));
                });
            }
            Command::RefreshCallLogs { respond_to } => {
                self.refresh_call_logs(reply(respond_to));
            }
            Command::AppendCallLog { entry, respond_to } => {
                let api = self.api.clone();
                let tx = self.completions_tx.clone();
                tokio::spawn(async move {
                    let result = api.append_call_log(&entry).await;
                    let _ = tx.send(Completion::CallAppended { result, respond_to });
                });
            }
            Command::LoadSettings { respond_to } => {
                let ticket = self.settings.begin_load();
                let api = self.api.clone();
                let tx = self.completions_tx.clone();
                tokio::spawn(async move {
                    let result = api.get_settings().await;
                    let _ = tx.send(Completion::Settings {
                        ticket,
                        result,
                        done: reply(respond_to),
                    });
                });
            }
            Command::SaveSettings {
                settings,
                respond_to,
            } => {
                let ticket = self.settings.begin_load();
                let api = self.api.clone();
                let tx = self.completions_tx.clone();
                tokio::spawn(async move {
                    let result = api.replace_settings(&settings).await;
                    let _ = tx.send(Completion::Settings {
                        ticket,
                        result,
                        done: reply(respond_to),
                    });
                });
            }
            Command::LoadContacts { query, respond_to } => {
                let ticket = self.contacts.begin_load(query.as_deref());
                let query = self.contacts.query().map(str::to_string);
                let api = self.api.clone();
                let tx = self.completions_tx.clone();
                tokio::spawn(async move {
                    let result = api.search_contacts(query.as_deref()).await;
                    let _ = tx.send(Completion::Contacts {
                        ticket,
                        result,
                        done: reply(respond_to),
                    });
                });
            }
            Command::Conversations { respond_to } => {
                let _ = respond_to.send(self.conversations.conversations());
            }
            Command::Messages {
                chat_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.open.get(&chat_id).map(ConversationStore::messages));
            }
            Command::CallLogs { respond_to } => {
                let _ = respond_to.send(self.call_logs.entries());
            }
            Command::SubscribeConversations {
                callback,
                respond_to,
            } => {
                let _ = respond_to.send(self.conversations.subscribe(callback));
            }
            Command::SubscribeMessages {
                chat_id,
                callback,
                respond_to,
            } => {
                let result = self
                    .open
                    .get(&chat_id)
                    .map(|store| store.subscribe(callback))
                    .ok_or(SyncError::NotOpen(chat_id));
                let _ = respond_to.send(result);
            }
            Command::ApplyPushEvent { event, respond_to } => {
                let _ = respond_to.send(self.apply_event(&event));
            }
            Command::Shutdown { respond_to } => {
                let _ = respond_to.send(());
            }
        }
    }

    fn refresh_conversations(&mut self, done: Done<()>) {
        let ticket = self.conversations.begin_refresh();
        let api = self.api.clone();
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = api.list_conversations().await;
            let _ = tx.send(Completion::Conversations {
                ticket,
                result,
                done,
            });
        });
    }

    fn refresh_call_logs(&mut self, done: Done<()>) {
        let ticket = self.call_logs.begin_refresh();
        let api = self.api.clone();
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = api.list_call_logs().await;
            let _ = tx.send(Completion::CallLogs { ticket, result, done });
        });
    }

    fn complete(&mut self, completion: Completion) {
        match completion {
            Completion::Conversations {
                ticket,
                result,
                done,
            } => done(self.conversations.apply_refresh(ticket, result)),
            Completion::Messages {
                chat_id,
                ticket,
                result,
                done,
            } => match self.open.get_mut(&chat_id) {
                Some(store) => done(store.apply_load(ticket, result)),
                None => {
                    debug!(chat_id, "conversation closed before its history arrived");
                    done(Err(SyncError::NotOpen(chat_id)));
                }
            },
            Completion::CallLogs {
                ticket,
                result,
                done,
            } => done(self.call_logs.apply_refresh(ticket, result)),
            Completion::Settings {
                ticket,
                result,
                done,
            } => done(self.settings.apply_echo(ticket, result)),
            Completion::Contacts {
                ticket,
                result,
                done,
            } => {
                let result = self.contacts.apply_load(ticket, result);
                done(result.map(|()| self.contacts.contacts()));
            }
            Completion::Created { result, respond_to } => match result {
                Ok(created) => {
                    self.refresh_conversations(Box::new(move |refreshed| {
                        let _ = respond_to.send(refreshed.map(|()| created));
                    }));
                }
                Err(e) => {
                    warn!(error = %e, "create conversation failed");
                    let _ = respond_to.send(Err(e.into()));
                }
            },
            Completion::CallAppended { result, respond_to } => match result {
                Ok(entry) => {
                    self.refresh_call_logs(Box::new(move |refreshed| {
                        let _ = respond_to.send(refreshed.map(|()| entry));
                    }));
                }
                Err(e) => {
                    warn!(error = %e, "append call log failed");
                    let _ = respond_to.send(Err(e.into()));
                }
            },
        }
    }

    /// List first, then the matching open conversation.
    fn apply_event(&mut self, event: &PushEvent) -> bool {
        let listed = self.conversations.apply_push_event(event);
        let appended = self
            .open
            .get_mut(&event.chat_id)
            .is_some_and(|store| store.apply_push_event(event));
        if !listed && !appended {
            debug!(chat_id = event.chat_id, id = event.id, "push event matched nothing");
        }
        listed || appended
    }
}

async fn next_event(events: &mut Option<PushSubscription>) -> Option<PushEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}
