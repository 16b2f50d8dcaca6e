pub mod render;
pub mod watch;

use anyhow::{Context, Result};
use tracing::debug;

use shark_client::models::{CallDirection, CallType, ConversationKind, NewCallLog, Settings};
use shark_client::store::{
    CallLogStore, ContactsStore, ConversationListStore, ConversationStore, SettingsStore,
};
use shark_client::{ApiClient, SyncConfig, SyncError, TransportError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum KindArg {
    Direct,
    Group,
    Channel,
}

impl From<KindArg> for ConversationKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::Direct => Self::Direct,
            KindArg::Group => Self::Group,
            KindArg::Channel => Self::Channel,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum CallTypeArg {
    Voice,
    Video,
}

impl From<CallTypeArg> for CallType {
    fn from(arg: CallTypeArg) -> Self {
        match arg {
            CallTypeArg::Voice => Self::Voice,
            CallTypeArg::Video => Self::Video,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum DirectionArg {
    Incoming,
    Outgoing,
    Missed,
}

impl From<DirectionArg> for CallDirection {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Incoming => Self::Incoming,
            DirectionArg::Outgoing => Self::Outgoing,
            DirectionArg::Missed => Self::Missed,
        }
    }
}

/// Settings flags given on the command line. `None` leaves a toggle as is.
#[derive(Clone, Copy, Debug, Default)]
pub struct SettingsChanges {
    pub screen_lock: Option<bool>,
    pub read_receipts: Option<bool>,
    pub link_preview: Option<bool>,
    pub safety_alerts: Option<bool>,
}

impl SettingsChanges {
    pub fn is_empty(&self) -> bool {
        self.screen_lock.is_none()
            && self.read_receipts.is_none()
            && self.link_preview.is_none()
            && self.safety_alerts.is_none()
    }

    pub fn apply(&self, current: Settings) -> Settings {
        Settings {
            screen_lock: self.screen_lock.unwrap_or(current.screen_lock),
            read_receipts: self.read_receipts.unwrap_or(current.read_receipts),
            link_preview: self.link_preview.unwrap_or(current.link_preview),
            safety_alerts: self.safety_alerts.unwrap_or(current.safety_alerts),
        }
    }
}

fn api(sync: &SyncConfig) -> Result<ApiClient> {
    debug!(base_url = %sync.http_base, "using backend");
    ApiClient::new(sync).context("Failed to build HTTP client")
}

/// Turn an unreachable backend into a one-line hint instead of an error chain.
fn explain(err: SyncError, sync: &SyncConfig) -> anyhow::Error {
    match err {
        SyncError::Transport(TransportError::Unavailable) => {
            anyhow::anyhow!("backend at {} is not reachable", sync.http_base)
        }
        other => other.into(),
    }
}

pub async fn chats_command(sync: &SyncConfig, json: bool) -> Result<()> {
    let api = api(sync)?;
    let mut store = ConversationListStore::new();
    store.refresh(&api).await.map_err(|e| explain(e, sync))?;
    let chats = store.conversations();

    if json {
        println!("{}", serde_json::to_string_pretty(&chats)?);
    } else if chats.is_empty() {
        println!("No conversations.");
    } else {
        println!("{}", render::conversation_header());
        println!("{}", "-".repeat(72));
        for chat in &chats {
            println!("{}", render::conversation_line(chat));
        }
        println!("\n{} conversation(s)", chats.len());
    }
    Ok(())
}

pub async fn create_command(sync: &SyncConfig, kind: KindArg, title: &str) -> Result<()> {
    let api = api(sync)?;
    let mut store = ConversationListStore::new();
    let created = store
        .create(&api, kind.into(), title)
        .await
        .map_err(|e| explain(e, sync))?;
    println!("{}", render::conversation_line(&created));
    Ok(())
}

pub async fn messages_command(sync: &SyncConfig, chat_id: i64, json: bool) -> Result<()> {
    let api = api(sync)?;
    let mut store = ConversationStore::new(chat_id);
    store.load(&api).await.map_err(|e| explain(e, sync))?;
    let messages = store.messages();

    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
    } else if messages.is_empty() {
        println!("No messages.");
    } else {
        for message in &messages {
            println!("{}", render::message_line(message));
        }
    }
    Ok(())
}

pub async fn send_command(sync: &SyncConfig, chat_id: i64, text: &str) -> Result<()> {
    let api = api(sync)?;
    let store = ConversationStore::new(chat_id);
    let sent = store
        .send(&api, text)
        .await
        .map_err(|e| explain(e, sync))?;
    println!("{}", render::message_line(&sent));
    Ok(())
}

pub async fn calls_command(sync: &SyncConfig, json: bool) -> Result<()> {
    let api = api(sync)?;
    let mut store = CallLogStore::new();
    store.refresh(&api).await.map_err(|e| explain(e, sync))?;
    let entries = store.entries();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        println!("No calls.");
    } else {
        for entry in &entries {
            println!("{}", render::call_line(entry));
        }
    }
    Ok(())
}

pub async fn call_log_command(
    sync: &SyncConfig,
    name: String,
    call_type: CallTypeArg,
    direction: DirectionArg,
    time: Option<String>,
) -> Result<()> {
    let api = api(sync)?;
    let entry = NewCallLog {
        name,
        call_type: call_type.into(),
        direction: direction.into(),
        time: time.unwrap_or_else(|| render::today_label(chrono::Local::now())),
    };
    let mut store = CallLogStore::new();
    let added = store
        .append(&api, &entry)
        .await
        .map_err(|e| explain(e, sync))?;
    println!("{}", render::call_line(&added));
    Ok(())
}

pub async fn settings_command(sync: &SyncConfig, changes: SettingsChanges) -> Result<()> {
    let api = api(sync)?;
    let mut store = SettingsStore::new();
    store.load(&api).await.map_err(|e| explain(e, sync))?;

    if !changes.is_empty() {
        let wanted = changes.apply(store.settings());
        store
            .save(&api, wanted)
            .await
            .map_err(|e| explain(e, sync))?;
    }

    for line in render::settings_lines(&store.settings()) {
        println!("{line}");
    }
    Ok(())
}

pub async fn contacts_command(
    sync: &SyncConfig,
    query: Option<&str>,
    start: Option<&str>,
    json: bool,
) -> Result<()> {
    let api = api(sync)?;
    let mut store = ContactsStore::new();
    store.load(&api, query).await.map_err(|e| explain(e, sync))?;
    let contacts = store.contacts();

    if let Some(username) = start {
        let contact = contacts
            .iter()
            .find(|c| c.username.eq_ignore_ascii_case(username))
            .with_context(|| format!("No contact with username '{username}'"))?;
        let mut chats = ConversationListStore::new();
        let chat = chats
            .create_direct(&api, contact)
            .await
            .map_err(|e| explain(e, sync))?;
        println!("{}", render::conversation_line(&chat));
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&contacts)?);
    } else if contacts.is_empty() {
        println!("No contacts.");
    } else {
        for contact in &contacts {
            println!("{}", render::contact_line(contact));
        }
    }
    Ok(())
}
