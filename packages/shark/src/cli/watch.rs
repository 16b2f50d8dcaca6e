use anyhow::{Context, Result};
use tracing::{info, warn};

use shark_client::models::{Conversation, Message};
use shark_client::{ApiClient, PushChannel, SyncConfig, SyncEngine};

use super::render;

/// Connect the push channel and print reconciled changes until Ctrl-C.
pub async fn watch_command(sync: SyncConfig, chat: Option<i64>) -> Result<()> {
    let api = ApiClient::new(&sync).context("Failed to build HTTP client")?;
    let push = PushChannel::new(sync);
    let engine = SyncEngine::spawn(api, &push);
    push.connect();

    let mut states = push.watch_state();
    let state_task = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            eprintln!("[shark: {}]", render::state_label(state));
        }
    });

    if let Err(e) = engine.refresh_conversations().await {
        warn!(error = %e, "initial conversation load failed");
    }
    let initial = engine.conversations().await?;
    for conversation in &initial {
        println!("{}", render::conversation_line(conversation));
    }

    let mut previous: Vec<Conversation> = initial;
    let list_sub = engine
        .subscribe_conversations(move |list| {
            for changed in render::changed_conversations(&previous, list) {
                println!("{}", render::conversation_line(changed));
            }
            previous = list.clone();
        })
        .await?;

    let message_sub = match chat {
        Some(chat_id) => {
            if let Err(e) = engine.open_conversation(chat_id).await {
                warn!(chat_id, error = %e, "could not load conversation history");
            }
            let history = engine.messages(chat_id).await?.unwrap_or_default();
            for message in &history {
                println!("{}", render::message_line(message));
            }
            let mut shown: Vec<i64> = history.iter().map(|m| m.id).collect();
            let sub = engine
                .subscribe_messages(chat_id, move |messages: &Vec<Message>| {
                    for message in render::unseen_messages(&shown, messages) {
                        println!("{}", render::message_line(message));
                    }
                    shown = messages.iter().map(|m| m.id).collect();
                })
                .await?;
            Some(sub)
        }
        None => None,
    };

    info!("watching for updates, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    drop(message_sub);
    drop(list_sub);
    let _ = engine.shutdown().await;
    push.disconnect().await;
    state_task.abort();
    Ok(())
}
