mod cli;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;

use cli::{CallTypeArg, DirectionArg, KindArg};
use config::SharkConfig;

#[derive(Parser)]
#[command(name = "shark")]
#[command(about = "Command-line client for the Shark chat backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Backend base URL, e.g. http://127.0.0.1:8000 (overrides config.toml)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Custom data directory (defaults to ~/.shark)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List conversations
    Chats(ListArgs),

    /// Create a conversation (returns the existing one if the title is taken)
    Create(CreateArgs),

    /// Show the message history of a conversation
    Messages(MessagesArgs),

    /// Send a message
    Send(SendArgs),

    /// List the call log
    Calls(ListArgs),

    /// Record a call in the call log
    CallLog(CallLogArgs),

    /// Show settings, or change them with flags
    Settings(SettingsArgs),

    /// Search contacts
    Contacts(ContactsArgs),

    /// Stay connected and print live updates until Ctrl-C
    Watch(WatchArgs),
}

#[derive(Parser)]
struct ListArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Parser)]
struct CreateArgs {
    kind: KindArg,
    title: String,
}

#[derive(Parser)]
struct MessagesArgs {
    chat_id: i64,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Parser)]
struct SendArgs {
    chat_id: i64,
    text: String,
}

#[derive(Parser)]
struct CallLogArgs {
    name: String,
    call_type: CallTypeArg,
    direction: DirectionArg,

    /// Display time (defaults to "Today • HH:MM")
    #[arg(long)]
    time: Option<String>,
}

#[derive(Parser)]
struct SettingsArgs {
    #[arg(long)]
    screen_lock: Option<bool>,
    #[arg(long)]
    read_receipts: Option<bool>,
    #[arg(long)]
    link_preview: Option<bool>,
    #[arg(long)]
    safety_alerts: Option<bool>,
}

#[derive(Parser)]
struct ContactsArgs {
    /// Matches name or username
    query: Option<String>,

    /// Start a direct conversation with the contact that has this username
    #[arg(long)]
    start: Option<String>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Parser)]
struct WatchArgs {
    /// Also follow the messages of this conversation
    #[arg(long)]
    chat: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.debug {
        "shark=debug,shark_client=debug,info"
    } else {
        "shark=info,shark_client=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let config = SharkConfig::new(cli.data_dir.clone())?;
    let sync = config.load()?.to_sync_config(cli.server.as_deref());

    match cli.command {
        Commands::Chats(args) => cli::chats_command(&sync, args.json).await,
        Commands::Create(args) => cli::create_command(&sync, args.kind, &args.title).await,
        Commands::Messages(args) => cli::messages_command(&sync, args.chat_id, args.json).await,
        Commands::Send(args) => cli::send_command(&sync, args.chat_id, &args.text).await,
        Commands::Calls(args) => cli::calls_command(&sync, args.json).await,
        Commands::CallLog(args) => {
            cli::call_log_command(
                &sync,
                args.name,
                args.call_type,
                args.direction,
                args.time,
            )
            .await
        }
        Commands::Settings(args) => {
            let changes = cli::SettingsChanges {
                screen_lock: args.screen_lock,
                read_receipts: args.read_receipts,
                link_preview: args.link_preview,
                safety_alerts: args.safety_alerts,
            };
            cli::settings_command(&sync, changes).await
        }
        Commands::Contacts(args) => {
            cli::contacts_command(
                &sync,
                args.query.as_deref(),
                args.start.as_deref(),
                args.json,
            )
            .await
        }
        Commands::Watch(args) => cli::watch::watch_command(sync, args.chat).await,
    }
}
