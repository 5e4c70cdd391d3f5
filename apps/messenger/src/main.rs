//! Terminal front end for the messaging client. One-shot subcommands plus a
//! polling `watch` mode; all state lives in `client_core`.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use client_core::{
    load_settings, projections, ApiClient, ClientEvent, DurableCredentialStore, ErrorCategory,
    MessengerClient, SessionManager,
};
use shared::domain::{Message, MessageId, Session, UserId};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "messenger", about = "Terminal client for the messaging service")]
struct Cli {
    /// Data directory holding the credential vault and client.toml. Shared
    /// with the drive client so one sign-in covers both.
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account and sign in.
    Register {
        username: String,
        email: String,
        password: String,
    },
    /// Sign in with an existing account.
    Login { email: String, password: String },
    /// Drop the stored credentials. No request is made.
    Logout,
    /// Show the signed-in account.
    Whoami,
    /// List conversations, optionally narrowed by a name query.
    Contacts {
        #[arg(long, default_value = "")]
        query: String,
    },
    /// List users a new conversation can be started with.
    Users {
        #[arg(long, default_value = "")]
        query: String,
    },
    /// Show the message history with a peer.
    History { peer_id: i64 },
    /// Send a message to a peer.
    Send { peer_id: i64, content: String },
    /// Open (or reuse) a conversation with another user.
    Start { other_user_id: i64 },
    /// Follow a conversation, printing new messages as they arrive.
    Watch {
        peer_id: i64,
        #[arg(long, default_value_t = 3)]
        interval_secs: u64,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
    let cli = Cli::parse();

    if let Err(error) = run(cli).await {
        let category = ErrorCategory::of(&error);
        eprintln!("error ({}): {error:#}", category.label());
        if category.requires_reauth() {
            eprintln!("sign in again with `messenger login <email> <password>`");
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let data_dir = resolve_data_dir(cli.data_dir)?;
    let settings = load_settings(&data_dir)?;
    let api = Arc::new(ApiClient::new(&settings.api_base_url, settings.request_log)?);
    let store = DurableCredentialStore::initialize(&settings.vault_database_url()).await?;
    let session = SessionManager::new(api.clone(), store);
    let chat = MessengerClient::new(api, session.clone());

    match cli.command {
        Command::Register {
            username,
            email,
            password,
        } => {
            let signed_in = session.register(&username, &email, &password).await?;
            println!(
                "registered and signed in as {} (user_id={})",
                signed_in.username, signed_in.user_id.0
            );
        }
        Command::Login { email, password } => {
            let signed_in = session.login(&email, &password).await?;
            println!(
                "signed in as {} (user_id={})",
                signed_in.username, signed_in.user_id.0
            );
        }
        Command::Logout => {
            session.logout().await?;
            println!("signed out");
        }
        Command::Whoami => {
            let me = restore_or_bail(&session).await?;
            println!("{} <{}> (user_id={})", me.username, me.email, me.user_id.0);
        }
        Command::Contacts { query } => {
            restore_or_bail(&session).await?;
            let conversations = chat.refresh_conversations().await?;
            let visible = projections::filter_conversations(&conversations, &query);
            if visible.is_empty() {
                println!("no conversations");
            }
            for conversation in visible {
                println!("{:>6}  {}", conversation.peer_id.0, conversation.display_name);
            }
        }
        Command::Users { query } => {
            restore_or_bail(&session).await?;
            let users = chat.refresh_available_users().await?;
            let visible = projections::filter_users(&users, &query);
            if visible.is_empty() {
                println!("no other users");
            }
            for user in visible {
                println!("{:>6}  {}", user.user_id.0, user.username);
            }
        }
        Command::History { peer_id } => {
            let me = restore_or_bail(&session).await?;
            let peer = UserId(peer_id);
            let peer_name = peer_display_name(&chat, peer).await;
            let history = chat.select_conversation(peer).await?;
            if history.is_empty() {
                println!("no messages with {peer_name}");
            }
            for message in &history {
                print_message(&me, &peer_name, message);
            }
        }
        Command::Send { peer_id, content } => {
            restore_or_bail(&session).await?;
            chat.select_conversation(UserId(peer_id)).await?;
            match chat.send_message(&content).await? {
                Some(message) => println!(
                    "sent message {} to user {}",
                    message.message_id.0, peer_id
                ),
                None => println!("nothing to send"),
            }
        }
        Command::Start { other_user_id } => {
            restore_or_bail(&session).await?;
            let peer = chat.start_conversation(UserId(other_user_id)).await?;
            println!("conversation with user {} is selected", peer.0);
        }
        Command::Watch {
            peer_id,
            interval_secs,
        } => {
            let me = restore_or_bail(&session).await?;
            watch(&chat, &me, UserId(peer_id), interval_secs).await?;
        }
    }

    Ok(())
}

/// Polls the selected conversation, printing messages not seen before.
/// Background fetch failures surface on the event stream as warnings.
async fn watch(
    chat: &MessengerClient,
    me: &Session,
    peer: UserId,
    interval_secs: u64,
) -> Result<()> {
    let mut events = chat.subscribe_events();
    let peer_name = peer_display_name(chat, peer).await;
    let mut seen: HashSet<MessageId> = HashSet::new();
    for message in chat.select_conversation(peer).await? {
        seen.insert(message.message_id);
        print_message(me, &peer_name, &message);
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for message in chat.refresh_selected_history().await? {
                    if seen.insert(message.message_id) {
                        print_message(me, &peer_name, &message);
                    }
                }
            }
            event = events.recv() => {
                if let Ok(ClientEvent::Error(detail)) = event {
                    eprintln!("warning: {detail}");
                }
            }
        }
    }
}

async fn peer_display_name(chat: &MessengerClient, peer: UserId) -> String {
    chat.refresh_conversations()
        .await
        .unwrap_or_default()
        .into_iter()
        .find(|conversation| conversation.peer_id == peer)
        .map(|conversation| conversation.display_name)
        .unwrap_or_else(|| format!("user {}", peer.0))
}

fn print_message(me: &Session, peer_name: &str, message: &Message) {
    let sender = if message.sender_id == me.user_id {
        "me"
    } else {
        peer_name
    };
    println!(
        "[{}] {}: {}",
        message.created_at.format("%Y-%m-%d %H:%M"),
        sender,
        message.content
    );
}

async fn restore_or_bail(session: &SessionManager) -> Result<Session> {
    if !session.restore().await? {
        bail!("not signed in; run `messenger login <email> <password>` first");
    }
    session.require().await
}

fn resolve_data_dir(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }
    let base = dirs::data_local_dir()
        .ok_or_else(|| anyhow!("unable to resolve the local app data directory"))?;
    Ok(base.join("quantum_client"))
}
