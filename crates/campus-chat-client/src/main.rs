//! # campus-chat
//!
//! Headless chat client. Reads its configuration and session credential
//! from the environment, connects, and drives the chat engine from stdin:
//!
//! - `/contacts` lists conversations, most recent first
//! - `/open <peer>` opens (or starts) a conversation
//! - `/close`, `/badge`, `/reset`, `/refresh`, `/dismiss`, `/quit`
//! - any other line is sent to the open conversation

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use campus_chat_client::{
    logging, spawn_runtime, ChatHandle, ChatSnapshot, ClientConfig, HttpChatApi, RuntimeOptions,
    SessionStatus,
};
use campus_chat_net::{ConnectionManager, WsTransport};
use campus_chat_shared::{SenderRef, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliCommand {
    Contacts,
    Open(UserId),
    Close,
    Badge,
    Reset,
    Refresh,
    Dismiss,
    Quit,
    Send(String),
    Usage(&'static str),
    Empty,
}

fn parse_command(line: &str) -> CliCommand {
    let line = line.trim();
    if line.is_empty() {
        return CliCommand::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return CliCommand::Send(line.to_string());
    };

    let mut parts = rest.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::trim).unwrap_or_default();

    match name {
        "contacts" => CliCommand::Contacts,
        "open" if arg.is_empty() => CliCommand::Usage("/open <peer>"),
        "open" => CliCommand::Open(UserId::from(arg)),
        "close" => CliCommand::Close,
        "badge" => CliCommand::Badge,
        "reset" => CliCommand::Reset,
        "refresh" => CliCommand::Refresh,
        "dismiss" => CliCommand::Dismiss,
        "quit" | "exit" => CliCommand::Quit,
        _ => CliCommand::Usage("/contacts | /open <peer> | /close | /badge | /reset | /refresh | /dismiss | /quit"),
    }
}

fn print_contacts(snapshot: &ChatSnapshot) {
    if snapshot.contacts.is_empty() {
        println!(
            "{}",
            if snapshot.contacts_loading { "(loading contacts)" } else { "(no conversations)" }
        );
        return;
    }
    for contact in &snapshot.contacts {
        let unread = if contact.unread_count > 0 {
            format!(" [{}]", contact.unread_count)
        } else {
            String::new()
        };
        println!(
            "{:<24} {}{} - {}",
            contact.peer_id.as_str(),
            contact.display_name,
            unread,
            contact.last_message.as_deref().unwrap_or("")
        );
    }
}

/// Print conversation changes and notices as snapshots arrive.
async fn watch_snapshots(handle: ChatHandle) {
    let mut rx = handle.subscribe();
    let mut shown_peer: Option<UserId> = None;
    let mut shown_messages = 0usize;
    let mut shown_notice = None;

    while rx.changed().await.is_ok() {
        let snapshot = rx.borrow_and_update().clone();

        if snapshot.notice != shown_notice {
            if let Some(notice) = &snapshot.notice {
                println!("! {}", notice.text);
            }
            shown_notice = snapshot.notice.clone();
        }

        let Some(view) = &snapshot.conversation else {
            shown_peer = None;
            shown_messages = 0;
            continue;
        };
        if shown_peer.as_ref() != Some(&view.peer.id) {
            shown_peer = Some(view.peer.id.clone());
            shown_messages = 0;
            let name = view.peer.display_name.as_deref().unwrap_or(view.peer.id.as_str());
            println!("-- conversation with {name} --");
        }
        for message in view.messages.iter().skip(shown_messages) {
            println!("<{}> {}", message.sender_id(), message.content);
        }
        shown_messages = view.messages.len();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    info!("Starting campus-chat v{}", env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::from_env();
    info!(?config, "Loaded configuration");

    let identity = config
        .identity()
        .context("CHAT_USER_ID and CHAT_TOKEN must be set")?;

    let transport = WsTransport::new(config.socket_url.clone(), config.reconnect_delay);
    let manager = Arc::new(ConnectionManager::new(Arc::new(transport)));
    let api = Arc::new(HttpChatApi::new(&config.api_url).context("Invalid CHAT_API_URL")?);

    let handle = spawn_runtime(
        manager,
        api,
        RuntimeOptions {
            badge_policy: config.badge_policy,
            fetch_timeout: config.fetch_timeout,
        },
    );
    handle.set_session(SessionStatus::Authenticated(identity));
    tokio::spawn(watch_snapshots(handle.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            CliCommand::Empty => {}
            CliCommand::Contacts => print_contacts(&handle.snapshot()),
            CliCommand::Open(peer) => handle.start_chat(SenderRef::new(peer)),
            CliCommand::Close => handle.close(),
            CliCommand::Badge => println!("unread: {}", handle.snapshot().badge),
            CliCommand::Reset => handle.reset_badge(),
            CliCommand::Refresh => handle.refresh_contacts(),
            CliCommand::Dismiss => handle.dismiss_notice(),
            CliCommand::Usage(usage) => println!("usage: {usage}"),
            CliCommand::Send(text) => {
                if let Err(e) = handle.send(text).await {
                    warn!(error = %e, "Message not sent");
                    println!("! {e}");
                }
            }
            CliCommand::Quit => break,
        }
    }

    handle.set_session(SessionStatus::Unauthenticated);
    handle.wait_for(|s| !s.active).await;
    handle.shutdown();
    info!("campus-chat exiting");
    Ok(())
}
