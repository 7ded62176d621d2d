//! # nexalog
//!
//! Headless terminal client. Reads commands from stdin and prints the open
//! thread as it converges.
//!
//! ```text
//! /dm <user>        open the direct conversation with a user
//! /channel <id>     open a channel
//! /older            load the previous page
//! /close            close the open thread
//! /friends          refresh the friend list
//! /quit             exit
//! <text>            send a message
//! ```

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use nexalog_client::{ClientConfig, ClientHandle, Target, UiEvent, ViewSnapshot};
use nexalog_shared::constants::APP_NAME;
use nexalog_shared::{ThreadId, UserId};
use nexalog_store::Message;

#[derive(Parser, Debug)]
#[command(name = "nexalog")]
#[command(version)]
#[command(about = "Headless Nexalog chat client")]
struct Args {
    /// Open the direct conversation with this user on start
    #[arg(long, conflicts_with = "channel")]
    dm: Option<i64>,

    /// Open this channel on start
    #[arg(long)]
    channel: Option<i64>,

    /// REST API base URL (overrides NEXALOG_API_BASE)
    #[arg(long)]
    api_base: Option<String>,

    /// Bearer token (overrides NEXALOG_TOKEN)
    #[arg(long)]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("nexalog_client=debug,nexalog_net=info,warn")),
        )
        .with_target(true)
        .init();

    let args = Args::parse();

    let mut config = ClientConfig::from_env();
    if let Some(base) = args.api_base {
        config.api_base = base.trim_end_matches('/').to_string();
    }
    if let Some(token) = args.token {
        config.token = Some(token);
    }
    info!(?config, "Starting {} client v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    let (handle, mut ui_rx) = nexalog_client::start(&config).await?;

    if let Some(user) = args.dm {
        handle.open(Target::Peer(UserId(user))).await?;
    } else if let Some(channel) = args.channel {
        handle.open(Target::Channel(ThreadId(channel))).await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shown: Option<ViewSnapshot> = None;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if !run_line(&handle, &line).await? {
                            break;
                        }
                    }
                    None => break,
                }
            }

            event = ui_rx.recv() => {
                match event {
                    Some(UiEvent::Snapshot(snapshot)) => {
                        render(shown.as_ref(), &snapshot);
                        shown = Some(*snapshot);
                    }
                    Some(UiEvent::ConnectionChanged(state)) if state.gave_up => {
                        eprintln!("! connection lost, giving up");
                    }
                    Some(_) => {}
                    None => break,
                }
            }

            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let _ = handle.shutdown().await;
    Ok(())
}

/// Execute one stdin line. Returns `false` when the user asked to quit.
async fn run_line(handle: &ClientHandle, line: &str) -> anyhow::Result<bool> {
    match parse_line(line) {
        Some(Input::Quit) => return Ok(false),
        Some(Input::Open(target)) => handle.open(target).await?,
        Some(Input::Older) => handle.load_older().await?,
        Some(Input::Close) => handle.close().await?,
        Some(Input::Friends) => handle.refresh_friends().await?,
        Some(Input::Send(text)) => handle.send(text).await?,
        Some(Input::Invalid(reason)) => eprintln!("! {reason}"),
        None => {}
    }
    Ok(true)
}

#[derive(Debug, PartialEq)]
enum Input {
    Open(Target),
    Older,
    Close,
    Friends,
    Quit,
    Send(String),
    Invalid(String),
}

fn parse_line(line: &str) -> Option<Input> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Some(Input::Send(line.to_string()));
    };

    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let id = parts.next().map(str::parse::<i64>);

    Some(match (name, id) {
        ("dm", Some(Ok(user))) => Input::Open(Target::Peer(UserId(user))),
        ("channel", Some(Ok(channel))) => Input::Open(Target::Channel(ThreadId(channel))),
        ("dm" | "channel", _) => Input::Invalid(format!("usage: /{name} <id>")),
        ("older", None) => Input::Older,
        ("close", None) => Input::Close,
        ("friends", None) => Input::Friends,
        ("quit", None) => Input::Quit,
        _ => Input::Invalid(format!("unknown command: {line}")),
    })
}

/// Print what changed between two snapshots.
fn render(previous: Option<&ViewSnapshot>, current: &ViewSnapshot) {
    let same_thread = previous.is_some_and(|p| p.scope == current.scope);
    if !same_thread {
        if let Some(scope) = current.scope {
            println!("== {scope} ==");
        }
    }

    for message in &current.messages {
        let seen = same_thread
            && previous.is_some_and(|p| p.messages.iter().any(|m| m == message));
        if !seen {
            println!("{}", format_message(message));
        }
    }

    if current.error != previous.and_then(|p| p.error.clone()) {
        if let Some(error) = &current.error {
            eprintln!("! {error}");
        }
    }
}

fn format_message(message: &Message) -> String {
    let author = match (&message.author, message.sender_id) {
        (Some(author), _) => author.username.clone(),
        (None, Some(sender)) => format!("user {sender}"),
        (None, None) => "?".to_string(),
    };
    let body = message.display_content().unwrap_or("[deleted]");

    let mut line = format!(
        "[{}] {author}: {body}",
        message.created_at.format("%H:%M")
    );
    if message.edited && !message.deleted {
        line.push_str(" (edited)");
    }
    if message.optimistic {
        line.push_str(" (sending)");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use nexalog_shared::MessageId;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("  "), None);
        assert_eq!(parse_line("hi there"), Some(Input::Send("hi there".into())));
        assert_eq!(
            parse_line("/dm 7"),
            Some(Input::Open(Target::Peer(UserId(7))))
        );
        assert_eq!(
            parse_line("/channel 3"),
            Some(Input::Open(Target::Channel(ThreadId(3))))
        );
        assert_eq!(parse_line("/older"), Some(Input::Older));
        assert_eq!(parse_line("/quit"), Some(Input::Quit));
        assert!(matches!(parse_line("/dm x"), Some(Input::Invalid(_))));
        assert!(matches!(parse_line("/nope"), Some(Input::Invalid(_))));
    }

    #[test]
    fn test_format_message() {
        let mut message = Message {
            id: MessageId::Durable(1),
            thread_id: Some(ThreadId(5)),
            sender_id: Some(UserId(7)),
            recipient_id: None,
            content: "hello".into(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
            edited: true,
            deleted: false,
            optimistic: false,
            author: None,
        };
        assert_eq!(format_message(&message), "[09:30] user 7: hello (edited)");

        message.deleted = true;
        assert_eq!(format_message(&message), "[09:30] user 7: [deleted]");
    }
}
