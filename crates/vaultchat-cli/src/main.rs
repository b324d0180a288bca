use std::io::Write as _;
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use vaultchat_core::config::ChatConfig;
use vaultchat_core::controllers::ChatController;
use vaultchat_core::models::session::{SessionError, SessionEvent};
use vaultchat_core::repositories::chat_store::ChatStore;
use vaultchat_core::repositories::fs_store::FsObjectStore;
use vaultchat_core::services::deeplink;
use vaultchat_core::services::diagnostics;
use vaultchat_core::services::notes::NoteBrowser;
use vaultchat_core::services::relay::HttpRelay;

#[derive(Parser)]
#[command(name = "vaultchat", about = "Chat with the markdown notes in your vault")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive chat session (the default).
    Chat,
    /// List saved conversations.
    Chats,
    /// List markdown notes available as context.
    Notes,
    /// Probe the relay and storage collaborators.
    Check,
}

struct App {
    controller: ChatController,
    browser: NoteBrowser,
    config: ChatConfig,
}

async fn build_app(config: ChatConfig) -> Result<(App, tokio::sync::mpsc::UnboundedReceiver<SessionEvent>)> {
    let store = Arc::new(FsObjectStore::new(config.storage_root()?));
    let relay = Arc::new(HttpRelay::new(&config.relay_url, &config.api_key));
    let chats = ChatStore::new(store.clone(), config.bucket_prefix.clone());
    let browser = NoteBrowser::new(store, config.bucket_prefix.clone());

    let (controller, events) =
        ChatController::new(relay, chats, config.model.clone(), config.max_tokens);

    Ok((
        App {
            controller,
            browser,
            config,
        },
        events,
    ))
}

/// Print session events as they arrive. Deltas carry the full accumulated
/// text; only the unseen suffix is written so the terminal output grows
/// in place.
async fn render_events(mut events: tokio::sync::mpsc::UnboundedReceiver<SessionEvent>) {
    let mut printed = 0usize;

    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::UserTurn { .. } => {}
            SessionEvent::AssistantPending => {
                printed = 0;
                print!("assistant> ");
                let _ = std::io::stdout().flush();
            }
            SessionEvent::AssistantDelta { text } => {
                print!("{}", &text[printed..]);
                printed = text.len();
                let _ = std::io::stdout().flush();
            }
            SessionEvent::AssistantCommitted { .. } => {
                println!();
            }
            SessionEvent::StreamFailed { partial, error } => {
                if !partial.is_empty() {
                    println!();
                }
                println!("[error] {error}");
            }
            SessionEvent::NoResponse => {
                println!("[no response received]");
            }
            SessionEvent::PersistFailed { error } => {
                println!("[warning] could not save chat: {error}");
            }
            SessionEvent::TranscriptReplaced => {
                printed = 0;
            }
        }
    }
}

async fn run_chat(app: App, events: tokio::sync::mpsc::UnboundedReceiver<SessionEvent>) -> Result<()> {
    tokio::spawn(render_events(events));

    println!("vaultchat: /notes /attach <name> /detach <name> /chats /open <id> /rm <id> /new /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you> ");
        let _ = std::io::stdout().flush();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            if !handle_command(&app, command).await? {
                break;
            }
            continue;
        }

        match app.controller.submit(&line).await {
            Ok(()) => {}
            Err(SessionError::Busy) => println!("[busy] a response is still streaming"),
            Err(SessionError::EmptyMessage) => {}
        }
    }

    Ok(())
}

/// Handle one slash command; returns `false` to quit.
async fn handle_command(app: &App, command: &str) -> Result<bool> {
    let (name, arg) = match command.split_once(' ') {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };

    match name {
        "quit" | "q" => return Ok(false),
        "new" => {
            app.controller.new_chat();
            println!("[new chat]");
        }
        "chats" => {
            let summaries = app.controller.refresh_index().await?;
            if summaries.is_empty() {
                println!("[no saved chats]");
            }
            for summary in summaries {
                println!("{}  {}  {}", summary.id, summary.updated_at, summary.title);
            }
        }
        "open" => match app.controller.select_chat(arg).await {
            Ok(()) => {
                for turn in app.controller.transcript_snapshot().turns() {
                    println!("{:?}> {}", turn.role, turn.text);
                }
            }
            Err(err) => println!("[error] {err}"),
        },
        "rm" => match app.controller.delete_chat(arg).await {
            Ok(()) => println!("[deleted]"),
            Err(err) => println!("[error] {err}"),
        },
        "notes" => {
            for note in app.browser.list().await? {
                let marker = if app
                    .controller
                    .context_entries()
                    .iter()
                    .any(|entry| entry.key == note.key)
                {
                    "*"
                } else {
                    " "
                };

                if app.config.vault_name.is_empty() {
                    println!("{marker} {}", note.name);
                } else {
                    println!(
                        "{marker} {}  {}",
                        note.name,
                        deeplink::obsidian_open_uri(&app.config.vault_name, &note.name)
                    );
                }
            }
        }
        "attach" => {
            let notes = app.browser.list().await?;
            match notes.iter().find(|note| note.name == arg) {
                Some(note) => {
                    let entry = app.browser.fetch_entry(note).await?;
                    app.controller.attach_note(entry);
                    println!("[attached {}]", note.name);
                }
                None => println!("[no note named {arg}]"),
            }
        }
        "detach" => {
            let key = app
                .controller
                .context_entries()
                .iter()
                .find(|entry| entry.display_name == arg)
                .map(|entry| entry.key.clone());
            match key {
                Some(key) => {
                    app.controller.detach_note(&key);
                    println!("[detached {arg}]");
                }
                None => println!("[{arg} is not attached]"),
            }
        }
        other => println!("[unknown command /{other}]"),
    }

    Ok(true)
}

async fn run_check(config: ChatConfig) -> Result<()> {
    let store = Arc::new(FsObjectStore::new(config.storage_root()?));
    let relay = HttpRelay::new(&config.relay_url, &config.api_key);

    let report =
        diagnostics::check_connection(&relay, store.as_ref(), &config.bucket_prefix, &config.model)
            .await;

    match &report.relay {
        Ok(()) => println!("relay: ok"),
        Err(err) => println!("relay: {err}"),
    }
    match &report.storage {
        Ok(()) => println!("storage: ok"),
        Err(err) => println!("storage: {err}"),
    }

    if report.is_ok() { Ok(()) } else { bail!("connection test failed") }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = ChatConfig::load().await.context("Failed to load settings")?;

    if !config.is_configured() {
        warn!("Relay URL, API key or model missing");
        let path = ChatConfig::default_path()?;
        bail!(
            "vaultchat is not configured yet: set relay_url, api_key and model in {}",
            path.display()
        );
    }

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => {
            let (app, events) = build_app(config).await?;
            run_chat(app, events).await
        }
        Command::Chats => {
            let (app, _events) = build_app(config).await?;
            for summary in app.controller.refresh_index().await? {
                println!("{}  {}  {}", summary.id, summary.updated_at, summary.title);
            }
            Ok(())
        }
        Command::Notes => {
            let (app, _events) = build_app(config).await?;
            for note in app.browser.list().await? {
                println!("{}  ({} bytes)", note.name, note.size);
            }
            Ok(())
        }
        Command::Check => run_check(config).await,
    }
}
