//! One-shot chat turns streamed to the terminal.

use std::error::Error;
use std::io::{self, Write};

use tracing::debug;

use crate::cli::provider_list::short_id;
use crate::core::app::{App, SendError};
use crate::core::chat_stream::{ChatStreamService, StreamEvent, StreamParams};
use crate::core::persistence::SaveOutcome;

pub enum Turn {
    Send(String),
    Regenerate,
}

pub async fn run_turn(app: &mut App, turn: Turn, new_chat: bool) -> Result<(), Box<dyn Error>> {
    if new_chat {
        app.new_chat();
    }
    let started = match turn {
        Turn::Send(prompt) => app.begin_send(prompt, Vec::new()),
        Turn::Regenerate => app.regenerate_last(),
    };
    let params = match started {
        Ok(params) => params,
        Err(SendError::Resolution(err)) => {
            report_save_outcome(app);
            eprintln!("❌ {err}");
            for fix in err.quick_fixes() {
                eprintln!("   {fix}");
            }
            std::process::exit(err.exit_code());
        }
        Err(err) => {
            report_save_outcome(app);
            return Err(err.into());
        }
    };

    stream_to_terminal(app, params).await?;
    report_save_outcome(app);
    Ok(())
}

async fn stream_to_terminal(app: &mut App, params: StreamParams) -> Result<(), Box<dyn Error>> {
    let (service, mut rx) = ChatStreamService::new();
    service.spawn_stream(params);
    drop(service);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut stdout = io::stdout();

    loop {
        tokio::select! {
            biased;
            _ = &mut ctrl_c => {
                app.cancel_stream();
                eprintln!("\n⏹ Generation stopped");
                break;
            }
            received = rx.recv() => {
                let Some((event, stream_id)) = received else {
                    debug!("Stream channel closed before completion");
                    app.cancel_stream();
                    break;
                };
                match &event {
                    StreamEvent::TextDelta(text) => {
                        write!(stdout, "{text}")?;
                        stdout.flush()?;
                    }
                    StreamEvent::ThinkingDelta(text) => eprint!("{text}"),
                    StreamEvent::Error(message) => eprintln!("\n❌ {message}"),
                    StreamEvent::UsageUpdate(_) | StreamEvent::Done => {}
                }
                if app.apply_event(stream_id, &event) {
                    break;
                }
            }
        }
    }
    println!();
    Ok(())
}

pub fn report_save_outcome(app: &mut App) {
    match app.take_save_outcome() {
        Some(SaveOutcome::Recovered { retained }) => {
            eprintln!("⚠️  Storage is full; only the newest {retained} chats were kept")
        }
        Some(SaveOutcome::Failed(err)) => eprintln!("❌ Could not save: {err}"),
        Some(SaveOutcome::Saved) | None => {}
    }
}

pub fn list_chats(app: &App) {
    let state = app.state();
    if state.chats.is_empty() {
        println!("No chats yet.");
        return;
    }
    for chat in &state.chats {
        let marker = if state.current_chat_id.as_deref() == Some(chat.id.as_str()) {
            "*"
        } else {
            " "
        };
        let folder = chat
            .folder_id
            .as_deref()
            .and_then(|id| state.folder(id))
            .map(|folder| format!(" [{}]", folder.name))
            .unwrap_or_default();
        println!(
            "{marker} {} {}{folder} ({} messages, {} tokens)",
            short_id(&chat.id),
            chat.title,
            chat.messages.len(),
            chat.token_total()
        );
    }
}

pub fn show_current_chat(app: &App) {
    let Some(chat) = app.state().current_chat() else {
        println!("No chat selected.");
        return;
    };
    println!("# {}\n", chat.title);
    for message in &chat.messages {
        let label = if message.is_user() { "You" } else { "Assistant" };
        println!("{label}:");
        println!("{}\n", message.text().unwrap_or("[attachment]"));
    }
}

/// Resolve a chat by full id or unique id prefix.
pub fn find_chat_id(app: &App, needle: &str) -> Option<String> {
    let chats = &app.state().chats;
    if let Some(chat) = chats.iter().find(|chat| chat.id == needle) {
        return Some(chat.id.clone());
    }
    let mut matches = chats.iter().filter(|chat| chat.id.starts_with(needle));
    let first = matches.next()?;
    matches.next().is_none().then(|| first.id.clone())
}
