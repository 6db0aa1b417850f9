//! Command-line interface parsing and handling
//!
//! This module parses command-line arguments, opens the application store and
//! runs the selected command.

pub mod chat;
pub mod model_list;
pub mod prompt;
pub mod provider_list;

use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::debug;

use crate::cli::chat::{find_chat_id, list_chats, report_save_outcome, run_turn, show_current_chat, Turn};
use crate::cli::model_list::{list_available_models, set_model};
use crate::cli::prompt::{confirm, prompt_new_password, prompt_password};
use crate::cli::provider_list::{add_provider, list_providers, remove_provider};
use crate::core::app::App;
use crate::core::config::data::path_display;
use crate::core::config::Settings;
use crate::core::session_gate::{GateError, GateState};
use crate::utils::logging::init_logging;

#[derive(Parser, Debug)]
#[command(name = "kiconnect")]
#[command(version)]
#[command(about = "Chat with hosted LLM providers from the terminal")]
#[command(
    long_about = "KI Connect keeps providers, chats and profiles in a local store. API keys \
are encrypted at rest, and an optional password locks the session after a configurable \
idle period.\n\n\
Getting started:\n\
  kiconnect setup                        Set a password (optional)\n\
  kiconnect provider add anthropic --key sk-ant-...\n\
  kiconnect model list\n\
  kiconnect model set Anthropic::claude-sonnet-4-5\n\
  kiconnect chat Hello there\n\n\
Environment Variables:\n\
  KICONNECT_LOG     tracing filter for diagnostics on stderr (e.g. kiconnect=debug)\n\n\
Controls:\n\
  Ctrl+C            Stop the running generation; partial text is kept"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file to use instead of the platform default
    #[arg(long, global = true, value_name = "PATH")]
    pub settings: Option<PathBuf>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Set a password that locks the app between sessions
    Setup,
    /// Unlock the session
    Login,
    /// Lock the session
    Logout,
    /// Change the password
    Password,
    /// Show lock state, selected model and storage location
    Status,
    /// Minutes a login stays valid (0 = until logout)
    Session { minutes: u32 },
    /// Manage providers
    Provider {
        #[command(subcommand)]
        command: ProviderCommand,
    },
    /// List or select models
    Model {
        #[command(subcommand)]
        command: ModelCommand,
    },
    /// Toggle extended thinking for capable models
    Thinking {
        #[arg(value_parser = ["on", "off"])]
        mode: String,
        /// Thinking intensity, 1 (light) to 3 (deep)
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=3))]
        intensity: Option<u8>,
    },
    /// Send a message in the current chat and stream the answer
    Chat {
        /// Start a new chat first
        #[arg(long)]
        new: bool,
        /// Ask again for the last answer instead of sending a message
        #[arg(long, conflicts_with = "prompt")]
        regenerate: bool,
        #[arg(trailing_var_arg = true)]
        prompt: Vec<String>,
    },
    /// List chats, newest first
    Chats,
    /// Print the current chat
    Show,
    /// Make another chat current
    Switch { chat: String },
    /// Delete a chat
    DeleteChat { chat: String },
    /// Show or change machine-local settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
    /// Delete all stored data, including the password
    Reset {
        /// Do not ask for confirmation
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum ProviderCommand {
    /// Add a provider (anthropic, openai-direct, openrouter, mistral, gemini, xai, groq, openai-compat)
    Add {
        kind: String,
        /// Display name; defaults to the provider type
        #[arg(long)]
        name: Option<String>,
        /// Server URL, required for openai-compat
        #[arg(long)]
        url: Option<String>,
        /// API key
        #[arg(long)]
        key: String,
    },
    /// List configured providers
    List,
    /// Remove a provider by name or id
    Remove { provider: String },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum SettingsCommand {
    /// Print the current settings
    Show,
    /// Set a key (data-dir, storage-quota, served-from, proxy-base, log-filter)
    Set { key: String, value: String },
    /// Restore a key to its default
    Unset { key: String },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum ModelCommand {
    /// List models offered by one or all providers
    List { provider: Option<String> },
    /// Select the model for new messages, as <provider>::<model>
    Set { model: String },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let settings_path = match args.settings {
        Some(path) => path,
        None => Settings::default_path()?,
    };
    let settings = Settings::load_from_path(&settings_path)?;
    init_logging(settings.log_filter());
    debug!(command = ?args.command, "Starting");

    if let Commands::Settings { command } = args.command {
        return edit_settings(settings, &settings_path, command);
    }

    let mut app = App::open(&settings)?;

    match args.command {
        Commands::Setup => {
            if app.gate_state() != GateState::NoPasswordSet && !app.needs_new_password() {
                return Err(GateError::PasswordAlreadySet.into());
            }
            let password = prompt_new_password()?;
            app.setup_password(&password)?;
            println!("✅ Password set; session unlocked");
        }
        Commands::Login => {
            if app.gate_state() == GateState::NoPasswordSet {
                println!("No password is set; nothing to unlock.");
                return Ok(());
            }
            let password = prompt_password("Password: ")?;
            app.login(&password)?;
            println!("✅ Unlocked");
            warn_if_password_outdated(&app);
        }
        Commands::Logout => {
            app.logout()?;
            println!("✅ Locked");
        }
        Commands::Password => {
            let current = match app.gate_state() {
                GateState::NoPasswordSet => None,
                _ => Some(prompt_password("Current password: ")?),
            };
            let new_password = prompt_new_password()?;
            app.change_password(current.as_deref(), &new_password)?;
            println!("✅ Password changed");
        }
        Commands::Status => print_status(&mut app, &settings)?,
        Commands::Session { minutes } => {
            unlock(&mut app)?;
            app.set_session_duration(minutes);
            if minutes == 0 {
                println!("✅ Logins stay valid until logout");
            } else {
                println!("✅ Logins stay valid for {minutes} minutes");
            }
        }
        Commands::Provider { command } => {
            unlock(&mut app)?;
            match command {
                ProviderCommand::Add {
                    kind,
                    name,
                    url,
                    key,
                } => add_provider(&mut app, &kind, name, url, key)?,
                ProviderCommand::List => list_providers(&app),
                ProviderCommand::Remove { provider } => remove_provider(&mut app, &provider)?,
            }
        }
        Commands::Model { command } => {
            unlock(&mut app)?;
            match command {
                ModelCommand::List { provider } => {
                    list_available_models(&app, provider.as_deref()).await?
                }
                ModelCommand::Set { model } => set_model(&mut app, &model)?,
            }
        }
        Commands::Thinking { mode, intensity } => {
            unlock(&mut app)?;
            let enabled = mode == "on";
            app.set_thinking(enabled, intensity);
            println!("✅ Thinking {}", if enabled { "enabled" } else { "disabled" });
        }
        Commands::Chat {
            new,
            regenerate,
            prompt,
        } => {
            unlock(&mut app)?;
            let turn = if regenerate {
                Turn::Regenerate
            } else {
                Turn::Send(prompt.join(" "))
            };
            run_turn(&mut app, turn, new).await?;
        }
        Commands::Chats => {
            unlock(&mut app)?;
            list_chats(&app);
        }
        Commands::Show => {
            unlock(&mut app)?;
            show_current_chat(&app);
        }
        Commands::Switch { chat } => {
            unlock(&mut app)?;
            let id = find_chat_id(&app, &chat).ok_or_else(|| format!("No chat matches '{chat}'"))?;
            app.switch_chat(&id);
            println!("✅ Switched chat");
        }
        Commands::DeleteChat { chat } => {
            unlock(&mut app)?;
            let id = find_chat_id(&app, &chat).ok_or_else(|| format!("No chat matches '{chat}'"))?;
            app.delete_chat(&id);
            println!("✅ Deleted chat");
        }
        // Handled above without opening the store.
        Commands::Settings { .. } => {}
        Commands::Reset { yes } => {
            if !yes && !confirm("Delete all chats, providers, profiles and the password?")? {
                println!("Cancelled.");
                return Ok(());
            }
            app.reset_all()?;
            println!("✅ All data deleted");
        }
    }

    report_save_outcome(&mut app);
    Ok(())
}

fn edit_settings(
    mut settings: Settings,
    settings_path: &Path,
    command: SettingsCommand,
) -> Result<(), Box<dyn Error>> {
    match command {
        SettingsCommand::Show => {
            println!("Settings file: {}", path_display(settings_path));
            settings.print_all();
            return Ok(());
        }
        SettingsCommand::Set { key, value } => {
            settings.set_value(&key, Some(&value))?;
            settings.save_to_path(settings_path)?;
            println!("✅ Set {key} to: {value}");
        }
        SettingsCommand::Unset { key } => {
            settings.set_value(&key, None)?;
            settings.save_to_path(settings_path)?;
            println!("✅ Unset {key}");
        }
    }
    Ok(())
}

/// Prompt for the password when the session is locked.
fn unlock(app: &mut App) -> Result<(), Box<dyn Error>> {
    if app.gate_state() == GateState::Locked {
        let password = prompt_password("Password: ")?;
        app.login(&password)?;
        warn_if_password_outdated(app);
    }
    Ok(())
}

fn warn_if_password_outdated(app: &App) {
    if app.needs_new_password() {
        eprintln!("⚠️  Your password was stored in an old format. Run `kiconnect password` to renew it.");
    }
}

fn print_status(app: &mut App, settings: &Settings) -> Result<(), Box<dyn Error>> {
    match app.gate_state() {
        GateState::NoPasswordSet => println!("Session:  no password set"),
        GateState::Locked => println!("Session:  🔒 locked"),
        GateState::Unlocked { expires_at: None } => println!("Session:  🔓 unlocked until logout"),
        GateState::Unlocked {
            expires_at: Some(expiry),
        } => {
            let when = chrono::DateTime::from_timestamp_millis(expiry)
                .map(|at| at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| expiry.to_string());
            println!("Session:  🔓 unlocked until {when}");
        }
    }
    let state = app.state();
    let model = if state.config.model.is_empty() {
        "(none selected)"
    } else {
        state.config.model.as_str()
    };
    println!("Model:    {model}");
    println!("Providers: {}", state.providers.len());
    println!("Chats:    {}", state.chats.len());
    println!("Data:     {}", path_display(settings.resolve_data_dir()?));
    if app.router().uses_proxy() {
        println!("Routing:  via development proxy");
    }
    Ok(())
}

#[cfg(test)]
mod tests;
