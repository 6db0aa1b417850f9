use super::*;

fn parse(args: &[&str]) -> Args {
    Args::try_parse_from(std::iter::once("kiconnect").chain(args.iter().copied()))
        .expect("arguments should parse")
}

#[test]
fn chat_collects_prompt_words() {
    let args = parse(&["chat", "--new", "Hello", "there"]);
    assert_eq!(
        args.command,
        Commands::Chat {
            new: true,
            regenerate: false,
            prompt: vec!["Hello".to_string(), "there".to_string()],
        }
    );
}

#[test]
fn regenerate_conflicts_with_prompt() {
    assert!(Args::try_parse_from(["kiconnect", "chat", "--regenerate", "again"]).is_err());
    let args = parse(&["chat", "--regenerate"]);
    assert!(matches!(args.command, Commands::Chat { regenerate: true, .. }));
}

#[test]
fn provider_add_requires_key() {
    assert!(Args::try_parse_from(["kiconnect", "provider", "add", "anthropic"]).is_err());
    let args = parse(&[
        "provider",
        "add",
        "openai-compat",
        "--name",
        "Local",
        "--url",
        "https://llm.example.com/v1",
        "--key",
        "sk-local",
    ]);
    assert_eq!(
        args.command,
        Commands::Provider {
            command: ProviderCommand::Add {
                kind: "openai-compat".to_string(),
                name: Some("Local".to_string()),
                url: Some("https://llm.example.com/v1".to_string()),
                key: "sk-local".to_string(),
            }
        }
    );
}

#[test]
fn settings_flag_is_global() {
    let args = parse(&["status", "--settings", "/tmp/kiconnect.toml"]);
    assert_eq!(args.settings, Some(PathBuf::from("/tmp/kiconnect.toml")));
    assert_eq!(args.command, Commands::Status);
}

#[test]
fn thinking_intensity_is_bounded() {
    let args = parse(&["thinking", "on", "--intensity", "3"]);
    assert_eq!(
        args.command,
        Commands::Thinking {
            mode: "on".to_string(),
            intensity: Some(3),
        }
    );
    assert!(Args::try_parse_from(["kiconnect", "thinking", "on", "--intensity", "4"]).is_err());
    assert!(Args::try_parse_from(["kiconnect", "thinking", "maybe"]).is_err());
}

#[test]
fn model_and_session_commands_parse() {
    assert_eq!(
        parse(&["model", "set", "Claude::claude-sonnet-4-5"]).command,
        Commands::Model {
            command: ModelCommand::Set {
                model: "Claude::claude-sonnet-4-5".to_string()
            }
        }
    );
    assert_eq!(
        parse(&["session", "0"]).command,
        Commands::Session { minutes: 0 }
    );
    assert_eq!(parse(&["reset", "--yes"]).command, Commands::Reset { yes: true });
}

#[test]
fn settings_subcommands_parse() {
    assert_eq!(
        parse(&["settings", "set", "storage-quota", "2048"]).command,
        Commands::Settings {
            command: SettingsCommand::Set {
                key: "storage-quota".to_string(),
                value: "2048".to_string(),
            }
        }
    );
    assert_eq!(
        parse(&["settings", "unset", "proxy-base"]).command,
        Commands::Settings {
            command: SettingsCommand::Unset {
                key: "proxy-base".to_string()
            }
        }
    );
    assert!(Args::try_parse_from(["kiconnect", "settings", "set", "log-filter"]).is_err());
}

#[test]
fn command_is_required() {
    assert!(Args::try_parse_from(["kiconnect"]).is_err());
}
