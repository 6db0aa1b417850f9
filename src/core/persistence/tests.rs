use super::*;
use crate::core::chat::{Chat, Folder, Profile};
use crate::core::message::{ContentPart, Message, MessageContent, IMAGE_NOT_SAVED_PLACEHOLDER};
use crate::core::providers::{Provider, ProviderKind};
use crate::core::state::AppState;
use crate::core::persistence::store::DEFAULT_CHAT_CAP;
use tempfile::TempDir;

const TEST_ITERATIONS: u32 = 1_000;

fn open_store(storage: impl Storage + 'static) -> PersistenceStore {
    PersistenceStore::open_with_iterations(Box::new(storage), TEST_ITERATIONS)
        .expect("open store")
}

fn chat_with_text(text: &str) -> Chat {
    let mut chat = Chat::new(None);
    chat.title = Chat::title_from_text(text);
    chat.messages.push(Message::user(text));
    chat
}

fn sample_state() -> AppState {
    let provider = Provider::new("OpenAI", ProviderKind::OpenaiDirect).with_api_key("sk-live-secret");
    let folder = Folder::new("Work");
    let mut chat = chat_with_text("Hello there");
    chat.folder_id = Some(folder.id.clone());
    chat.messages.push(Message::assistant("General Kenobi"));

    let mut state = AppState {
        providers: vec![provider],
        profiles: vec![Profile::new("Tutor")],
        folders: vec![folder],
        current_chat_id: Some(chat.id.clone()),
        chats: vec![chat],
        ..AppState::default()
    };
    state.config.model = format!("{}::gpt-4o", state.providers[0].id);
    state
}

#[test]
fn save_and_load_round_trip_on_disk() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let state = sample_state();

    {
        let mut store = open_store(FileStorage::new(temp_dir.path()));
        assert!(matches!(store.save_all(&state), SaveOutcome::Saved));
    }

    let store = open_store(FileStorage::new(temp_dir.path()));
    let loaded = store.load_all();
    assert_eq!(loaded, state);
}

#[test]
fn credentials_are_never_stored_in_plaintext() {
    let state = sample_state();
    let mut store = open_store(MemoryStorage::new());
    assert!(matches!(store.save_all(&state), SaveOutcome::Saved));

    let raw = store
        .storage()
        .get(keys::PROVIDERS)
        .expect("read")
        .expect("providers stored");
    assert!(!raw.contains("sk-live-secret"));
    assert_eq!(store.load_all().providers[0].api_key, "sk-live-secret");
}

#[test]
fn malformed_key_falls_back_without_affecting_others() {
    let state = sample_state();
    let mut store = open_store(MemoryStorage::new());
    store.save_all(&state);
    store
        .storage_mut()
        .set(keys::PROFILES, "{not json")
        .expect("write");
    store.storage_mut().set(keys::CONFIG, "42").expect("write");

    let loaded = store.load_all();
    assert!(loaded.profiles.is_empty());
    assert_eq!(loaded.config, crate::core::config::Config::default());
    assert_eq!(loaded.chats, state.chats);
    assert_eq!(loaded.providers[0].api_key, "sk-live-secret");
}

#[test]
fn undecryptable_credential_loads_as_empty() {
    let state = sample_state();
    let mut store = open_store(MemoryStorage::new());
    store.save_all(&state);

    let raw = store
        .storage()
        .get(keys::PROVIDERS)
        .expect("read")
        .expect("providers stored");
    let mut providers: Vec<Provider> = serde_json::from_str(&raw).expect("parse");
    providers[0].api_key = "AAAAAAAAAAAAAAAAAAAAAAAAAAAA".to_string();
    let tampered = serde_json::to_string(&providers).expect("serialize");
    store.storage_mut().set(keys::PROVIDERS, &tampered).expect("write");

    let loaded = store.load_all();
    assert_eq!(loaded.providers.len(), 1);
    assert_eq!(loaded.providers[0].api_key, "");
}

#[test]
fn dangling_current_chat_points_at_newest() {
    let mut state = sample_state();
    state.chats.insert(0, chat_with_text("newest"));
    state.current_chat_id = Some("missing".to_string());
    let mut store = open_store(MemoryStorage::new());
    store.save_all(&state);

    let loaded = store.load_all();
    assert_eq!(loaded.current_chat_id.as_deref(), Some(state.chats[0].id.as_str()));
}

#[test]
fn chats_are_capped_newest_first() {
    let mut state = AppState::default();
    for i in 0..DEFAULT_CHAT_CAP + 5 {
        state.chats.push(chat_with_text(&format!("chat {i}")));
    }
    let mut store = open_store(MemoryStorage::new());
    assert!(matches!(store.save_all(&state), SaveOutcome::Saved));

    let loaded = store.load_all();
    assert_eq!(loaded.chats.len(), DEFAULT_CHAT_CAP);
    assert_eq!(loaded.chats[0].id, state.chats[0].id);
}

#[test]
fn oversized_media_is_replaced_only_in_storage() {
    let big_image = format!("data:image/png;base64,{}", "A".repeat(600 * 1024));
    let mut chat = Chat::new(None);
    chat.messages.push(Message::user(MessageContent::Parts(vec![
        ContentPart::text("look"),
        ContentPart::ImageUrl {
            url: big_image.clone(),
        },
    ])));
    let state = AppState {
        chats: vec![chat],
        ..AppState::default()
    };

    let mut store = open_store(MemoryStorage::new());
    store.save_all(&state);

    match &state.chats[0].messages[0].content {
        MessageContent::Parts(parts) => {
            assert_eq!(parts[1], ContentPart::ImageUrl { url: big_image });
        }
        other => panic!("unexpected content {other:?}"),
    }
    let loaded = store.load_all();
    match &loaded.chats[0].messages[0].content {
        MessageContent::Parts(parts) => {
            assert_eq!(parts[1], ContentPart::text(IMAGE_NOT_SAVED_PLACEHOLDER));
        }
        other => panic!("unexpected content {other:?}"),
    }
}

#[test]
fn quota_overflow_halves_chats_once() {
    let mut state = AppState::default();
    for i in 0..10 {
        state
            .chats
            .push(chat_with_text(&format!("{i}{}", "x".repeat(1000))));
    }

    let mut store = open_store(MemoryStorage::with_quota(8_000));
    let outcome = store.save_all(&state);
    assert!(
        matches!(outcome, SaveOutcome::Recovered { retained: 5 }),
        "unexpected outcome {outcome:?}"
    );
    assert_eq!(store.chat_cap(), 5);

    let loaded = store.load_all();
    assert_eq!(loaded.chats.len(), 5);
    assert_eq!(loaded.chats[0].id, state.chats[0].id);

    // The lowered cap sticks for later saves.
    assert!(matches!(store.save_all(&state), SaveOutcome::Saved));
    assert_eq!(store.load_all().chats.len(), 5);
}

#[test]
fn quota_overflow_that_cannot_recover_fails() {
    let mut state = sample_state();
    state.chats[0].messages.push(Message::user("y".repeat(2_000)));

    let mut store = open_store(MemoryStorage::with_quota(400));
    let outcome = store.save_all(&state);
    assert!(outcome.is_failed(), "unexpected outcome {outcome:?}");
    match outcome {
        SaveOutcome::Failed(err) => assert!(err.is_quota_exceeded()),
        _ => unreachable!(),
    }
}

#[test]
fn reset_erases_everything_and_rekeys() {
    let state = sample_state();
    let mut store = open_store(MemoryStorage::new());
    store.save_all(&state);
    let old_seed = store.storage().get(keys::SEED).expect("read");

    store.reset().expect("reset");
    assert_eq!(store.load_all(), AppState::default());
    let new_seed = store.storage().get(keys::SEED).expect("read");
    assert!(new_seed.is_some());
    assert_ne!(old_seed, new_seed);
}

#[test]
fn storage_keys_are_validated() {
    let mut storage = MemoryStorage::new();
    assert!(matches!(
        storage.set("../escape", "x"),
        Err(StorageError::InvalidKey(_))
    ));
    assert!(storage.set(keys::CURRENT_CHAT_ID, "x").is_ok());
}
