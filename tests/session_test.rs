//! GM session integration tests against the in-process store

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use kohd_console::keygate::KeyGate;
use kohd_console::kohd::{self, Burst, CipherTable};
use kohd_console::models::{
    CustomCommand, FileKind, OverrideKind, OverrideState, SpecialAction, Target, TerminalConfig,
};
use kohd_console::session::{
    GmSession, RenameOutcome, SessionSettings, Transmission, TransmitMode,
};
use kohd_console::store::{MemoryStore, RemoteStore, StorePath};
use kohd_console::ConsoleError;

fn setup() -> (Arc<MemoryStore>, GmSession) {
    let store = Arc::new(MemoryStore::new());
    let session = GmSession::new(store.clone(), SessionSettings::default());
    (store, session)
}

fn path(p: &str) -> StorePath {
    StorePath::parse(p).unwrap()
}

fn payload_of(wire: &str) -> String {
    match Burst::parse(wire) {
        Some(Burst::Datastream(payload)) => payload,
        other => panic!("not a datastream: {other:?}"),
    }
}

fn override_state(message: &str, timer: Option<u64>) -> OverrideState {
    OverrideState {
        kind: OverrideKind::Lockout,
        message: message.to_string(),
        content: None,
        effect: None,
        timer,
    }
}

#[tokio::test]
async fn test_regenerate_and_reset_clear_key_gate() {
    let (store, session) = setup();

    session.unlock_all().await.unwrap();
    assert!(store.get(&path("decryption_keys")).await.unwrap().is_some());

    let table = session.regenerate_cipher().await.unwrap();
    let stored: CipherTable =
        serde_json::from_value(store.get(&path("cipher_config")).await.unwrap().unwrap()).unwrap();
    assert_eq!(stored, table);
    assert_eq!(store.get(&path("decryption_keys")).await.unwrap(), None);

    session.set_key('a', true).await.unwrap();
    assert_eq!(
        store.get(&path("decryption_keys/A")).await.unwrap(),
        Some(json!(true))
    );

    session.reset_cipher().await.unwrap();
    let stored: CipherTable =
        serde_json::from_value(store.get(&path("cipher_config")).await.unwrap().unwrap()).unwrap();
    assert_eq!(stored, CipherTable::default_table());
    assert_eq!(store.get(&path("decryption_keys")).await.unwrap(), None);
}

#[tokio::test]
async fn test_set_key_rejects_unknown_symbol() {
    let (store, session) = setup();
    let err = session.set_key('!', true).await.unwrap_err();
    assert!(matches!(err, ConsoleError::Validation(_)));
    assert_eq!(store.get(&path("decryption_keys")).await.unwrap(), None);
}

#[tokio::test]
async fn test_broadcast_sets_live_value_and_appends_history() {
    let (store, mut session) = setup();

    let wire = session
        .transmit(Transmission::encoded("hi there").with_noise(10))
        .await
        .unwrap();

    assert_eq!(store.get(&path("kohd_datastream")).await.unwrap(), Some(json!(wire)));
    let history = store.get(&path("datastream_history")).await.unwrap().unwrap();
    let entries: Vec<_> = history.as_object().unwrap().values().cloned().collect();
    assert_eq!(entries, vec![json!(wire)]);

    let table = CipherTable::default_table();
    let payload = payload_of(&wire);
    assert_eq!(wire.len(), 10 + 2 + payload.len() + 2);
    assert!(payload.starts_with("<@><"));
    let glyphs = kohd::decode(&payload, &table, &KeyGate::all_unlocked(&table));
    assert_eq!(kohd::render(&glyphs), "HI THERE");

    assert_eq!(session.history(), ["hi there"]);
}

#[tokio::test]
async fn test_direct_message_only_touches_target() {
    let (store, mut session) = setup();

    let wire = session
        .transmit(
            Transmission::encoded("STAND BY...")
                .with_mode(TransmitMode::Decoded)
                .to(Target::Player("neo".into())),
        )
        .await
        .unwrap();

    assert_eq!(payload_of(&wire), "STAND BY...");
    assert_eq!(store.get(&path("direct_messages/neo")).await.unwrap(), Some(json!(wire)));
    assert_eq!(store.get(&path("kohd_datastream")).await.unwrap(), None);
    assert_eq!(store.get(&path("datastream_history")).await.unwrap(), None);
}

#[tokio::test]
async fn test_svg_and_gif_skip_wrapper() {
    let (store, mut session) = setup();

    let svg = session
        .transmit(Transmission::encoded("<svg></svg>").with_mode(TransmitMode::Svg))
        .await
        .unwrap();
    assert_eq!(svg, "SVG::<svg></svg>");

    let gif = session
        .transmit(Transmission::encoded(" https://x/y.gif ").with_mode(TransmitMode::Gif))
        .await
        .unwrap();
    assert_eq!(gif, "GIF::https://x/y.gif");
    assert_eq!(store.get(&path("kohd_datastream")).await.unwrap(), Some(json!(gif)));

    // Media bursts are not text messages
    assert!(session.history().is_empty());
}

#[tokio::test]
async fn test_scramble_next_is_consumed_once() {
    let (store, mut session) = setup();
    let table = CipherTable::default_table();
    let plain = kohd::encode("ABCDEFGH", &table);

    session.scramble_next().await.unwrap();
    assert_eq!(
        store.get(&path("glitches/scramble_next")).await.unwrap(),
        Some(json!(true))
    );

    let wire = session.transmit(Transmission::encoded("ABCDEFGH")).await.unwrap();
    assert_eq!(store.get(&path("glitches/scramble_next")).await.unwrap(), None);

    let chunks = |s: &str| {
        let chars: Vec<char> = s.chars().collect();
        let mut pairs: Vec<String> = chars.chunks(2).map(|c| c.iter().collect()).collect();
        pairs.sort();
        pairs
    };
    assert_eq!(chunks(&payload_of(&wire)), chunks(&plain));

    let wire = session.transmit(Transmission::encoded("ABCDEFGH")).await.unwrap();
    assert_eq!(payload_of(&wire), plain);
}

#[tokio::test]
async fn test_failed_transmit_keeps_pending_scramble() {
    let (store, mut session) = setup();
    session.scramble_next().await.unwrap();
    store.deny_writes(path("kohd_datastream"));

    let err = session
        .transmit(Transmission::encoded("ABCDEFGH"))
        .await
        .unwrap_err();
    assert!(matches!(err, ConsoleError::Store(_)));
    assert_eq!(
        store.get(&path("glitches/scramble_next")).await.unwrap(),
        Some(json!(true))
    );
    assert!(session.history().is_empty());

    store.allow_writes(&path("kohd_datastream"));
    session.transmit(Transmission::encoded("ABCDEFGH")).await.unwrap();
    assert_eq!(store.get(&path("glitches/scramble_next")).await.unwrap(), None);
}

#[tokio::test]
async fn test_empty_transmission_writes_nothing() {
    let (store, mut session) = setup();

    for mode in [TransmitMode::Encoded, TransmitMode::Svg, TransmitMode::Gif] {
        let err = session
            .transmit(Transmission::encoded("   ").with_mode(mode))
            .await
            .unwrap_err();
        assert!(matches!(err, ConsoleError::Validation(_)));
    }
    assert_eq!(store.get(&path("kohd_datastream")).await.unwrap(), None);
    assert!(session.history().is_empty());
}

#[tokio::test]
async fn test_clear_history() {
    let (store, mut session) = setup();
    session.transmit(Transmission::encoded("ACKNOWLEDGED")).await.unwrap();

    session.clear_history().await.unwrap();
    assert_eq!(store.get(&path("datastream_history")).await.unwrap(), None);
    assert!(store
        .get(&path("history_cleared_timestamp"))
        .await
        .unwrap()
        .unwrap()
        .is_i64());
    assert!(session.history().is_empty());
}

#[tokio::test]
async fn test_file_lifecycle() {
    let (store, session) = setup();

    let key = session
        .create_file(FileKind::Text, " Notes.TXT ", "meet at dawn", 2)
        .await
        .unwrap();
    assert_eq!(key, "notes·txt");
    assert_eq!(
        store.get(&path("file_system/notes·txt")).await.unwrap(),
        Some(json!({"content": "meet at dawn", "level": 2}))
    );

    session.edit_file("notes.txt", "meet at dusk", 1).await.unwrap();
    session.set_file_hidden("notes.txt", true).await.unwrap();
    assert_eq!(
        store.get(&path("file_system/notes·txt")).await.unwrap(),
        Some(json!({"content": "meet at dusk", "level": 1, "hidden": true}))
    );

    let outcome = session.rename_file("notes.txt", "log.txt").await.unwrap();
    assert_eq!(outcome, RenameOutcome::Completed { key: "log·txt".into() });
    assert_eq!(store.get(&path("file_system/notes·txt")).await.unwrap(), None);
    assert!(store.get(&path("file_system/log·txt")).await.unwrap().is_some());

    session.delete_file("log.txt").await.unwrap();
    assert_eq!(store.get(&path("file_system")).await.unwrap(), None);
}

#[tokio::test]
async fn test_file_validation_and_not_found() {
    let (store, session) = setup();

    let err = session.create_file(FileKind::Text, "readme", "x", 1).await.unwrap_err();
    assert!(matches!(err, ConsoleError::Validation(_)));
    let err = session.create_file(FileKind::Text, "a.txt", "  ", 1).await.unwrap_err();
    assert!(matches!(err, ConsoleError::Validation(_)));
    assert_eq!(store.get(&path("file_system")).await.unwrap(), None);

    let err = session.edit_file("ghost.txt", "boo", 1).await.unwrap_err();
    assert!(matches!(err, ConsoleError::NotFound(_)));
    let err = session.rename_file("ghost.txt", "spirit.txt").await.unwrap_err();
    assert!(matches!(err, ConsoleError::NotFound(_)));
}

#[tokio::test]
async fn test_files_are_found_by_their_typed_name() {
    let (store, session) = setup();
    session
        .create_file(FileKind::Text, "Notes.TXT", "meet at dawn", 1)
        .await
        .unwrap();

    session.edit_file("Notes.TXT", "meet at dusk", 2).await.unwrap();
    session.set_file_hidden("NOTES.txt", true).await.unwrap();
    assert_eq!(
        store.get(&path("file_system/notes·txt")).await.unwrap(),
        Some(json!({"content": "meet at dusk", "level": 2, "hidden": true}))
    );

    session.delete_file("Notes.TXT").await.unwrap();
    assert_eq!(store.get(&path("file_system")).await.unwrap(), None);

    let err = session.delete_file("Notes.TXT").await.unwrap_err();
    assert!(matches!(err, ConsoleError::NotFound(_)));
}

#[tokio::test]
async fn test_svg_and_gif_files_are_flagged() {
    let (store, session) = setup();
    session
        .create_file(FileKind::Svg, "map.svg", "<svg/>", 1)
        .await
        .unwrap();
    session
        .create_file(FileKind::Gif, "cam.gif", "https://x/cam.gif", 3)
        .await
        .unwrap();

    let svg = store.get(&path("file_system/map·svg")).await.unwrap().unwrap();
    assert_eq!(svg["isSvg"], true);
    let gif = store.get(&path("file_system/cam·gif")).await.unwrap().unwrap();
    assert_eq!(gif["isGif"], true);
    assert_eq!(gif["level"], 3);
}

#[tokio::test]
async fn test_rename_onto_existing_is_rejected() {
    let (_store, session) = setup();
    session.create_file(FileKind::Text, "a.txt", "a", 1).await.unwrap();
    session.create_file(FileKind::Text, "b.txt", "b", 1).await.unwrap();

    let err = session.rename_file("a.txt", "b.txt").await.unwrap_err();
    assert!(matches!(err, ConsoleError::Validation(_)));
}

#[tokio::test]
async fn test_rename_reports_partial_when_old_entry_survives() {
    let (store, session) = setup();
    session.create_file(FileKind::Text, "a.txt", "a", 1).await.unwrap();
    store.deny_writes(path("file_system/a·txt"));

    let outcome = session.rename_file("a.txt", "b.txt").await.unwrap();
    assert_eq!(
        outcome,
        RenameOutcome::Partial {
            key: "b·txt".into(),
            stale_key: "a·txt".into(),
        }
    );
    assert!(store.get(&path("file_system/a·txt")).await.unwrap().is_some());
    assert!(store.get(&path("file_system/b·txt")).await.unwrap().is_some());
}

#[tokio::test]
async fn test_failed_write_is_reported() {
    let (store, session) = setup();
    store.deny_writes(path("users"));

    let err = session.create_user("neo", "redpill").await.unwrap_err();
    assert!(matches!(err, ConsoleError::Store(_)));
}

#[tokio::test]
async fn test_commands_resources_users_access() {
    let (store, session) = setup();

    let name = session
        .create_command(
            " Hack ",
            CustomCommand {
                response: "ACCESS GRANTED".into(),
                args: Some("<target>".into()),
                consumes_resource: true,
                special_action: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(name, "hack");
    session
        .create_special_command("crack", SpecialAction::BruteforceDecrypt, "Running...")
        .await
        .unwrap();
    let crack = store.get(&path("custom_commands/crack")).await.unwrap().unwrap();
    assert_eq!(crack["special_action"], "bruteforce_decrypt");
    session.delete_command("HACK").await.unwrap();
    assert_eq!(store.get(&path("custom_commands/hack")).await.unwrap(), None);

    session.set_player_resources("Exploits", 5).await.unwrap();
    assert_eq!(
        store.get(&path("player_resources")).await.unwrap(),
        Some(json!({"name": "Exploits", "count": 5}))
    );

    assert_eq!(session.create_user(" Neo ", "redpill").await.unwrap(), "neo");
    assert!(matches!(
        session.create_user("trinity", " ").await,
        Err(ConsoleError::Validation(_))
    ));
    session.delete_user("NEO").await.unwrap();
    assert_eq!(store.get(&path("users")).await.unwrap(), None);

    session.save_access_passwords(" swordfish ", "").await.unwrap();
    assert_eq!(
        store.get(&path("access_control")).await.unwrap(),
        Some(json!({"level2": "swordfish"}))
    );
}

#[tokio::test]
async fn test_terminal_config_and_presets() {
    let (store, mut session) = setup();

    let config = TerminalConfig {
        scan_command: "SWEEP".into(),
        theme: "amber".into(),
        ..TerminalConfig::default()
    };
    session.presets_mut().save("amber", config).unwrap();
    session.apply_preset("amber").await.unwrap();

    let stored = store.get(&path("terminal_config")).await.unwrap().unwrap();
    assert_eq!(stored["scanCommand"], "sweep");
    assert_eq!(stored["theme"], "amber");

    let err = session.apply_preset("missing").await.unwrap_err();
    assert!(matches!(err, ConsoleError::NotFound(_)));
}

#[tokio::test]
async fn test_local_state_persists_across_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    {
        let mut session =
            GmSession::open(store.clone(), SessionSettings::default(), dir.path()).unwrap();
        session.transmit(Transmission::encoded("SIGNAL BOOSTED")).await.unwrap();
        session
            .presets_mut()
            .save("default", TerminalConfig::default())
            .unwrap();
    }

    let session = GmSession::open(store, SessionSettings::default(), dir.path()).unwrap();
    assert_eq!(session.history(), ["SIGNAL BOOSTED"]);
    assert_eq!(session.presets().names(), ["default"]);
}

#[tokio::test]
async fn test_reset_player_access_stamps_signal() {
    let (store, session) = setup();
    session.reset_player_access().await.unwrap();
    let ts = store
        .get(&path("glitches/reset_access_timestamp"))
        .await
        .unwrap()
        .unwrap();
    assert!(ts.as_i64().unwrap() > 0);
}

#[tokio::test(start_paused = true)]
async fn test_new_override_cancels_previous_countdown() {
    let (store, session) = setup();
    let override_path = path("glitches/override_state");

    // t=0: timer 10
    session
        .trigger_override(override_state("SYSTEM LOCKOUT", Some(10)))
        .await
        .unwrap();

    // t=3: timer 5, clears at t=8
    tokio::time::sleep(Duration::from_secs(3)).await;
    session
        .trigger_override(override_state("TRACE DETECTED", Some(5)))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(4_900)).await;
    let current = store.get(&override_path).await.unwrap().unwrap();
    assert_eq!(current["message"], "TRACE DETECTED");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(store.get(&override_path).await.unwrap(), None);

    // t=8.1: no timer. The first t=10 countdown must not fire.
    session
        .trigger_override(override_state("STAND BY", None))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(store.get(&override_path).await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_clear_override_cancels_countdown() {
    let (store, session) = setup();
    let override_path = path("glitches/override_state");

    session
        .trigger_override(override_state("SYSTEM LOCKOUT", Some(5)))
        .await
        .unwrap();
    assert!(session.timers().is_armed(&override_path).await);

    session.clear_override().await.unwrap();
    assert!(!session.timers().is_armed(&override_path).await);
    assert_eq!(store.get(&override_path).await.unwrap(), None);

    // A later override without a timer is not removed by the cancelled one
    session
        .trigger_override(override_state("WARNING", None))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(store.get(&override_path).await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_glitched_command_expires_after_thirty_seconds() {
    let (store, session) = setup();
    let glitched = path("glitches/glitched_command");

    session.glitch_command("SCAN").await.unwrap();
    assert_eq!(store.get(&glitched).await.unwrap(), Some(json!("scan")));

    // Unrelated glitch activity in between
    tokio::time::sleep(Duration::from_secs(10)).await;
    session.scramble_next().await.unwrap();
    session
        .trigger_override(override_state("SECURITY ALERT", None))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(19_900)).await;
    assert_eq!(store.get(&glitched).await.unwrap(), Some(json!("scan")));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(store.get(&glitched).await.unwrap(), None);
    assert!(store.get(&path("glitches/override_state")).await.unwrap().is_some());
    assert_eq!(
        store.get(&path("glitches/scramble_next")).await.unwrap(),
        Some(json!(true))
    );
}

#[tokio::test]
async fn test_override_requires_message_or_content() {
    let (store, session) = setup();
    let err = session
        .trigger_override(override_state("  ", Some(5)))
        .await
        .unwrap_err();
    assert!(matches!(err, ConsoleError::Validation(_)));
    assert_eq!(store.get(&path("glitches")).await.unwrap(), None);
}
