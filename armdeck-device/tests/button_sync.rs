//! Button synchronization against the simulated deck

mod common;

use std::sync::Arc;
use std::time::Duration;

use armdeck_device::{
    ButtonAction, ButtonConfig, ButtonPatch, ConnectionState, DeckError, DeckSettings,
    KeymapDocument, Rgb, SyncEvent,
};
use armdeck_transport::protocol::cmd;
use armdeck_transport::ErrorCode;
use common::{connected, manager, manager_with, SimDeck};
use tokio::time::sleep;

fn label(text: &str) -> ButtonPatch {
    ButtonPatch::new().label(text)
}

#[tokio::test(start_paused = true)]
async fn test_set_slot_marks_dirty_and_save_all_cleans() {
    let deck = SimDeck::new();
    let manager = connected(&deck).await;
    let sync = manager.synchronizer();

    manager.set_slot(1, label("Skip")).unwrap();
    manager
        .set_slot(3, ButtonPatch::new().color(Rgb::new(1, 2, 3)))
        .unwrap();
    assert!(sync.is_dirty());
    assert_eq!(sync.dirty_slots(), vec![1, 3]);
    assert!(sync.button(1).unwrap().dirty);
    assert!(!sync.button(2).unwrap().dirty);

    let saved = manager.save_all().await.unwrap();
    assert_eq!(saved, 2);
    assert!(!sync.is_dirty());
    assert!(sync.dirty_slots().is_empty());
    assert!(sync.last_saved().is_some());

    {
        let state = deck.state.lock();
        assert_eq!(state.buttons[1].label(), "Skip");
        assert_eq!(state.buttons[3].rgb, [1, 2, 3]);
    }

    // Debounce timers find nothing left to do
    sleep(Duration::from_secs(3)).await;
    assert_eq!(deck.count(cmd::SET_BUTTON), 2);
}

#[tokio::test(start_paused = true)]
async fn test_save_all_without_changes_is_noop() {
    let deck = SimDeck::new();
    let manager = connected(&deck).await;
    let before = deck.command_log().len();

    assert_eq!(manager.save_all().await.unwrap(), 0);
    assert_eq!(deck.command_log().len(), before);
    assert!(manager.synchronizer().last_saved().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_debounced_save_after_inactivity() {
    let deck = SimDeck::new();
    let manager = connected(&deck).await;
    let sync = manager.synchronizer();

    manager.set_slot(0, label("Deck")).unwrap();
    assert_eq!(sync.pending_saves(), 1);
    sleep(Duration::from_secs(1)).await;
    assert_eq!(deck.count(cmd::SET_BUTTON), 0);

    // Re-arms the same slot's timer
    manager.set_slot(0, label("Deck2")).unwrap();
    assert_eq!(sync.pending_saves(), 1);
    sleep(Duration::from_secs(1)).await;
    assert_eq!(deck.count(cmd::SET_BUTTON), 0);

    sleep(Duration::from_secs(1)).await;
    assert_eq!(deck.count(cmd::SET_BUTTON), 1);
    assert_eq!(deck.state.lock().buttons[0].label(), "Deck2");
    assert!(!sync.is_dirty());
    assert_eq!(sync.pending_saves(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_debounce_per_slot() {
    let deck = SimDeck::new();
    let manager = connected(&deck).await;

    manager.set_slot(0, label("A")).unwrap();
    manager.set_slot(7, label("B")).unwrap();
    assert_eq!(manager.synchronizer().pending_saves(), 2);

    sleep(Duration::from_secs(3)).await;
    assert_eq!(deck.count(cmd::SET_BUTTON), 2);
    let state = deck.state.lock();
    assert_eq!(state.buttons[0].label(), "A");
    assert_eq!(state.buttons[7].label(), "B");
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_save() {
    let deck = SimDeck::new();
    let manager = connected(&deck).await;

    manager.set_slot(2, label("Gone")).unwrap();
    assert_eq!(manager.synchronizer().pending_saves(), 1);

    manager.disconnect().await;
    assert_eq!(manager.synchronizer().pending_saves(), 0);
    let writes = deck.command_log().len();

    sleep(Duration::from_secs(5)).await;
    assert_eq!(deck.command_log().len(), writes);
    assert_eq!(deck.count(cmd::SET_BUTTON), 0);
    assert_eq!(deck.state.lock().buttons[2].label(), "Prev");
}

#[tokio::test(start_paused = true)]
async fn test_offline_edit_does_not_schedule_save() {
    let deck = SimDeck::new();
    let manager = manager(&deck);
    let sync = manager.synchronizer();

    let updated = manager.set_slot(0, label("Offline")).unwrap();
    assert_eq!(updated.label, "Offline");
    assert!(updated.dirty);
    assert!(sync.is_dirty());
    assert_eq!(sync.pending_saves(), 0);

    match manager.save_all().await {
        Err(DeckError::NotReady { state, .. }) => assert_eq!(state, ConnectionState::Disconnected),
        other => panic!("expected NotReady, got {other:?}"),
    }
    assert!(deck.command_log().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_set_slot_out_of_range() {
    let deck = SimDeck::new();
    let manager = connected(&deck).await;

    let err = manager.set_slot(12, label("Nope")).unwrap_err();
    assert!(matches!(err, DeckError::InvalidParameter(_)));
    assert!(!manager.synchronizer().is_dirty());
}

#[tokio::test(start_paused = true)]
async fn test_labels_truncated_to_device_limit() {
    let deck = SimDeck::new();
    let manager = connected(&deck).await;

    let updated = manager.set_slot(4, label("VolumeDown")).unwrap();
    assert_eq!(updated.label, "VolumeD");
    manager.save_slot(4).await.unwrap();
    assert_eq!(deck.state.lock().buttons[4].label(), "VolumeD");
}

#[tokio::test(start_paused = true)]
async fn test_failed_save_stops_batch_and_keeps_dirty() {
    let deck = SimDeck::new();
    let manager = connected(&deck).await;
    let mut events = manager.synchronizer().subscribe();
    deck.state.lock().reject_saves = true;

    manager.set_slot(2, label("X")).unwrap();
    manager.set_slot(4, label("Y")).unwrap();

    let err = manager.save_all().await.unwrap_err();
    assert!(matches!(
        err,
        DeckError::Device {
            command: cmd::SET_BUTTON,
            code: ErrorCode::Busy
        }
    ));
    assert_eq!(deck.count(cmd::SET_BUTTON), 1);
    assert_eq!(manager.synchronizer().dirty_slots(), vec![2, 4]);
    assert!(manager.synchronizer().last_saved().is_none());

    let mut saw_failure = false;
    while let Ok(event) = events.try_recv() {
        if event == (SyncEvent::SaveFailed { slot: 2 }) {
            saw_failure = true;
        }
    }
    assert!(saw_failure);
}

#[tokio::test(start_paused = true)]
async fn test_edit_during_save_stays_dirty() {
    let deck = SimDeck::new();
    let manager = Arc::new(connected(&deck).await);

    manager.set_slot(0, label("A")).unwrap();
    let save = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.save_slot(0).await })
    };

    // Land inside the device processing delay
    sleep(Duration::from_millis(50)).await;
    manager.set_slot(0, label("B")).unwrap();
    save.await.unwrap().unwrap();

    assert_eq!(deck.state.lock().buttons[0].label(), "A");
    assert!(manager.synchronizer().button(0).unwrap().dirty);

    // The newer edit goes out with its own debounce
    sleep(Duration::from_secs(2)).await;
    assert_eq!(deck.state.lock().buttons[0].label(), "B");
    assert!(!manager.synchronizer().is_dirty());
}

#[tokio::test(start_paused = true)]
async fn test_bulk_load_defaults_failed_slots() {
    let deck = SimDeck::new();
    deck.state.lock().fail_slots = [2, 5].into_iter().collect();
    let manager = connected(&deck).await;

    let buttons = manager.buttons();
    assert_eq!(buttons.len(), 12);
    assert_eq!(buttons[2], ButtonConfig::empty(2));
    assert_eq!(buttons[5], ButtonConfig::empty(5));
    assert_eq!(buttons[3].label, "Vol+");
    assert_eq!(buttons[3].action, ButtonAction::Media(0xE9));
    assert_eq!(manager.state(), ConnectionState::FullyConnected);
}

#[tokio::test(start_paused = true)]
async fn test_bulk_load_all_slots_failing() {
    let deck = SimDeck::new();
    deck.state.lock().fail_slots = (0..12).collect();
    let manager = connected(&deck).await;

    let buttons = manager.buttons();
    assert_eq!(buttons.len(), 12);
    for (i, button) in buttons.iter().enumerate() {
        assert_eq!(*button, ButtonConfig::empty(i as u8));
    }
}

#[tokio::test(start_paused = true)]
async fn test_reset_is_idempotent() {
    let deck = SimDeck::new();
    let manager = connected(&deck).await;

    manager.set_slot(0, label("Foo")).unwrap();
    manager.save_slot(0).await.unwrap();
    assert_eq!(deck.state.lock().buttons[0].label(), "Foo");

    manager.reset().await.unwrap();
    let first = manager.buttons();
    assert_eq!(first[0].label, "Play");
    assert_eq!(first.len(), 12);

    manager.reset().await.unwrap();
    assert_eq!(manager.buttons(), first);
    assert_eq!(deck.count(cmd::RESET_CONFIG), 2);

    let sync = manager.synchronizer();
    assert!(!sync.is_dirty());
    assert!(sync.last_saved().is_some());
    assert_eq!(sync.pending_saves(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reset_uses_configured_opcode() {
    let deck = SimDeck::new();
    let mut settings = DeckSettings::default();
    settings.protocol.reset_opcode = cmd::RESET_CONFIG_LEGACY;
    let manager = manager_with(&deck, settings);
    manager.connect(&deck.discovered()).await.unwrap();

    // The simulated firmware only knows the current opcode
    let err = manager.reset().await.unwrap_err();
    assert!(matches!(
        err,
        DeckError::Device {
            command: cmd::RESET_CONFIG_LEGACY,
            code: ErrorCode::InvalidCommand
        }
    ));
    assert_eq!(deck.count(cmd::RESET_CONFIG_LEGACY), 1);
}

#[tokio::test(start_paused = true)]
async fn test_events_published() {
    let deck = SimDeck::new();
    let manager = manager(&deck);
    let mut events = manager.synchronizer().subscribe();

    manager.connect(&deck.discovered()).await.unwrap();
    assert_eq!(events.recv().await.unwrap(), SyncEvent::Loaded { count: 12 });

    manager.set_slot(1, label("N")).unwrap();
    assert_eq!(events.recv().await.unwrap(), SyncEvent::SlotChanged { slot: 1 });
    manager.save_slot(1).await.unwrap();
    assert_eq!(events.recv().await.unwrap(), SyncEvent::SlotSaved { slot: 1 });

    manager.disconnect().await;
    assert_eq!(events.recv().await.unwrap(), SyncEvent::Cleared);
}

#[tokio::test(start_paused = true)]
async fn test_read_stored_config() {
    let deck = SimDeck::new();
    let manager = connected(&deck).await;
    manager.set_slot(5, label("Local")).unwrap();

    let stored = manager.read_stored_config().await.unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(stored.buttons.len(), 12);
    assert_eq!(stored.buttons[5].label, "Mute");
    assert_eq!(stored.buttons[5].action, ButtonAction::Media(0xE2));
    // In-memory edit untouched
    assert_eq!(manager.buttons()[5].label, "Local");
}

#[tokio::test(start_paused = true)]
async fn test_test_button() {
    let deck = SimDeck::new();
    let manager = connected(&deck).await;

    manager.test_button(3).await.unwrap();
    assert_eq!(deck.count(cmd::TEST_BUTTON), 1);

    let err = manager.test_button(12).await.unwrap_err();
    assert!(matches!(err, DeckError::InvalidParameter(_)));
    assert_eq!(deck.count(cmd::TEST_BUTTON), 1);
}

#[tokio::test(start_paused = true)]
async fn test_keymap_upload_is_chunked() {
    let deck = SimDeck::new();
    let mut settings = DeckSettings::default();
    settings.protocol.keymap_chunk_size = 100;
    let manager = manager_with(&deck, settings);
    manager.connect(&deck.discovered()).await.unwrap();

    let chunks = manager.push_keymap().await.unwrap();
    let writes = deck.state.lock().keymap_writes.clone();
    assert_eq!(writes.len(), chunks);
    assert!(chunks > 1);
    assert!(writes.iter().all(|w| w.len() <= 100));

    let json = String::from_utf8(writes.concat()).unwrap();
    let doc = KeymapDocument::from_json(&json).unwrap();
    assert_eq!(doc, manager.synchronizer().keymap());
    assert_eq!(doc.buttons[0].action, "MEDIA_PLAY_PAUSE");
    assert_eq!(doc.buttons[7].action, "KEY_F20");
}

#[tokio::test(start_paused = true)]
async fn test_apply_keymap_saves_changes() {
    let deck = SimDeck::new();
    let manager = connected(&deck).await;

    let doc = KeymapDocument::from_json(
        r##"{"version":1,"buttons":[{"id":1,"label":"Skip","action":"MEDIA_NEXT","color":"#000000"}]}"##,
    )
    .unwrap();
    assert_eq!(manager.apply_keymap(&doc).await.unwrap(), 1);

    let state = deck.state.lock();
    assert_eq!(state.buttons[1].label(), "Skip");
    assert_eq!(state.buttons[1].rgb, [0, 0, 0]);
    assert_eq!(state.buttons[1].code, 0xB5);
}

#[tokio::test(start_paused = true)]
async fn test_save_on_dead_link_ends_session() {
    let deck = SimDeck::new();
    let manager = connected(&deck).await;
    let sync = manager.synchronizer();

    manager.set_slot(0, label("Rec")).unwrap();
    deck.cut_link();

    let err = manager.save_all().await.unwrap_err();
    assert!(matches!(err, DeckError::Transport(_)));
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(manager.device_info().is_none());
    assert_eq!(sync.pending_saves(), 0);
    assert!(!sync.is_dirty());
    assert_eq!(sync.len(), 15);
    assert_eq!(sync.button(0).unwrap().label, "Button 1");

    let err = manager.save_slot(0).await.unwrap_err();
    assert!(matches!(err, DeckError::NotReady { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_debounced_save_on_dead_link_ends_session() {
    let deck = SimDeck::new();
    let manager = connected(&deck).await;

    manager.set_slot(4, label("Late")).unwrap();
    deck.cut_link();

    sleep(Duration::from_secs(3)).await;
    assert_eq!(deck.count(cmd::SET_BUTTON), 0);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(!manager.is_connected());
    assert_eq!(deck.state.lock().closes, 1);
    assert_eq!(manager.synchronizer().pending_saves(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reset_on_dead_link_ends_session() {
    let deck = SimDeck::new();
    let manager = connected(&deck).await;

    deck.cut_link();
    let err = manager.reset().await.unwrap_err();
    assert!(matches!(err, DeckError::Transport(_)));
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(deck.count(cmd::RESET_CONFIG), 0);
    assert_eq!(deck.state.lock().closes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_rearm_at_debounce_deadline() {
    let deck = SimDeck::new();
    let manager = connected(&deck).await;
    let sync = manager.synchronizer();

    manager.set_slot(6, label("One")).unwrap();
    sleep(manager.settings().timing.save_debounce()).await;
    // Lands on the first timer's deadline
    manager.set_slot(6, label("Two")).unwrap();
    assert_eq!(sync.pending_saves(), 1);

    sleep(Duration::from_secs(3)).await;
    assert_eq!(sync.pending_saves(), 0);
    assert!(!sync.is_dirty());
    assert!(deck.count(cmd::SET_BUTTON) >= 1);
    assert_eq!(deck.state.lock().buttons[6].label(), "Two");
}
