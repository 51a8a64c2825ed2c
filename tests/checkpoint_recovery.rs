//! Checkpoint persistence and recovery across runs.

use std::sync::Arc;

use imgbulk_core::{CHECKPOINT_FILE_NAME, ContentHash, Ledger, LedgerState};
use tempfile::TempDir;

fn populated_state() -> LedgerState {
    LedgerState::from_parts(
        (0..50).map(|n| format!("https://img.example.com/{n}.jpg")),
        (0..50).map(|n: u32| (ContentHash::of(&n.to_be_bytes()), format!("{n}.jpg"))),
    )
}

#[tokio::test]
async fn test_snapshot_restore_round_trip_preserves_state() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join(CHECKPOINT_FILE_NAME);
    let ledger = Ledger::from_state(populated_state());

    ledger.snapshot(&path).await.expect("snapshot written");
    let restored = Ledger::restore(&path).await;

    let state = restored.state().await;
    assert_eq!(state, populated_state());
    assert_eq!(state.attempted_urls()[0], "https://img.example.com/0.jpg");
    assert_eq!(
        state.filename_for(&ContentHash::of(&7_u32.to_be_bytes())),
        Some("7.jpg")
    );
}

#[tokio::test]
async fn test_restore_without_history_starts_empty() {
    let dir = TempDir::new().expect("temp dir");
    let restored = Ledger::restore(&dir.path().join(CHECKPOINT_FILE_NAME)).await;
    assert_eq!(restored.state().await, LedgerState::new());
}

#[tokio::test]
async fn test_restore_truncated_history_starts_empty() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join(CHECKPOINT_FILE_NAME);
    Ledger::from_state(populated_state())
        .snapshot(&path)
        .await
        .expect("snapshot written");

    let full = std::fs::read(&path).expect("read checkpoint");
    std::fs::write(&path, &full[..full.len() / 2]).expect("truncate checkpoint");

    let restored = Ledger::restore(&path).await;
    assert_eq!(restored.state().await.attempted_count(), 0);
}

#[tokio::test]
async fn test_restore_history_with_bad_hash_starts_empty() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join(CHECKPOINT_FILE_NAME);
    std::fs::write(
        &path,
        r#"{"version":1,"attempted_urls":["u"],"content_hashes":{"xyz":"a.jpg"}}"#,
    )
    .expect("write checkpoint");

    let restored = Ledger::restore(&path).await;
    assert_eq!(restored.state().await.attempted_count(), 0);
}

#[tokio::test]
async fn test_snapshot_during_concurrent_updates_is_consistent() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join(CHECKPOINT_FILE_NAME);
    let ledger = Arc::new(Ledger::new());

    let writer = {
        let ledger = Arc::clone(&ledger);
        tokio::spawn(async move {
            for n in 0..500_u32 {
                let mut state = ledger.lock().await;
                state.reserve(ContentHash::of(&n.to_be_bytes()), format!("{n}.png"));
                state.record_attempt(&format!("https://e.com/{n}.png"));
            }
        })
    };

    for _ in 0..10 {
        ledger.snapshot(&path).await.expect("snapshot written");
        let restored = Ledger::restore(&path).await.state().await;
        assert_eq!(restored.attempted_count(), restored.hash_count());
    }
    writer.await.expect("writer finishes");

    ledger.snapshot(&path).await.expect("final snapshot");
    let restored = Ledger::restore(&path).await.state().await;
    assert_eq!(restored.hash_count(), 500);
    assert_eq!(restored.attempted_count(), 500);
}

#[tokio::test]
async fn test_failed_snapshot_keeps_previous_checkpoint() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join(CHECKPOINT_FILE_NAME);
    Ledger::from_state(populated_state())
        .snapshot(&path)
        .await
        .expect("snapshot written");

    // A directory in place of the temporary file makes the next write fail.
    std::fs::create_dir(dir.path().join(format!(".{CHECKPOINT_FILE_NAME}.tmp")))
        .expect("block temp path");
    let result = Ledger::new().snapshot(&path).await;

    assert!(result.is_err());
    let restored = Ledger::restore(&path).await;
    assert_eq!(restored.state().await.attempted_count(), 50);
}
