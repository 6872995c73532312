use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::capture::CaptureMessage;
use crate::db::Database;
use crate::store::CaptureStore;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info};

/// Counters reported by [`ingest_loop`] when it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub applied: u64,
    pub ignored: u64,
    pub dropped: u64,
}

/// Feed events into the store in arrival order until the channel closes or the
/// token is cancelled. Time is stamped when each event is applied.
pub async fn ingest_loop(
    store: CaptureStore,
    mut rx: mpsc::Receiver<CaptureMessage>,
    cancel_token: CancellationToken,
) -> IngestStats {
    let mut stats = IngestStats::default();

    loop {
        let message = tokio::select! {
            message = rx.recv() => message,
            _ = cancel_token.cancelled() => {
                log_info!("ingest loop shutting down");
                break;
            }
        };
        let Some(message) = message else {
            log_info!("event channel closed; ingest loop exiting");
            break;
        };

        let kind = message.event.kind();
        let Some(context) = message.context else {
            stats.dropped += 1;
            log_debug!("dropping {} event without a valid context", kind);
            continue;
        };

        let outcome = store.apply(message.event, &context);
        if outcome.changed() {
            stats.applied += 1;
        } else {
            stats.ignored += 1;
        }
        log_debug!("{} event -> {:?}", kind, outcome);
    }

    stats
}

/// Run the retention sweep every `interval` until cancelled.
pub async fn retention_loop(
    store: CaptureStore,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = store.sweep();
                if !report.is_noop() {
                    log_info!(
                        "retention sweep removed {} segments and {} buckets",
                        report.segments_removed,
                        report.buckets_removed
                    );
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("retention loop shutting down");
                break;
            }
        }
    }
}

/// Persist the full store state.
pub async fn save_store(store: &CaptureStore, db: &Database) -> Result<usize> {
    let buckets = store.snapshot();
    let count = buckets.len();
    db.save_buckets(&buckets)
        .await
        .context("failed to persist capture state")?;
    Ok(count)
}

/// Save after the store revision moves past `saved_revision`. Changes are
/// coalesced so at most one save happens per `interval`, plus a final one on
/// cancellation if anything is still unsaved.
pub async fn autosave_loop(
    store: CaptureStore,
    db: Database,
    mut saved_revision: u64,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut revisions = store.subscribe();
    let mut pending = *revisions.borrow_and_update() != saved_revision;

    loop {
        if !pending {
            tokio::select! {
                changed = revisions.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = cancel_token.cancelled() => break,
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel_token.cancelled() => break,
        }

        let current = *revisions.borrow_and_update();
        pending = false;
        if current == saved_revision {
            continue;
        }
        match save_store(&store, &db).await {
            Ok(count) => {
                saved_revision = current;
                log_debug!("autosaved {} buckets at revision {}", count, current);
            }
            Err(err) => {
                pending = true;
                log_error!("autosave failed: {err:?}");
            }
        }
    }

    if store.revision() != saved_revision {
        match save_store(&store, &db).await {
            Ok(count) => log_info!("saved {} buckets on shutdown", count),
            Err(err) => log_error!("final save failed: {err:?}"),
        }
    }
    log_info!("autosave loop shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureEvent;
    use crate::models::WindowContext;
    use crate::segmentation::EngineConfig;
    use chrono::Utc;
    use tempfile::TempDir;

    fn context(title: &str) -> WindowContext {
        WindowContext::new("com.editor", "Editor", title, Utc::now())
    }

    #[tokio::test]
    async fn ingest_loop_applies_in_order_and_drops_contextless() {
        let store = CaptureStore::new(EngineConfig::default());
        let (tx, rx) = mpsc::channel(16);

        tx.send(CaptureMessage::new(CaptureEvent::Text("ab".into()), context("a")))
            .await
            .unwrap();
        tx.send(CaptureMessage::new(CaptureEvent::Backspace, context("a")))
            .await
            .unwrap();
        tx.send(CaptureMessage::without_context(CaptureEvent::Text("secret".into())))
            .await
            .unwrap();
        tx.send(CaptureMessage::new(CaptureEvent::Backspace, context("missing")))
            .await
            .unwrap();
        drop(tx);

        let stats = ingest_loop(store.clone(), rx, CancellationToken::new()).await;
        assert_eq!(
            stats,
            IngestStats {
                applied: 2,
                ignored: 1,
                dropped: 1,
            }
        );

        let views = store.all_segments_chronological();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].text, "a");
    }

    #[tokio::test]
    async fn ingest_loop_stops_on_cancel() {
        let store = CaptureStore::new(EngineConfig::default());
        let (_tx, rx) = mpsc::channel::<CaptureMessage>(1);
        let token = CancellationToken::new();
        token.cancel();

        let stats = ingest_loop(store, rx, token).await;
        assert_eq!(stats, IngestStats::default());
    }

    #[tokio::test]
    async fn retention_loop_sweeps_expired_state() {
        let store = CaptureStore::new(EngineConfig::new(300, 60).unwrap());
        let stale = Utc::now() - chrono::Duration::hours(2);
        let ctx = context("old");
        store.apply_at(CaptureEvent::Text("gone".into()), &ctx, stale);
        store.apply_at(
            CaptureEvent::Text("next".into()),
            &ctx,
            stale + chrono::Duration::minutes(10),
        );

        let token = CancellationToken::new();
        let handle = tokio::spawn(retention_loop(
            store.clone(),
            Duration::from_millis(10),
            token.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        handle.await.unwrap();

        let views = store.all_segments_chronological();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].text, "next");
    }

    #[tokio::test]
    async fn autosave_loop_saves_on_shutdown() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(temp_dir.path().join("capture.sqlite3")).unwrap();
        let store = CaptureStore::new(EngineConfig::default());

        let token = CancellationToken::new();
        let handle = tokio::spawn(autosave_loop(
            store.clone(),
            db.clone(),
            store.revision(),
            Duration::from_secs(3_600),
            token.clone(),
        ));
        // Let the loop reach its idle wait before mutating.
        tokio::time::sleep(Duration::from_millis(20)).await;

        store.ingest_text("persist me", &context("doc"));
        token.cancel();
        handle.await.unwrap();

        let loaded = db.load_buckets().await.unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].segments[0].text, "persist me");
    }

    #[tokio::test]
    async fn autosave_loop_saves_after_change_without_shutdown() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(temp_dir.path().join("capture.sqlite3")).unwrap();
        let store = CaptureStore::new(EngineConfig::default());

        let token = CancellationToken::new();
        let handle = tokio::spawn(autosave_loop(
            store.clone(),
            db.clone(),
            store.revision(),
            Duration::from_millis(20),
            token.clone(),
        ));

        store.ingest_text("early", &context("doc"));
        tokio::time::sleep(Duration::from_millis(200)).await;

        let loaded = db.load_buckets().await.unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].segments[0].text, "early");

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn autosave_loop_saves_changes_made_before_it_started() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(temp_dir.path().join("capture.sqlite3")).unwrap();
        let store = CaptureStore::new(EngineConfig::default());
        let saved_revision = store.revision();
        store.ingest_text("queued", &context("doc"));

        let token = CancellationToken::new();
        let handle = tokio::spawn(autosave_loop(
            store.clone(),
            db.clone(),
            saved_revision,
            Duration::from_millis(20),
            token.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(200)).await;

        let loaded = db.load_buckets().await.unwrap().unwrap();
        assert_eq!(loaded[0].segments[0].text, "queued");

        token.cancel();
        handle.await.unwrap();
    }
}
