//! Shared, serialized access to the engine.
//!
//! `CaptureStore` is the one place the rest of the application touches capture
//! state. Every mutation and every query runs under a single mutex, and each
//! state change bumps a revision published over a `watch` channel.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::warn;
use tokio::sync::watch;

use crate::capture::CaptureEvent;
use crate::models::{Bucket, WindowContext};
use crate::segmentation::{
    query::{self, BucketSummary, SegmentView},
    ConfigError, Engine, EngineConfig, IngestOutcome, SweepReport,
};
use crate::snapshot::MalformedStateError;

struct StoreInner {
    engine: Mutex<Engine>,
    revision: watch::Sender<u64>,
}

#[derive(Clone)]
pub struct CaptureStore {
    inner: Arc<StoreInner>,
}

impl CaptureStore {
    pub fn new(config: EngineConfig) -> Self {
        Self::from_engine(Engine::new(config))
    }

    pub fn from_engine(engine: Engine) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(StoreInner {
                engine: Mutex::new(engine),
                revision,
            }),
        }
    }

    /// Start from persisted buckets, or from nothing if they were malformed.
    pub fn restore_or_empty(
        config: EngineConfig,
        loaded: Result<Vec<Bucket>, MalformedStateError>,
    ) -> (Self, Option<MalformedStateError>) {
        let (engine, err) = Engine::restore(config, loaded);
        if let Some(err) = &err {
            warn!("Discarding unreadable capture state: {err}");
        }
        (Self::from_engine(engine), err)
    }

    /// Receive the latest revision number after every state change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.inner.revision.borrow()
    }

    /// Run `f` with the lock held. Use for reads that need several projections
    /// from the same point in time.
    pub fn read<T>(&self, f: impl FnOnce(&Engine) -> T) -> T {
        let guard = self.lock();
        f(&guard)
    }

    /// Route an event using the current wall clock.
    pub fn apply(&self, event: CaptureEvent, context: &WindowContext) -> IngestOutcome {
        self.mutate(|engine| engine.apply(event, context, Utc::now()), IngestOutcome::changed)
    }

    pub fn apply_at(
        &self,
        event: CaptureEvent,
        context: &WindowContext,
        now: DateTime<Utc>,
    ) -> IngestOutcome {
        self.mutate(|engine| engine.apply(event, context, now), IngestOutcome::changed)
    }

    pub fn ingest_text(&self, text: &str, context: &WindowContext) -> IngestOutcome {
        self.mutate(
            |engine| engine.ingest_text(text, context, Utc::now()),
            IngestOutcome::changed,
        )
    }

    pub fn ingest_backspace(&self, context: &WindowContext) -> IngestOutcome {
        self.mutate(
            |engine| engine.ingest_backspace(context, Utc::now()),
            IngestOutcome::changed,
        )
    }

    pub fn ingest_newline(&self, context: &WindowContext) -> IngestOutcome {
        self.mutate(
            |engine| engine.ingest_newline(context, Utc::now()),
            IngestOutcome::changed,
        )
    }

    pub fn ingest_paste(&self, text: &str, context: &WindowContext) -> IngestOutcome {
        self.mutate(
            |engine| engine.ingest_paste(text, context, Utc::now()),
            IngestOutcome::changed,
        )
    }

    pub fn clear_bucket(&self, bucket_id: &str) -> bool {
        self.mutate(|engine| engine.clear_bucket(bucket_id), |removed| *removed)
    }

    pub fn clear_all(&self) -> usize {
        self.mutate(|engine| engine.clear_all(), |removed| *removed > 0)
    }

    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        self.mutate(|engine| engine.sweep(now), |report| !report.is_noop())
    }

    pub fn config(&self) -> EngineConfig {
        self.lock().config()
    }

    pub fn set_config(&self, config: EngineConfig) -> Result<(), ConfigError> {
        self.lock().set_config(config)
    }

    pub fn bucket(&self, bucket_id: &str) -> Option<Bucket> {
        self.lock().bucket(bucket_id).cloned()
    }

    /// Copy of every bucket, for persistence.
    pub fn snapshot(&self) -> Vec<Bucket> {
        self.lock().buckets().cloned().collect()
    }

    pub fn all_segments_chronological(&self) -> Vec<SegmentView> {
        self.read(query::all_segments_chronological)
    }

    pub fn buckets_by_activity(&self) -> Vec<BucketSummary> {
        self.read(query::buckets_by_activity)
    }

    pub fn buckets_by_name(&self) -> Vec<BucketSummary> {
        self.read(query::buckets_by_name)
    }

    pub fn total_character_count(&self) -> usize {
        self.read(query::total_character_count)
    }

    pub fn is_empty(&self) -> bool {
        self.read(query::is_empty)
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut Engine) -> T, changed: impl Fn(&T) -> bool) -> T {
        let result = {
            let mut guard = self.lock();
            f(&mut guard)
        };
        if changed(&result) {
            self.inner.revision.send_modify(|revision| *revision += 1);
        }
        result
    }

    fn lock(&self) -> MutexGuard<'_, Engine> {
        match self.inner.engine.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
