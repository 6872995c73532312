//! Segmentation engine: owns every bucket and decides session boundaries.
//!
//! Buckets live in an arena keyed by their id, with a second index from
//! [`ContextKey`] to bucket id so that routing never depends on the surrogate
//! id carried by an incoming [`WindowContext`]. All operations are total:
//! missing buckets, missing active segments and empty backspaces are no-ops.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::capture::CaptureEvent;
use crate::models::{Bucket, ContextKey, Segment, WindowContext};
use crate::segmentation::config::{ConfigError, EngineConfig};
use crate::segmentation::retention::{prune_bucket, SweepReport};
use crate::snapshot::MalformedStateError;

/// What a single ingest call did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Text was appended to the bucket's active segment.
    Appended { bucket_id: String },
    /// A new segment was opened (first event, or after an inactivity gap).
    StartedSegment { bucket_id: String, segment_id: String },
    /// One character was removed from the active segment.
    Deleted { bucket_id: String },
    /// Nothing changed.
    Ignored,
}

impl IngestOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, IngestOutcome::Ignored)
    }

    pub fn bucket_id(&self) -> Option<&str> {
        match self {
            IngestOutcome::Appended { bucket_id }
            | IngestOutcome::StartedSegment { bucket_id, .. }
            | IngestOutcome::Deleted { bucket_id } => Some(bucket_id),
            IngestOutcome::Ignored => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct Engine {
    config: EngineConfig,
    buckets: HashMap<String, Bucket>,
    index: HashMap<ContextKey, String>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            buckets: HashMap::new(),
            index: HashMap::new(),
        }
    }

    /// Rebuild an engine from previously validated buckets.
    ///
    /// Callers are expected to run [`crate::snapshot::validate_buckets`] first;
    /// if two buckets still share a context key the later one wins the index.
    pub fn from_buckets(config: EngineConfig, buckets: Vec<Bucket>) -> Self {
        let mut engine = Self::new(config);
        for bucket in buckets {
            engine.index.insert(bucket.key(), bucket.id.clone());
            engine.buckets.insert(bucket.id.clone(), bucket);
        }
        engine
    }

    /// Fail-open restore: malformed state yields an empty engine plus the error.
    pub fn restore(
        config: EngineConfig,
        loaded: Result<Vec<Bucket>, MalformedStateError>,
    ) -> (Self, Option<MalformedStateError>) {
        match loaded {
            Ok(buckets) => (Self::from_buckets(config, buckets), None),
            Err(err) => (Self::new(config), Some(err)),
        }
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    pub fn set_config(&mut self, config: EngineConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn bucket(&self, bucket_id: &str) -> Option<&Bucket> {
        self.buckets.get(bucket_id)
    }

    pub fn bucket_for(&self, context: &WindowContext) -> Option<&Bucket> {
        self.index
            .get(&context.key())
            .and_then(|bucket_id| self.buckets.get(bucket_id))
    }

    pub fn buckets(&self) -> impl Iterator<Item = &Bucket> {
        self.buckets.values()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Route one captured event. This is the single entry point event sources use.
    pub fn apply(
        &mut self,
        event: CaptureEvent,
        context: &WindowContext,
        now: DateTime<Utc>,
    ) -> IngestOutcome {
        match event {
            CaptureEvent::Text(text) => self.ingest_text(&text, context, now),
            CaptureEvent::Backspace => self.ingest_backspace(context, now),
            CaptureEvent::Newline => self.ingest_newline(context, now),
            CaptureEvent::Paste(text) => self.ingest_paste(&text, context, now),
        }
    }

    /// Append typed text, opening a new segment when the bucket is new or has
    /// been idle for longer than the inactivity timeout.
    pub fn ingest_text(
        &mut self,
        text: &str,
        context: &WindowContext,
        now: DateTime<Utc>,
    ) -> IngestOutcome {
        let timeout = self.config.inactivity_timeout();
        let bucket = self.resolve_or_create(context, now);

        let idle = now - bucket.last_activity_at > timeout;
        let extend_active = !idle && bucket.active_segment().is_some();

        let outcome = if extend_active {
            if let Some(active) = bucket.active_segment_mut() {
                active.text.push_str(text);
            }
            IngestOutcome::Appended {
                bucket_id: bucket.id.clone(),
            }
        } else {
            // The old session went idle at the previous activity time, not now.
            let went_idle_at = bucket.last_activity_at;
            if let Some(active) = bucket.active_segment_mut() {
                active.ended_at = Some(went_idle_at);
            }

            // Never start before the bucket's latest activity, so segment order
            // survives a wall clock that stepped backwards.
            let segment = Segment::start(now.max(went_idle_at), text);
            let segment_id = segment.id.clone();
            bucket.segments.push(segment);
            IngestOutcome::StartedSegment {
                bucket_id: bucket.id.clone(),
                segment_id,
            }
        };

        bucket.touch(now);
        outcome
    }

    /// Remove the last character of the active segment. Never opens a segment.
    pub fn ingest_backspace(&mut self, context: &WindowContext, now: DateTime<Utc>) -> IngestOutcome {
        let Some(bucket_id) = self.index.get(&context.key()) else {
            return IngestOutcome::Ignored;
        };
        let Some(bucket) = self.buckets.get_mut(bucket_id) else {
            return IngestOutcome::Ignored;
        };
        let Some(active) = bucket.active_segment_mut() else {
            return IngestOutcome::Ignored;
        };
        if active.text.pop().is_none() {
            return IngestOutcome::Ignored;
        }

        bucket.touch(now);
        IngestOutcome::Deleted {
            bucket_id: bucket.id.clone(),
        }
    }

    pub fn ingest_newline(&mut self, context: &WindowContext, now: DateTime<Utc>) -> IngestOutcome {
        self.ingest_text("\n", context, now)
    }

    /// Pasted text is one atomic append under the same segmentation rule as typing.
    pub fn ingest_paste(
        &mut self,
        text: &str,
        context: &WindowContext,
        now: DateTime<Utc>,
    ) -> IngestOutcome {
        self.ingest_text(text, context, now)
    }

    /// Drop a bucket and everything in it. Returns whether it existed.
    pub fn clear_bucket(&mut self, bucket_id: &str) -> bool {
        match self.buckets.remove(bucket_id) {
            Some(bucket) => {
                self.index.remove(&bucket.key());
                true
            }
            None => false,
        }
    }

    /// Drop every bucket. Returns how many were removed.
    pub fn clear_all(&mut self) -> usize {
        let removed = self.buckets.len();
        self.buckets.clear();
        self.index.clear();
        removed
    }

    /// Retention pass: prune expired segments, then delete emptied buckets.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> SweepReport {
        let retention = self.config.retention_period();
        let mut report = SweepReport::default();

        for bucket in self.buckets.values_mut() {
            report.segments_removed += prune_bucket(bucket, now, retention);
        }

        let emptied: Vec<String> = self
            .buckets
            .values()
            .filter(|bucket| bucket.segments.is_empty())
            .map(|bucket| bucket.id.clone())
            .collect();

        for bucket_id in emptied {
            if self.clear_bucket(&bucket_id) {
                report.buckets_removed += 1;
            }
        }

        report
    }

    fn resolve_or_create(&mut self, context: &WindowContext, now: DateTime<Utc>) -> &mut Bucket {
        let bucket_id = self
            .index
            .entry(context.key())
            .or_insert_with(|| Uuid::new_v4().to_string())
            .clone();

        let bucket = self
            .buckets
            .entry(bucket_id.clone())
            .or_insert_with(|| Bucket::with_id(bucket_id, context.clone(), now));

        // Display fields may change between observations of the same target.
        if bucket.context.app_name != context.app_name {
            bucket.context.app_name = context.app_name.clone();
        }
        bucket
    }
}
