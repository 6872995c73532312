//! Read-only projections over engine state.
//!
//! Every function takes `&Engine` and returns owned values, so a caller holding
//! the store lock for one call always sees a single consistent point in time.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use icu_collator::{Collator, CollatorOptions, Strength};
use log::warn;
use serde::Serialize;

use crate::models::{Bucket, Segment, SegmentState};
use crate::segmentation::Engine;

/// One segment together with the bucket it belongs to.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentView {
    pub bucket_id: String,
    pub display_name: String,
    pub segment_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub state: &'static str,
    pub character_count: usize,
    pub preview: String,
    pub text: String,
}

impl SegmentView {
    fn new(bucket: &Bucket, segment: &Segment) -> Self {
        Self {
            bucket_id: bucket.id.clone(),
            display_name: bucket.context.display_name(),
            segment_id: segment.id.clone(),
            started_at: segment.started_at,
            ended_at: segment.ended_at,
            state: segment.state().as_str(),
            character_count: segment.character_count(),
            preview: segment.preview(),
            text: segment.text.clone(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == SegmentState::Active.as_str()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketSummary {
    pub bucket_id: String,
    pub app_id: String,
    pub app_name: String,
    pub window_title: String,
    pub display_name: String,
    pub last_activity_at: DateTime<Utc>,
    pub segment_count: usize,
    pub character_count: usize,
    pub has_active_segment: bool,
}

impl From<&Bucket> for BucketSummary {
    fn from(bucket: &Bucket) -> Self {
        Self {
            bucket_id: bucket.id.clone(),
            app_id: bucket.context.app_id.clone(),
            app_name: bucket.context.app_name.clone(),
            window_title: bucket.context.window_title.clone(),
            display_name: bucket.context.display_name(),
            last_activity_at: bucket.last_activity_at,
            segment_count: bucket.segments.len(),
            character_count: bucket.character_count(),
            has_active_segment: bucket.active_segment().is_some(),
        }
    }
}

/// Every segment across all buckets, newest first.
pub fn all_segments_chronological(engine: &Engine) -> Vec<SegmentView> {
    let mut views: Vec<SegmentView> = engine
        .buckets()
        .flat_map(|bucket| {
            bucket
                .segments
                .iter()
                .map(move |segment| SegmentView::new(bucket, segment))
        })
        .collect();

    views.sort_by(|a, b| {
        b.started_at
            .cmp(&a.started_at)
            .then_with(|| a.segment_id.cmp(&b.segment_id))
    });
    views
}

/// Buckets with the most recent activity first.
pub fn buckets_by_activity(engine: &Engine) -> Vec<BucketSummary> {
    let mut summaries: Vec<BucketSummary> = engine.buckets().map(BucketSummary::from).collect();
    summaries.sort_by(|a, b| {
        b.last_activity_at
            .cmp(&a.last_activity_at)
            .then_with(|| a.bucket_id.cmp(&b.bucket_id))
    });
    summaries
}

/// Buckets ordered by display name using Unicode collation, ignoring case.
pub fn buckets_by_name(engine: &Engine) -> Vec<BucketSummary> {
    let collator = name_collator();
    let mut summaries: Vec<BucketSummary> = engine.buckets().map(BucketSummary::from).collect();
    summaries.sort_by(|a, b| {
        compare_display_names(collator.as_ref(), &a.display_name, &b.display_name)
            .then_with(|| a.bucket_id.cmp(&b.bucket_id))
    });
    summaries
}

pub fn total_character_count(engine: &Engine) -> usize {
    engine.buckets().map(Bucket::character_count).sum()
}

/// True when no bucket holds a segment; buckets emptied in place count as absent.
pub fn is_empty(engine: &Engine) -> bool {
    engine.buckets().all(Bucket::is_empty)
}

// Secondary strength: accents matter, case does not.
fn name_collator() -> Option<Collator> {
    let mut options = CollatorOptions::new();
    options.strength = Some(Strength::Secondary);
    match Collator::try_new(&Default::default(), options) {
        Ok(collator) => Some(collator),
        Err(err) => {
            warn!("Collation data unavailable ({err}); sorting names by lowercase code point");
            None
        }
    }
}

fn compare_display_names(collator: Option<&Collator>, a: &str, b: &str) -> Ordering {
    let primary = match collator {
        Some(collator) => collator.compare(a, b),
        None => a.to_lowercase().cmp(&b.to_lowercase()),
    };
    primary.then_with(|| a.cmp(b))
}
