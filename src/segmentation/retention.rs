use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::{Bucket, Segment};

/// Totals from one retention pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub segments_removed: usize,
    pub buckets_removed: usize,
}

impl SweepReport {
    pub fn is_noop(&self) -> bool {
        self.segments_removed == 0 && self.buckets_removed == 0
    }
}

/// Whether `segment` has outlived the retention period.
///
/// Ended segments expire by `ended_at`. An active segment expires only when it
/// is empty and was *started* before the cutoff; non-empty active segments are
/// kept regardless of age.
pub fn is_expired(segment: &Segment, now: DateTime<Utc>, retention: Duration) -> bool {
    let Some(cutoff) = now.checked_sub_signed(retention) else {
        return false;
    };

    match segment.ended_at {
        Some(ended_at) => ended_at < cutoff,
        None => segment.text.is_empty() && segment.started_at < cutoff,
    }
}

/// Drop expired segments from `bucket`, preserving order. Returns how many went.
pub fn prune_bucket(bucket: &mut Bucket, now: DateTime<Utc>, retention: Duration) -> usize {
    let before = bucket.segments.len();
    bucket
        .segments
        .retain(|segment| !is_expired(segment, now, retention));
    before - bucket.segments.len()
}
