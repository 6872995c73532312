//! Persisted state codec.
//!
//! The stored shape is a JSON array of bucket records with RFC 3339 timestamps:
//!
//! ```json
//! [ { "id": "...",
//!     "context": { "id": "...", "appId": "...", "appName": "...", "windowTitle": "...", "createdAt": "..." },
//!     "segments": [ { "id": "...", "startedAt": "...", "text": "...", "endedAt": "..." } ],
//!     "lastActivityAt": "..." } ]
//! ```
//!
//! Decoding validates every bucket invariant before handing buckets to the
//! engine; a record that would break one is rejected as a whole.

use std::collections::HashSet;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::models::Bucket;

#[derive(Debug, Error)]
pub enum MalformedStateError {
    #[error("state is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("bucket {bucket_id}: {field} is unreadable: {reason}")]
    Record {
        bucket_id: String,
        field: &'static str,
        reason: String,
    },

    #[error("bucket {bucket_id}: segments are not ordered by start time")]
    SegmentsOutOfOrder { bucket_id: String },

    #[error("bucket {bucket_id}: segment {segment_id} is active but not last")]
    ActiveSegmentNotLast { bucket_id: String, segment_id: String },

    #[error("bucket {bucket_id}: segment {segment_id} ends before it starts")]
    SegmentEndsBeforeStart { bucket_id: String, segment_id: String },

    #[error("bucket {bucket_id}: last activity precedes segment {segment_id}")]
    ActivityBeforeSegment { bucket_id: String, segment_id: String },

    #[error("bucket id {bucket_id} appears more than once")]
    DuplicateBucketId { bucket_id: String },

    #[error("buckets share context ({app_id}, {window_title})")]
    DuplicateContext { app_id: String, window_title: String },
}

pub fn encode_state(buckets: &[Bucket]) -> Result<String> {
    serde_json::to_string_pretty(buckets).context("failed to serialize capture state")
}

pub fn decode_state(raw: &str) -> Result<Vec<Bucket>, MalformedStateError> {
    let buckets: Vec<Bucket> = serde_json::from_str(raw)?;
    validate_buckets(buckets)
}

/// Check bucket invariants and return the buckets unchanged if they all hold.
pub fn validate_buckets(buckets: Vec<Bucket>) -> Result<Vec<Bucket>, MalformedStateError> {
    let mut seen_ids = HashSet::new();
    let mut seen_keys = HashSet::new();

    for bucket in &buckets {
        if !seen_ids.insert(bucket.id.clone()) {
            return Err(MalformedStateError::DuplicateBucketId {
                bucket_id: bucket.id.clone(),
            });
        }
        if !seen_keys.insert(bucket.key()) {
            return Err(MalformedStateError::DuplicateContext {
                app_id: bucket.context.app_id.clone(),
                window_title: bucket.context.window_title.clone(),
            });
        }
        validate_bucket(bucket)?;
    }

    Ok(buckets)
}

fn validate_bucket(bucket: &Bucket) -> Result<(), MalformedStateError> {
    let last_index = bucket.segments.len().saturating_sub(1);

    for (index, segment) in bucket.segments.iter().enumerate() {
        if index > 0 && bucket.segments[index - 1].started_at > segment.started_at {
            return Err(MalformedStateError::SegmentsOutOfOrder {
                bucket_id: bucket.id.clone(),
            });
        }

        if segment.is_active() && index != last_index {
            return Err(MalformedStateError::ActiveSegmentNotLast {
                bucket_id: bucket.id.clone(),
                segment_id: segment.id.clone(),
            });
        }

        if let Some(ended_at) = segment.ended_at {
            if ended_at < segment.started_at {
                return Err(MalformedStateError::SegmentEndsBeforeStart {
                    bucket_id: bucket.id.clone(),
                    segment_id: segment.id.clone(),
                });
            }
        }

        let latest = segment.ended_at.unwrap_or(segment.started_at).max(segment.started_at);
        if bucket.last_activity_at < latest {
            return Err(MalformedStateError::ActivityBeforeSegment {
                bucket_id: bucket.id.clone(),
                segment_id: segment.id.clone(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Segment, WindowContext};
    use crate::segmentation::{Engine, EngineConfig};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()
    }

    fn engine_with_history() -> Engine {
        let mut engine = Engine::new(EngineConfig::default());
        let editor = WindowContext::new("com.editor", "Editor", "main.rs", t0());
        let shell = WindowContext::new("com.term", "Terminal", "", t0());

        engine.ingest_text("fn main", &editor, t0());
        engine.ingest_text("() {}", &editor, t0() + Duration::seconds(20));
        engine.ingest_text("cargo", &shell, t0() + Duration::seconds(30));
        engine.ingest_text("// later", &editor, t0() + Duration::seconds(900));
        engine
    }

    #[test]
    fn round_trip_preserves_buckets_and_segment_order() {
        let engine = engine_with_history();
        let buckets: Vec<Bucket> = engine.buckets().cloned().collect();

        let encoded = encode_state(&buckets).unwrap();
        let mut decoded = decode_state(&encoded).unwrap();

        let mut original = buckets;
        original.sort_by(|a, b| a.id.cmp(&b.id));
        decoded.sort_by(|a, b| a.id.cmp(&b.id));

        assert_eq!(original.len(), decoded.len());
        for (before, after) in original.iter().zip(&decoded) {
            assert_eq!(before.id, after.id);
            assert_eq!(before.context.id, after.context.id);
            assert_eq!(before.key(), after.key());
            assert_eq!(before.context.app_name, after.context.app_name);
            assert_eq!(before.context.created_at, after.context.created_at);
            assert_eq!(before.last_activity_at, after.last_activity_at);
            assert_eq!(before.segments, after.segments);
        }
    }

    #[test]
    fn encoded_shape_uses_camel_case_and_omits_open_end() {
        let engine = engine_with_history();
        let buckets: Vec<Bucket> = engine.buckets().cloned().collect();
        let value: serde_json::Value =
            serde_json::from_str(&encode_state(&buckets).unwrap()).unwrap();

        let first = &value.as_array().unwrap()[0];
        assert!(first.get("lastActivityAt").is_some());
        assert!(first["context"].get("windowTitle").is_some());
        let segments = first["segments"].as_array().unwrap();
        assert!(segments.last().unwrap().get("endedAt").is_none());
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            decode_state("{not json"),
            Err(MalformedStateError::Decode(_))
        ));
        assert!(matches!(
            decode_state(r#"[{"id": 7}]"#),
            Err(MalformedStateError::Decode(_))
        ));
    }

    fn bucket_with(segments: Vec<Segment>, last_activity_at: DateTime<Utc>) -> Bucket {
        let mut bucket = Bucket::new(
            WindowContext::new("com.editor", "Editor", "doc", t0()),
            last_activity_at,
        );
        bucket.segments = segments;
        bucket
    }

    fn ended(start: DateTime<Utc>, end: DateTime<Utc>) -> Segment {
        let mut segment = Segment::start(start, "x");
        segment.ended_at = Some(end);
        segment
    }

    #[test]
    fn rejects_active_segment_before_the_end() {
        let bucket = bucket_with(
            vec![
                Segment::start(t0(), "open"),
                Segment::start(t0() + Duration::seconds(5), "also open"),
            ],
            t0() + Duration::seconds(5),
        );
        assert!(matches!(
            validate_buckets(vec![bucket]),
            Err(MalformedStateError::ActiveSegmentNotLast { .. })
        ));
    }

    #[test]
    fn rejects_out_of_order_segments() {
        let bucket = bucket_with(
            vec![
                ended(t0() + Duration::seconds(60), t0() + Duration::seconds(60)),
                ended(t0(), t0()),
            ],
            t0() + Duration::seconds(60),
        );
        assert!(matches!(
            validate_buckets(vec![bucket]),
            Err(MalformedStateError::SegmentsOutOfOrder { .. })
        ));
    }

    #[test]
    fn rejects_end_before_start_and_stale_activity() {
        let backwards = bucket_with(vec![ended(t0(), t0() - Duration::seconds(1))], t0());
        assert!(matches!(
            validate_buckets(vec![backwards]),
            Err(MalformedStateError::SegmentEndsBeforeStart { .. })
        ));

        let stale = bucket_with(
            vec![Segment::start(t0(), "x")],
            t0() - Duration::seconds(1),
        );
        assert!(matches!(
            validate_buckets(vec![stale]),
            Err(MalformedStateError::ActivityBeforeSegment { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_contexts_and_ids() {
        let first = bucket_with(vec![Segment::start(t0(), "a")], t0());
        let second = bucket_with(vec![Segment::start(t0(), "b")], t0());
        assert!(matches!(
            validate_buckets(vec![first.clone(), second]),
            Err(MalformedStateError::DuplicateContext { .. })
        ));

        assert!(matches!(
            validate_buckets(vec![first.clone(), first]),
            Err(MalformedStateError::DuplicateBucketId { .. })
        ));
    }

    #[test]
    fn accepts_all_ended_bucket() {
        let bucket = bucket_with(vec![ended(t0(), t0() + Duration::seconds(3))], t0() + Duration::seconds(3));
        assert_eq!(validate_buckets(vec![bucket]).unwrap().len(), 1);
    }
}
