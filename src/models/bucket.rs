use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ContextKey, Segment, WindowContext};

/// All segments captured for one `(app_id, window_title)` pair.
///
/// Segments stay ordered by `started_at`; only the last one may be active.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub id: String,
    pub context: WindowContext,
    pub segments: Vec<Segment>,
    pub last_activity_at: DateTime<Utc>,
}

impl Bucket {
    pub fn new(context: WindowContext, now: DateTime<Utc>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), context, now)
    }

    pub fn with_id(id: String, context: WindowContext, now: DateTime<Utc>) -> Self {
        Self {
            id,
            context,
            segments: Vec::new(),
            last_activity_at: now,
        }
    }

    pub fn key(&self) -> ContextKey {
        self.context.key()
    }

    pub fn active_segment(&self) -> Option<&Segment> {
        self.segments.last().filter(|segment| segment.is_active())
    }

    pub fn active_segment_mut(&mut self) -> Option<&mut Segment> {
        self.segments.last_mut().filter(|segment| segment.is_active())
    }

    pub fn character_count(&self) -> usize {
        self.segments.iter().map(Segment::character_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Advance `last_activity_at`, never moving it backwards.
    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_activity_at {
            self.last_activity_at = now;
        }
    }
}
