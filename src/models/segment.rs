use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const PREVIEW_MAX_CHARS: usize = 100;
const PREVIEW_ELLIPSIS: &str = "...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    Active,
    Ended,
}

impl SegmentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentState::Active => "active",
            SegmentState::Ended => "ended",
        }
    }
}

/// One continuous typing session inside a bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl Segment {
    pub fn start(started_at: DateTime<Utc>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            started_at,
            text: text.into(),
            ended_at: None,
        }
    }

    pub fn state(&self) -> SegmentState {
        if self.ended_at.is_some() {
            SegmentState::Ended
        } else {
            SegmentState::Active
        }
    }

    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    pub fn character_count(&self) -> usize {
        self.text.chars().count()
    }

    /// First line of the text, capped at 100 characters.
    pub fn preview(&self) -> String {
        let first_line = self.text.lines().next().unwrap_or("");
        if first_line.chars().count() > PREVIEW_MAX_CHARS {
            let mut preview: String = first_line.chars().take(PREVIEW_MAX_CHARS).collect();
            preview.push_str(PREVIEW_ELLIPSIS);
            preview
        } else {
            first_line.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_segment_is_active() {
        let segment = Segment::start(Utc::now(), "hello");
        assert!(segment.is_active());
        assert_eq!(segment.state(), SegmentState::Active);
        assert_eq!(segment.character_count(), 5);
    }

    #[test]
    fn character_count_counts_chars_not_bytes() {
        let segment = Segment::start(Utc::now(), "héllo ✓");
        assert_eq!(segment.character_count(), 7);
    }

    #[test]
    fn preview_takes_first_line() {
        let segment = Segment::start(Utc::now(), "first line\nsecond line");
        assert_eq!(segment.preview(), "first line");
    }

    #[test]
    fn preview_truncates_long_lines() {
        let segment = Segment::start(Utc::now(), "x".repeat(150));
        let preview = segment.preview();
        assert_eq!(preview.chars().count(), PREVIEW_MAX_CHARS + PREVIEW_ELLIPSIS.len());
        assert!(preview.ends_with("..."));

        let exact = Segment::start(Utc::now(), "y".repeat(PREVIEW_MAX_CHARS));
        assert_eq!(exact.preview(), "y".repeat(PREVIEW_MAX_CHARS));
    }

    #[test]
    fn ended_at_is_omitted_from_json_when_active() {
        let segment = Segment::start(Utc::now(), "a");
        let json = serde_json::to_value(&segment).unwrap();
        assert!(json.get("endedAt").is_none());
        assert!(json.get("startedAt").is_some());
    }
}
