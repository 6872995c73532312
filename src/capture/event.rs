use serde::{Deserialize, Serialize};

use crate::models::WindowContext;

/// Unit of input delivered by an event source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "text", rename_all = "lowercase")]
pub enum CaptureEvent {
    Text(String),
    Backspace,
    Newline,
    Paste(String),
}

impl CaptureEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            CaptureEvent::Text(_) => "text",
            CaptureEvent::Backspace => "backspace",
            CaptureEvent::Newline => "newline",
            CaptureEvent::Paste(_) => "paste",
        }
    }
}

/// An event paired with the context it was observed in.
///
/// `context == None` means the resolver could not identify a valid target
/// (no focused window, excluded app, secure field); such messages are dropped.
#[derive(Debug, Clone)]
pub struct CaptureMessage {
    pub event: CaptureEvent,
    pub context: Option<WindowContext>,
}

impl CaptureMessage {
    pub fn new(event: CaptureEvent, context: WindowContext) -> Self {
        Self {
            event,
            context: Some(context),
        }
    }

    pub fn without_context(event: CaptureEvent) -> Self {
        Self {
            event,
            context: None,
        }
    }
}
