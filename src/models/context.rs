//! Window context data model.
//!
//! A `WindowContext` describes where text was typed. Routing only ever looks at
//! the `(app_id, window_title)` pair exposed through [`ContextKey`]; `id` and
//! `created_at` are carried along for display and debugging.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Composite routing key for a context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextKey {
    pub app_id: String,
    pub window_title: String,
}

impl ContextKey {
    pub fn new(app_id: impl Into<String>, window_title: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            window_title: window_title.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowContext {
    pub id: String,
    pub app_id: String,
    pub app_name: String,
    pub window_title: String,
    pub created_at: DateTime<Utc>,
}

impl WindowContext {
    /// Build a fresh observation with a new surrogate id.
    pub fn new(
        app_id: impl Into<String>,
        app_name: impl Into<String>,
        window_title: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            app_id: app_id.into(),
            app_name: app_name.into(),
            window_title: window_title.into(),
            created_at,
        }
    }

    pub fn key(&self) -> ContextKey {
        ContextKey::new(self.app_id.clone(), self.window_title.clone())
    }

    /// `"App — Title"`, or just the app name for untitled windows.
    pub fn display_name(&self) -> String {
        if self.window_title.is_empty() {
            self.app_name.clone()
        } else {
            format!("{} — {}", self.app_name, self.window_title)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn key_ignores_id_and_creation_time() {
        let now = Utc::now();
        let first = WindowContext::new("com.editor", "Editor", "notes.md", now);
        let second = WindowContext::new("com.editor", "Editor (beta)", "notes.md", now + Duration::hours(1));

        assert_ne!(first.id, second.id);
        assert_eq!(first.key(), second.key());
    }

    #[test]
    fn different_window_title_is_a_different_target() {
        let now = Utc::now();
        let first = WindowContext::new("com.editor", "Editor", "a.md", now);
        let second = WindowContext::new("com.editor", "Editor", "b.md", now);

        assert_ne!(first.key(), second.key());
    }

    #[test]
    fn display_name_omits_empty_title() {
        let now = Utc::now();
        let untitled = WindowContext::new("com.term", "Terminal", "", now);
        let titled = WindowContext::new("com.term", "Terminal", "zsh", now);

        assert_eq!(untitled.display_name(), "Terminal");
        assert_eq!(titled.display_name(), "Terminal — zsh");
    }
}
