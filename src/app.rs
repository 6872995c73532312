use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::capture::{source::stdin_source, CaptureController, CaptureIntervals};
use crate::db::Database;
use crate::settings::{CaptureSettings, SettingsStore};
use crate::snapshot::encode_state;
use crate::store::CaptureStore;

const DB_FILE_NAME: &str = "typetrail.sqlite3";
const SETTINGS_FILE_NAME: &str = "settings.json";

/// Command-line overrides for the two live engine values.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigOverrides {
    pub inactivity_timeout_secs: Option<u64>,
    pub retention_period_secs: Option<u64>,
}

impl ConfigOverrides {
    fn is_empty(&self) -> bool {
        self.inactivity_timeout_secs.is_none() && self.retention_period_secs.is_none()
    }

    fn apply(&self, mut settings: CaptureSettings) -> CaptureSettings {
        if let Some(secs) = self.inactivity_timeout_secs {
            settings.inactivity_timeout_secs = secs;
        }
        if let Some(secs) = self.retention_period_secs {
            settings.retention_period_secs = secs;
        }
        settings
    }
}

pub struct AppState {
    pub db: Database,
    pub settings: SettingsStore,
    pub store: CaptureStore,
}

impl AppState {
    /// Open settings and database under `data_dir` and restore captured state.
    ///
    /// Unreadable or malformed stored state is discarded with a warning rather
    /// than failing startup.
    pub async fn open(data_dir: &Path, overrides: ConfigOverrides) -> Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let settings = SettingsStore::new(data_dir.join(SETTINGS_FILE_NAME))?;
        let db = Database::new(data_dir.join(DB_FILE_NAME))?;

        let loaded = match db.load_buckets().await {
            Ok(state) => state,
            Err(err) => {
                warn!("Failed to read stored capture state: {err:#}; starting empty");
                Ok(Vec::new())
            }
        };
        let (store, _malformed) =
            CaptureStore::restore_or_empty(settings.capture().engine_config(), loaded);

        let app = Self {
            db,
            settings,
            store,
        };
        if !overrides.is_empty() {
            app.update_settings(overrides.apply(app.settings.capture()))?;
        }

        info!(
            "Restored {} buckets ({} characters) from {}",
            app.store.buckets_by_activity().len(),
            app.store.total_character_count(),
            app.db.path().display()
        );
        Ok(app)
    }

    /// Persist new settings and push the engine values into the live store.
    pub fn update_settings(&self, settings: CaptureSettings) -> Result<()> {
        self.settings.update_capture(settings)?;
        self.store
            .set_config(self.settings.capture().engine_config())
            .context("settings accepted but rejected by engine")?;
        Ok(())
    }

    pub async fn save(&self) -> Result<usize> {
        crate::capture::loop_worker::save_store(&self.store, &self.db).await
    }

    /// Capture from stdin until EOF or Ctrl-C, then persist.
    pub async fn run_capture(&self) -> Result<()> {
        let capture = self.settings.capture();
        let intervals = CaptureIntervals {
            sweep: Duration::from_secs(capture.sweep_interval_secs),
            autosave: Duration::from_secs(capture.autosave_interval_secs),
        };

        let mut controller = CaptureController::new();
        let tx = controller.start(self.store.clone(), self.db.clone(), intervals)?;
        let source_token = CancellationToken::new();
        let source = tokio::spawn(stdin_source(tx, source_token.clone()));

        let stats = tokio::select! {
            result = source => {
                match result.context("event source task failed to join")? {
                    Ok(forwarded) => info!("Event source finished after {forwarded} messages"),
                    Err(err) => warn!("Event source stopped: {err:#}"),
                }
                controller.drain().await?
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                info!("Interrupt received; stopping capture");
                source_token.cancel();
                controller.stop().await?
            }
        };

        let saved = self.save().await?;
        info!(
            "Capture stopped: {} applied, {} ignored, {} dropped; {} buckets saved",
            stats.applied, stats.ignored, stats.dropped, saved
        );
        Ok(())
    }

    pub fn export(&self, output: Option<&PathBuf>) -> Result<()> {
        let encoded = encode_state(&self.store.snapshot())?;
        match output {
            Some(path) => fs::write(path, encoded)
                .with_context(|| format!("failed to write export to {}", path.display()))?,
            None => println!("{encoded}"),
        }
        Ok(())
    }

    pub fn print_stats(&self, by_name: bool, with_segments: bool) {
        let (buckets, segments, total, empty) = self.store.read(|engine| {
            use crate::segmentation::query;
            let buckets = if by_name {
                query::buckets_by_name(engine)
            } else {
                query::buckets_by_activity(engine)
            };
            let segments = if with_segments {
                query::all_segments_chronological(engine)
            } else {
                Vec::new()
            };
            (
                buckets,
                segments,
                query::total_character_count(engine),
                query::is_empty(engine),
            )
        });

        if empty {
            println!("No captured text.");
            return;
        }

        for bucket in &buckets {
            println!(
                "{}  {}  {} segments  {} chars  last active {}{}",
                bucket.bucket_id,
                bucket.display_name,
                bucket.segment_count,
                bucket.character_count,
                bucket.last_activity_at.to_rfc3339(),
                if bucket.has_active_segment { "  (active)" } else { "" }
            );
        }
        for segment in &segments {
            println!(
                "  {}  [{}]  {}  {}",
                segment.started_at.to_rfc3339(),
                segment.state,
                segment.display_name,
                segment.preview
            );
        }
        println!("{} buckets, {} characters", buckets.len(), total);
    }

    /// Clear one bucket or everything, and persist the result.
    pub async fn clear(&self, bucket_id: Option<&str>) -> Result<()> {
        match bucket_id {
            Some(bucket_id) => {
                if !self.store.clear_bucket(bucket_id) {
                    warn!("No bucket with id {bucket_id}");
                }
                self.save().await?;
            }
            None => {
                let removed = self.store.clear_all();
                self.db.clear_buckets().await?;
                info!("Cleared {removed} buckets");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WindowContext;
    use chrono::Utc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn open_restores_previous_state() {
        let temp_dir = TempDir::new().unwrap();
        {
            let app = AppState::open(temp_dir.path(), ConfigOverrides::default())
                .await
                .unwrap();
            let context = WindowContext::new("com.editor", "Editor", "doc", Utc::now());
            app.store.ingest_text("remember me", &context);
            app.save().await.unwrap();
        }

        let reopened = AppState::open(temp_dir.path(), ConfigOverrides::default())
            .await
            .unwrap();
        assert_eq!(reopened.db.path(), temp_dir.path().join(DB_FILE_NAME));
        let views = reopened.store.all_segments_chronological();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].text, "remember me");
    }

    #[tokio::test]
    async fn overrides_are_saved_and_applied() {
        let temp_dir = TempDir::new().unwrap();
        let overrides = ConfigOverrides {
            inactivity_timeout_secs: Some(15),
            retention_period_secs: None,
        };
        let app = AppState::open(temp_dir.path(), overrides).await.unwrap();

        assert_eq!(app.store.config().inactivity_timeout_secs, 15);
        assert_eq!(app.settings.capture().inactivity_timeout_secs, 15);
    }

    #[tokio::test]
    async fn zero_override_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let overrides = ConfigOverrides {
            inactivity_timeout_secs: None,
            retention_period_secs: Some(0),
        };
        assert!(AppState::open(temp_dir.path(), overrides).await.is_err());
    }

    #[tokio::test]
    async fn clear_persists_for_next_open() {
        let temp_dir = TempDir::new().unwrap();
        let app = AppState::open(temp_dir.path(), ConfigOverrides::default())
            .await
            .unwrap();
        let keep = WindowContext::new("com.chat", "Chat", "", Utc::now());
        let drop_me = WindowContext::new("com.editor", "Editor", "doc", Utc::now());
        app.store.ingest_text("keep", &keep);
        let bucket_id = app
            .store
            .ingest_text("drop", &drop_me)
            .bucket_id()
            .unwrap()
            .to_string();
        app.save().await.unwrap();

        app.clear(Some(&bucket_id)).await.unwrap();
        let stored = app.db.load_buckets().await.unwrap().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].context.app_id, "com.chat");

        app.clear(None).await.unwrap();
        assert!(app.store.is_empty());
        assert!(app.db.load_buckets().await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn export_writes_json_file() {
        let temp_dir = TempDir::new().unwrap();
        let app = AppState::open(temp_dir.path(), ConfigOverrides::default())
            .await
            .unwrap();
        let context = WindowContext::new("com.editor", "Editor", "doc", Utc::now());
        app.store.ingest_text("exported", &context);

        let output = temp_dir.path().join("export.json");
        app.export(Some(&output)).unwrap();

        let decoded = crate::snapshot::decode_state(&fs::read_to_string(output).unwrap()).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].segments[0].text, "exported");
    }
}
