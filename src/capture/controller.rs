use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::info;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::capture::CaptureMessage;
use crate::db::Database;
use crate::store::CaptureStore;

use super::loop_worker::{autosave_loop, ingest_loop, retention_loop, IngestStats};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy)]
pub struct CaptureIntervals {
    pub sweep: Duration,
    pub autosave: Duration,
}

struct RunningCapture {
    cancel_token: CancellationToken,
    ingest: JoinHandle<IngestStats>,
    retention: JoinHandle<()>,
    autosave: JoinHandle<()>,
}

/// Owns the ingest, retention and autosave tasks for one capture run.
pub struct CaptureController {
    running: Option<RunningCapture>,
}

impl Default for CaptureController {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureController {
    pub fn new() -> Self {
        Self { running: None }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Spawn the background tasks and return the sender event sources push into.
    pub fn start(
        &mut self,
        store: CaptureStore,
        db: Database,
        intervals: CaptureIntervals,
    ) -> Result<mpsc::Sender<CaptureMessage>> {
        if self.running.is_some() {
            bail!("capture already active");
        }

        let saved_revision = store.revision();
        let cancel_token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let ingest = tokio::spawn(ingest_loop(store.clone(), rx, cancel_token.clone()));
        let retention = tokio::spawn(retention_loop(
            store.clone(),
            intervals.sweep,
            cancel_token.clone(),
        ));
        let autosave = tokio::spawn(autosave_loop(
            store,
            db,
            saved_revision,
            intervals.autosave,
            cancel_token.clone(),
        ));

        info!(
            "Capture started (sweep every {:?}, autosave every {:?})",
            intervals.sweep, intervals.autosave
        );

        self.running = Some(RunningCapture {
            cancel_token,
            ingest,
            retention,
            autosave,
        });
        Ok(tx)
    }

    /// Wait for the ingest task to drain its channel (all senders dropped),
    /// then stop the remaining tasks.
    pub async fn drain(&mut self) -> Result<IngestStats> {
        let Some(running) = self.running.take() else {
            return Ok(IngestStats::default());
        };

        let stats = running
            .ingest
            .await
            .context("ingest task failed to join")?;
        running.cancel_token.cancel();
        Self::join_background(running.retention, running.autosave).await?;
        Ok(stats)
    }

    /// Cancel all tasks immediately. Events still queued are discarded.
    pub async fn stop(&mut self) -> Result<IngestStats> {
        let Some(running) = self.running.take() else {
            return Ok(IngestStats::default());
        };

        running.cancel_token.cancel();
        let stats = running
            .ingest
            .await
            .context("ingest task failed to join")?;
        Self::join_background(running.retention, running.autosave).await?;
        Ok(stats)
    }

    async fn join_background(retention: JoinHandle<()>, autosave: JoinHandle<()>) -> Result<()> {
        retention
            .await
            .context("retention task failed to join")?;
        autosave.await.context("autosave task failed to join")?;
        Ok(())
    }
}
