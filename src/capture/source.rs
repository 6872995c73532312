//! Reference event source reading JSON lines.
//!
//! Each line is one message:
//!
//! ```json
//! {"context": {"appId": "com.editor", "appName": "Editor", "windowTitle": "notes.md"},
//!  "event": {"type": "text", "text": "hello"}}
//! ```
//!
//! `"context": null` marks an event with no valid target; it is forwarded as
//! such and dropped by the ingest loop.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::capture::{CaptureEvent, CaptureMessage};
use crate::models::WindowContext;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContextLine {
    app_id: String,
    #[serde(default)]
    app_name: Option<String>,
    #[serde(default)]
    window_title: String,
}

#[derive(Debug, Deserialize)]
struct EventLine {
    #[serde(default)]
    context: Option<ContextLine>,
    event: CaptureEvent,
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<CaptureMessage>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let parsed: EventLine = serde_json::from_str(trimmed).context("invalid event line")?;
    let context = parsed.context.map(|ctx| {
        let app_name = ctx.app_name.unwrap_or_else(|| ctx.app_id.clone());
        WindowContext::new(ctx.app_id, app_name, ctx.window_title, Utc::now())
    });

    Ok(Some(CaptureMessage {
        event: parsed.event,
        context,
    }))
}

/// Forward every parsable line from `reader` into `tx` until EOF or cancellation.
///
/// Returns the number of messages forwarded.
pub async fn read_events<R>(
    reader: R,
    tx: mpsc::Sender<CaptureMessage>,
    cancel_token: CancellationToken,
) -> Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0u64;
    let mut line_number = 0u64;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read event line")?,
            _ = cancel_token.cancelled() => break,
        };
        let Some(line) = line else {
            log_info!("event source reached end of input after {} messages", forwarded);
            break;
        };
        line_number += 1;

        match parse_line(&line) {
            Ok(Some(message)) => {
                if tx.send(message).await.is_err() {
                    log_warn!("ingest loop closed; stopping event source");
                    break;
                }
                forwarded += 1;
            }
            Ok(None) => {}
            Err(err) => log_warn!("skipping line {}: {err:#}", line_number),
        }
    }

    Ok(forwarded)
}

/// Read events from standard input.
pub async fn stdin_source(
    tx: mpsc::Sender<CaptureMessage>,
    cancel_token: CancellationToken,
) -> Result<u64> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    read_events(stdin, tx, cancel_token).await
}
