use std::collections::HashMap;

use anyhow::{Context, Result};
use rusqlite::{params, Row};

use crate::db::{
    helpers::{parse_datetime, parse_optional_datetime, to_i64},
    Database,
};
use crate::models::{Bucket, Segment, WindowContext};
use crate::snapshot::{validate_buckets, MalformedStateError};

/// Outcome of reading stored state: the outer error is I/O, the inner one means
/// the rows were readable but do not describe a valid capture history.
pub type StoredState = std::result::Result<Vec<Bucket>, MalformedStateError>;

struct BucketRow {
    id: String,
    context_id: String,
    app_id: String,
    app_name: String,
    window_title: String,
    context_created_at: String,
    last_activity_at: String,
}

struct SegmentRow {
    id: String,
    bucket_id: String,
    started_at: String,
    text: String,
    ended_at: Option<String>,
}

fn row_to_bucket(row: &Row) -> Result<BucketRow, rusqlite::Error> {
    Ok(BucketRow {
        id: row.get("id")?,
        context_id: row.get("context_id")?,
        app_id: row.get("app_id")?,
        app_name: row.get("app_name")?,
        window_title: row.get("window_title")?,
        context_created_at: row.get("context_created_at")?,
        last_activity_at: row.get("last_activity_at")?,
    })
}

fn row_to_segment(row: &Row) -> Result<SegmentRow, rusqlite::Error> {
    Ok(SegmentRow {
        id: row.get("id")?,
        bucket_id: row.get("bucket_id")?,
        started_at: row.get("started_at")?,
        text: row.get("text")?,
        ended_at: row.get("ended_at")?,
    })
}

fn malformed(bucket_id: &str, field: &'static str, err: anyhow::Error) -> MalformedStateError {
    MalformedStateError::Record {
        bucket_id: bucket_id.to_string(),
        field,
        reason: format!("{err:#}"),
    }
}

fn assemble(bucket_rows: Vec<BucketRow>, segment_rows: Vec<SegmentRow>) -> StoredState {
    let mut segments_by_bucket: HashMap<String, Vec<SegmentRow>> = HashMap::new();
    for row in segment_rows {
        segments_by_bucket
            .entry(row.bucket_id.clone())
            .or_default()
            .push(row);
    }

    let mut buckets = Vec::with_capacity(bucket_rows.len());
    for row in bucket_rows {
        let created_at = parse_datetime(&row.context_created_at, "context_created_at")
            .map_err(|err| malformed(&row.id, "context_created_at", err))?;
        let last_activity_at = parse_datetime(&row.last_activity_at, "last_activity_at")
            .map_err(|err| malformed(&row.id, "last_activity_at", err))?;

        let mut segments = Vec::new();
        for segment in segments_by_bucket.remove(&row.id).unwrap_or_default() {
            segments.push(Segment {
                started_at: parse_datetime(&segment.started_at, "started_at")
                    .map_err(|err| malformed(&row.id, "started_at", err))?,
                ended_at: parse_optional_datetime(segment.ended_at, "ended_at")
                    .map_err(|err| malformed(&row.id, "ended_at", err))?,
                id: segment.id,
                text: segment.text,
            });
        }

        buckets.push(Bucket {
            id: row.id,
            context: WindowContext {
                id: row.context_id,
                app_id: row.app_id,
                app_name: row.app_name,
                window_title: row.window_title,
                created_at,
            },
            segments,
            last_activity_at,
        });
    }

    validate_buckets(buckets)
}

impl Database {
    /// Replace everything stored with `buckets` in a single transaction.
    pub async fn save_buckets(&self, buckets: &[Bucket]) -> Result<()> {
        let buckets = buckets.to_vec();
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            tx.execute("DELETE FROM segments", [])?;
            tx.execute("DELETE FROM buckets", [])?;

            for bucket in &buckets {
                tx.execute(
                    "INSERT INTO buckets (
                        id,
                        context_id,
                        app_id,
                        app_name,
                        window_title,
                        context_created_at,
                        last_activity_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        bucket.id,
                        bucket.context.id,
                        bucket.context.app_id,
                        bucket.context.app_name,
                        bucket.context.window_title,
                        bucket.context.created_at.to_rfc3339(),
                        bucket.last_activity_at.to_rfc3339(),
                    ],
                )
                .with_context(|| format!("failed to insert bucket {}", bucket.id))?;

                for (position, segment) in bucket.segments.iter().enumerate() {
                    tx.execute(
                        "INSERT INTO segments (
                            id,
                            bucket_id,
                            position,
                            started_at,
                            text,
                            ended_at
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            segment.id,
                            bucket.id,
                            to_i64(position)?,
                            segment.started_at.to_rfc3339(),
                            segment.text,
                            segment.ended_at.map(|dt| dt.to_rfc3339()),
                        ],
                    )
                    .with_context(|| format!("failed to insert segment {}", segment.id))?;
                }
            }

            tx.commit().context("failed to commit capture state")?;
            Ok(())
        })
        .await
    }

    /// Load stored buckets, validating them before they reach the engine.
    pub async fn load_buckets(&self) -> Result<StoredState> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT
                    id,
                    context_id,
                    app_id,
                    app_name,
                    window_title,
                    context_created_at,
                    last_activity_at
                FROM buckets",
            )?;
            let bucket_rows = stmt
                .query_map([], |row| row_to_bucket(row))?
                .collect::<Result<Vec<_>, _>>()
                .context("failed to read buckets")?;

            let mut stmt = conn.prepare(
                "SELECT
                    id,
                    bucket_id,
                    started_at,
                    text,
                    ended_at
                FROM segments
                ORDER BY bucket_id ASC, position ASC",
            )?;
            let segment_rows = stmt
                .query_map([], |row| row_to_segment(row))?
                .collect::<Result<Vec<_>, _>>()
                .context("failed to read segments")?;

            Ok(assemble(bucket_rows, segment_rows))
        })
        .await
    }

    pub async fn clear_buckets(&self) -> Result<usize> {
        self.execute(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM segments", [])?;
            let removed = tx.execute("DELETE FROM buckets", [])?;
            tx.commit()?;
            Ok(removed)
        })
        .await
    }
}
