use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ExtractError;
use crate::zendesk::{TicketMetric, ZendeskClient, ZendeskError};

pub const MARKER_FILE: &str = "archive.marker.json";

/// Latch for the one-time archive backfill. Its existence alone decides
/// whether the backfill runs again; `completed_at` only tells an operator
/// whether the owning run got all the way through.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveMarker {
    pub endpoint: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Claims the archive backfill for this run by creating the marker file.
/// The claim happens before any archival fetch: a run that crashes mid
/// backfill stays claimed and is never retried (at most once).
///
/// `Ok(Some(path))` means this run owns the backfill. `Ok(None)` means a
/// marker already exists and the backfill must be skipped entirely.
pub fn claim_archive_backfill(
    endpoint_dir: &Path,
    endpoint: &str,
    now: DateTime<Utc>,
) -> Result<Option<PathBuf>, MarkerError> {
    fs::create_dir_all(endpoint_dir).map_err(|source| MarkerError::Io {
        path: endpoint_dir.to_path_buf(),
        source,
    })?;

    let marker_path = endpoint_dir.join(MARKER_FILE);
    let file = match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&marker_path)
    {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(None),
        Err(source) => {
            return Err(MarkerError::Io {
                path: marker_path,
                source,
            })
        }
    };

    let marker = ArchiveMarker {
        endpoint: endpoint.to_string(),
        started_at: now,
        completed_at: None,
    };
    write_marker(file, &marker, &marker_path)?;
    Ok(Some(marker_path))
}

/// Stamps `completed_at` on an existing marker. Called by the claim owner
/// after the archive artifact has uploaded.
pub fn complete_archive_backfill(marker_path: &Path, now: DateTime<Utc>) -> Result<(), MarkerError> {
    let io_err = |source: io::Error| MarkerError::Io {
        path: marker_path.to_path_buf(),
        source,
    };
    let raw = fs::read(marker_path).map_err(io_err)?;
    let mut marker: ArchiveMarker = serde_json::from_slice(&raw)?;
    marker.completed_at = Some(now);
    let json = serde_json::to_vec_pretty(&marker)?;
    fs::write(marker_path, json).map_err(io_err)?;
    Ok(())
}

pub fn read_marker(marker_path: &Path) -> Result<ArchiveMarker, MarkerError> {
    let raw = fs::read(marker_path).map_err(|source| MarkerError::Io {
        path: marker_path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_slice(&raw)?)
}

fn write_marker(mut file: fs::File, marker: &ArchiveMarker, path: &Path) -> Result<(), MarkerError> {
    let json = serde_json::to_vec_pretty(marker)?;
    file.write_all(&json).map_err(|source| MarkerError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Ascending ticket ids in `[0, max)` absent from the live listing, where
/// `max` is the largest id currently listed. An empty listing cannot bound
/// the range and fails the run instead of producing one.
pub fn missing_ticket_ids(present: &BTreeSet<u64>) -> Result<Vec<u64>, ExtractError> {
    let max = match present.last() {
        Some(max) => *max,
        None => {
            return Err(ExtractError::Precondition(
                "cannot bound archive ids: ticket metrics listing is empty".to_string(),
            ))
        }
    };
    Ok((0..max).filter(|id| !present.contains(id)).collect())
}

/// Fetches metrics for the gap ids one by one. Tickets that no longer exist
/// have no metrics document; their 404s are skipped. Any other error aborts
/// the whole batch.
pub async fn fetch_archive_metrics(
    client: &ZendeskClient,
    missing: &[u64],
) -> Result<Vec<TicketMetric>, ZendeskError> {
    let mut metrics = Vec::with_capacity(missing.len());
    for &ticket_id in missing {
        match client.ticket_metric(ticket_id).await {
            Ok(metric) => metrics.push(metric),
            Err(ZendeskError::NotFound { .. }) => {
                tracing::debug!(ticket_id, "No metrics for gap ticket, skipping");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(metrics)
}

#[derive(Debug, thiserror::Error)]
pub enum MarkerError {
    #[error("marker io error at {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("marker encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}
