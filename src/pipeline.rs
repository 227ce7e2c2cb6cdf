use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::artifact::write_artifact;
use crate::backfill::{
    claim_archive_backfill, complete_archive_backfill, fetch_archive_metrics, missing_ticket_ids,
};
use crate::config::Config;
use crate::error::ExtractError;
use crate::storage::{remote_key_for, GcsBucket};
use crate::window::{filter_window, window_start};
use crate::zendesk::{TicketMetric, ZendeskClient};

pub const ENDPOINT: &str = "ticket_metrics";
pub const SCHEMA: &str = "zendesk";

#[derive(Debug, Clone)]
pub struct DatasetReport {
    pub records: usize,
    pub local_path: PathBuf,
    pub remote_key: String,
    pub object_url: String,
}

#[derive(Debug, Clone)]
pub struct ExtractReport {
    pub run_id: Uuid,
    pub window_start: DateTime<Utc>,
    pub archive: Option<DatasetReport>,
    pub window: DatasetReport,
}

pub struct Extractor {
    zendesk: ZendeskClient,
    bucket: GcsBucket,
    data_root: PathBuf,
}

impl Extractor {
    pub fn new(zendesk: ZendeskClient, bucket: GcsBucket, data_root: PathBuf) -> Self {
        Self {
            zendesk,
            bucket,
            data_root,
        }
    }

    /// One full extraction: the one-time archive backfill if this run claims
    /// it, then the trailing-window snapshot. Stages run strictly in order
    /// and the first failure aborts the run.
    pub async fn run(&self) -> Result<ExtractReport, ExtractError> {
        let run_id = Uuid::new_v4();
        let now = Utc::now();
        let start = window_start(now);
        let endpoint_dir = self.data_root.join("data").join(ENDPOINT);

        tracing::info!(%run_id, window_start = %start, "Extract run starting");

        let archive = match claim_archive_backfill(&endpoint_dir, ENDPOINT, now)? {
            Some(marker_path) => Some(self.backfill_archive(&endpoint_dir, &marker_path).await?),
            None => {
                tracing::debug!("Archive marker present, skipping backfill");
                None
            }
        };

        let window = self.snapshot_window(&endpoint_dir, start).await?;

        tracing::info!(
            %run_id,
            backfilled = archive.is_some(),
            window_records = window.records,
            "Extract run complete"
        );

        Ok(ExtractReport {
            run_id,
            window_start: start,
            archive,
            window,
        })
    }

    async fn backfill_archive(
        &self,
        endpoint_dir: &Path,
        marker_path: &Path,
    ) -> Result<DatasetReport, ExtractError> {
        tracing::info!("Claimed one-time archive backfill");

        let listing = self.zendesk.list_ticket_metrics().await?;
        let present: BTreeSet<u64> = listing.iter().map(|m| m.ticket_id).collect();
        let missing = missing_ticket_ids(&present)?;
        tracing::info!(
            listed = listing.len(),
            gap = missing.len(),
            "Computed archive id gap"
        );

        let metrics = fetch_archive_metrics(&self.zendesk, &missing).await?;
        let report = self
            .publish(&metrics, endpoint_dir.join("archive.json.gz"))
            .await?;
        complete_archive_backfill(marker_path, Utc::now())?;
        tracing::info!(
            records = report.records,
            url = %report.object_url,
            "Archive backfill complete"
        );
        Ok(report)
    }

    async fn snapshot_window(
        &self,
        endpoint_dir: &Path,
        start: DateTime<Utc>,
    ) -> Result<DatasetReport, ExtractError> {
        // Listed fresh even right after a backfill so the snapshot is not
        // stale by however long the backfill took.
        let listing = self.zendesk.list_ticket_metrics().await?;
        let recent = filter_window(listing, start)?;

        let file_name = format!("{}.json.gz", start.format("%Y-%m-%d"));
        let report = self.publish(&recent, endpoint_dir.join(file_name)).await?;
        tracing::info!(
            records = report.records,
            url = %report.object_url,
            "Window snapshot complete"
        );
        Ok(report)
    }

    async fn publish(
        &self,
        records: &[TicketMetric],
        path: PathBuf,
    ) -> Result<DatasetReport, ExtractError> {
        let local_path = write_artifact(records, &path)?;
        let remote_key = remote_key_for(&local_path, SCHEMA)?;
        let confirmation = self.bucket.upload(&local_path, &remote_key).await?;
        tracing::debug!(
            key = %confirmation.remote_key,
            bytes = confirmation.bytes,
            "Uploaded artifact"
        );
        Ok(DatasetReport {
            records: records.len(),
            local_path,
            remote_key: confirmation.remote_key,
            object_url: confirmation.public_url,
        })
    }
}

pub async fn run_from_config(config: &Config) -> Result<ExtractReport, ExtractError> {
    let zendesk = ZendeskClient::new(&config.zendesk)?;
    let bucket = GcsBucket::new(&config.storage)?;
    Extractor::new(zendesk, bucket, config.data_root.clone())
        .run()
        .await
}
