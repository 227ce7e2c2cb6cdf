use std::path::PathBuf;

use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use zendesk_extract::config::{StorageConfig, ZendeskConfig};
use zendesk_extract::pipeline::Extractor;
use zendesk_extract::storage::GcsBucket;
use zendesk_extract::zendesk::ZendeskClient;

pub const TEST_BUCKET: &str = "extract-test";

/// One mock Zendesk, one mock GCS, and a throwaway data root. The harness
/// owns the tempdir so artifacts survive for assertions until the test ends.
pub struct TestHarness {
    pub zendesk: MockServer,
    pub gcs: MockServer,
    pub data_root: TempDir,
}

impl TestHarness {
    pub async fn spawn() -> Self {
        Self {
            zendesk: MockServer::start().await,
            gcs: MockServer::start().await,
            data_root: tempfile::tempdir().expect("tempdir"),
        }
    }

    // Clients are built directly rather than via env vars; set_var would race
    // across test threads.
    pub fn extractor(&self) -> Extractor {
        let zendesk_config = ZendeskConfig {
            email: "ops@example.com".to_string(),
            token: "tok".to_string(),
            subdomain: "acme".to_string(),
            timeout_secs: 5,
        };
        let storage_config = StorageConfig {
            bucket: TEST_BUCKET.to_string(),
            access_token: Some("test-token".to_string()),
            credentials_path: None,
            timeout_secs: 5,
        };
        let client = ZendeskClient::with_base_url(
            Url::parse(&self.zendesk.uri()).expect("zendesk url"),
            &zendesk_config,
        );
        let bucket = GcsBucket::with_base_url(
            Url::parse(&self.gcs.uri()).expect("gcs url"),
            &storage_config,
        );
        Extractor::new(client, bucket, self.data_root.path().to_path_buf())
    }

    pub fn endpoint_dir(&self) -> PathBuf {
        self.data_root.path().join("data").join("ticket_metrics")
    }

    pub async fn mount_listing(&self, metrics: &[serde_json::Value]) {
        Mock::given(method("GET"))
            .and(path("/api/v2/ticket_metrics.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ticket_metrics": metrics,
                "meta": { "has_more": false },
            })))
            .mount(&self.zendesk)
            .await;
    }

    pub async fn mount_ticket_metric(&self, ticket_id: u64, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(format!("/api/v2/tickets/{ticket_id}/metrics.json")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ticket_metric": body,
            })))
            .mount(&self.zendesk)
            .await;
    }

    pub async fn mount_ticket_metric_missing(&self, ticket_id: u64) {
        Mock::given(method("GET"))
            .and(path(format!("/api/v2/tickets/{ticket_id}/metrics.json")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&self.zendesk)
            .await;
    }

    pub async fn mount_gcs_upload(&self) {
        Mock::given(method("POST"))
            .and(path(format!("/upload/storage/v1/b/{TEST_BUCKET}/o")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "bucket": TEST_BUCKET,
            })))
            .mount(&self.gcs)
            .await;
    }

    /// Bodies of every upload the mock GCS accepted, in arrival order, keyed
    /// by the object name from the query string.
    pub async fn gcs_uploads(&self) -> Vec<(String, Vec<u8>)> {
        self.gcs
            .received_requests()
            .await
            .expect("gcs requests")
            .into_iter()
            .map(|request| {
                let name = request
                    .url
                    .query_pairs()
                    .find(|(k, _)| k == "name")
                    .map(|(_, v)| v.to_string())
                    .expect("name query param");
                (name, request.body)
            })
            .collect()
    }

    /// How many per-ticket metric fetches the mock Zendesk has seen so far.
    pub async fn ticket_fetch_count(&self) -> usize {
        self.zendesk
            .received_requests()
            .await
            .expect("zendesk requests")
            .iter()
            .filter(|request| request.url.path().starts_with("/api/v2/tickets/"))
            .count()
    }
}
