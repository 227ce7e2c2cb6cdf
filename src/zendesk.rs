use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ZendeskConfig;

/// One ticket-metrics record as Zendesk returns it. Only the fields the
/// pipeline inspects are typed; everything else passes through `extra`
/// untouched so artifacts reproduce the API payload exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketMetric {
    pub ticket_id: u64,
    pub updated_at: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct ZendeskClient {
    http: reqwest::Client,
    base_url: Url,
    email: String,
    token: String,
}

impl ZendeskClient {
    pub fn new(config: &ZendeskConfig) -> Result<Self, ZendeskError> {
        let base_url = Url::parse(&format!("https://{}.zendesk.com", config.subdomain))?;
        Ok(Self::with_base_url(base_url, config))
    }

    /// Test seam: point the client at a mock server instead of
    /// `https://{subdomain}.zendesk.com`.
    pub fn with_base_url(base_url: Url, config: &ZendeskConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url,
            email: config.email.clone(),
            token: config.token.clone(),
        }
    }

    /// Fetches the full ticket-metrics listing, following cursor pagination
    /// until the API reports no further pages.
    pub async fn list_ticket_metrics(&self) -> Result<Vec<TicketMetric>, ZendeskError> {
        let mut url = self.base_url.join("/api/v2/ticket_metrics.json")?;
        url.query_pairs_mut().append_pair("page[size]", "100");

        let mut metrics = Vec::new();
        loop {
            let page = self.get_page(url.clone()).await?;
            metrics.extend(page.ticket_metrics);

            let has_more = page.meta.as_ref().is_some_and(|m| m.has_more);
            match page.links.and_then(|l| l.next).filter(|_| has_more) {
                Some(next) => url = Url::parse(&next)?,
                None => break,
            }
        }
        Ok(metrics)
    }

    /// Fetches the metrics record for a single ticket. A 404 maps to
    /// `ZendeskError::NotFound` so callers can treat it as a policy decision
    /// rather than a generic API failure.
    pub async fn ticket_metric(&self, ticket_id: u64) -> Result<TicketMetric, ZendeskError> {
        let url = self
            .base_url
            .join(&format!("/api/v2/tickets/{ticket_id}/metrics.json"))?;
        let response = self.get(url.clone()).await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ZendeskError::NotFound { ticket_id });
        }
        if !status.is_success() {
            return Err(ZendeskError::Api {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let envelope = response.json::<MetricEnvelope>().await?;
        Ok(envelope.ticket_metric)
    }

    async fn get_page(&self, url: Url) -> Result<MetricsPage, ZendeskError> {
        let response = self.get(url.clone()).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ZendeskError::Api {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.json::<MetricsPage>().await?)
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response, ZendeskError> {
        // Zendesk API tokens authenticate as basic auth with a "/token" suffix
        // on the username.
        let response = self
            .http
            .get(url)
            .basic_auth(format!("{}/token", self.email), Some(&self.token))
            .send()
            .await?;
        Ok(response)
    }
}

#[derive(Debug, Deserialize)]
struct MetricsPage {
    ticket_metrics: Vec<TicketMetric>,
    #[serde(default)]
    meta: Option<PageMeta>,
    #[serde(default)]
    links: Option<PageLinks>,
}

#[derive(Debug, Deserialize)]
struct PageMeta {
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct PageLinks {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MetricEnvelope {
    ticket_metric: TicketMetric,
}

#[derive(Debug, thiserror::Error)]
pub enum ZendeskError {
    #[error("no ticket metrics for ticket {ticket_id}")]
    NotFound { ticket_id: u64 },
    #[error("zendesk api error: status={status}, url={url}")]
    Api { status: u16, url: String },
    #[error("zendesk url error: {0}")]
    Url(#[from] url::ParseError),
    #[error("zendesk transport error: {0}")]
    Transport(#[from] reqwest::Error),
}
