use std::time::Duration;

use serde::Serialize;

use crate::config::MailConfig;

const MAIL_TIMEOUT_SECS: u64 = 10;

/// Failure notifier backed by an internal HTTP mail gateway. Without a
/// gateway URL or recipients, sending reports `MailError::Disabled` and the
/// caller decides how loud to be about it.
#[derive(Debug, Clone)]
pub struct Mailer {
    config: MailConfig,
    http: reqwest::Client,
}

impl Mailer {
    pub fn new(config: &MailConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(MAIL_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config: config.clone(),
            http,
        }
    }

    pub async fn send(&self, subject: &str, body: &str) -> Result<(), MailError> {
        let Some(gateway_url) = &self.config.gateway_url else {
            return Err(MailError::Disabled);
        };
        if self.config.to.is_empty() {
            return Err(MailError::Disabled);
        }

        let message = OutboundMessage {
            from: &self.config.from,
            to: &self.config.to,
            subject,
            body,
        };
        let response = self
            .http
            .post(gateway_url)
            .json(&message)
            .send()
            .await
            .map_err(|e| MailError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(MailError::Gateway {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct OutboundMessage<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    body: &'a str,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail notifications are disabled")]
    Disabled,
    #[error("mail network error: {0}")]
    Network(String),
    #[error("mail gateway error: status={status}")]
    Gateway { status: u16 },
}
