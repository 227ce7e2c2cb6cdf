use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use url::Url;

use crate::config::StorageConfig;

pub const PUBLIC_BASE_URL: &str = "https://storage.googleapis.com";

const DEVSTORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// How the bucket client obtains its bearer token, resolved once from
/// configuration: an explicit token wins, then a service-account key file,
/// then the GCE metadata server.
#[derive(Clone)]
pub enum GcsAuth {
    Static(String),
    ServiceAccount(PathBuf),
    MetadataServer,
}

impl GcsAuth {
    pub fn from_config(config: &StorageConfig) -> Self {
        if let Some(token) = &config.access_token {
            GcsAuth::Static(token.clone())
        } else if let Some(path) = &config.credentials_path {
            GcsAuth::ServiceAccount(path.clone())
        } else {
            GcsAuth::MetadataServer
        }
    }
}

impl fmt::Debug for GcsAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GcsAuth::Static(_) => f.write_str("Static(***REDACTED***)"),
            GcsAuth::ServiceAccount(path) => f.debug_tuple("ServiceAccount").field(path).finish(),
            GcsAuth::MetadataServer => f.write_str("MetadataServer"),
        }
    }
}

/// Derives the remote object key for a local artifact: the `schema` segment
/// followed by every path segment after the first component named `data`.
/// `/srv/extract/data/ticket_metrics/archive.json.gz` with schema `zendesk`
/// becomes `zendesk/ticket_metrics/archive.json.gz`.
pub fn remote_key_for(local_path: &Path, schema: &str) -> Result<String, StorageError> {
    let mut segments = vec![schema.to_string()];
    let mut seen_data = false;
    for component in local_path.components() {
        let part = component.as_os_str();
        if seen_data {
            let part = part.to_str().ok_or_else(|| StorageError::KeyDerivation {
                path: local_path.to_path_buf(),
            })?;
            segments.push(part.to_string());
        } else if part == "data" {
            seen_data = true;
        }
    }
    if !seen_data || segments.len() == 1 {
        return Err(StorageError::KeyDerivation {
            path: local_path.to_path_buf(),
        });
    }
    Ok(segments.join("/"))
}

pub struct GcsBucket {
    http: reqwest::Client,
    base_url: Url,
    bucket: String,
    auth: GcsAuth,
    token: OnceCell<String>,
}

impl GcsBucket {
    pub fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let base_url = Url::parse(PUBLIC_BASE_URL)?;
        Ok(Self::with_base_url(base_url, config))
    }

    /// Test seam: point uploads at a mock server instead of the public GCS
    /// endpoint.
    pub fn with_base_url(base_url: Url, config: &StorageConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url,
            bucket: config.bucket.clone(),
            auth: GcsAuth::from_config(config),
            token: OnceCell::new(),
        }
    }

    /// Uploads the file at `local_path` to `remote_key`, overwriting any
    /// existing object. One attempt, no retry.
    pub async fn upload(
        &self,
        local_path: &Path,
        remote_key: &str,
    ) -> Result<UploadConfirmation, StorageError> {
        let body = fs::read(local_path).map_err(|source| StorageError::Io {
            path: local_path.to_path_buf(),
            source,
        })?;
        let bytes = body.len() as u64;

        let mut url = self
            .base_url
            .join(&format!("upload/storage/v1/b/{}/o", self.bucket))?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", remote_key);

        let token = self.bearer_token().await?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/gzip")
            .body(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(UploadConfirmation {
            remote_key: remote_key.to_string(),
            public_url: format!("{PUBLIC_BASE_URL}/{}/{remote_key}", self.bucket),
            bytes,
        })
    }

    // Fetched lazily on the first upload, then reused for the rest of the run.
    async fn bearer_token(&self) -> Result<&str, StorageError> {
        let token = self.token.get_or_try_init(|| self.fetch_token()).await?;
        Ok(token.as_str())
    }

    async fn fetch_token(&self) -> Result<String, StorageError> {
        match &self.auth {
            GcsAuth::Static(token) => Ok(token.clone()),
            GcsAuth::ServiceAccount(path) => self.exchange_service_account(path).await,
            GcsAuth::MetadataServer => self.metadata_token().await,
        }
    }

    async fn exchange_service_account(&self, path: &Path) -> Result<String, StorageError> {
        let raw = fs::read(path).map_err(|source| StorageError::Credentials {
            path: path.to_path_buf(),
            source,
        })?;
        let key: ServiceAccountKey =
            serde_json::from_slice(&raw).map_err(StorageError::CredentialsFormat)?;

        let claims = assertion_claims(&key.client_email, &key.token_uri, Utc::now());
        let assertion = encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &EncodingKey::from_rsa_pem(key.private_key.as_bytes())?,
        )?;

        let response = self
            .http
            .post(&key.token_uri)
            .form(&[
                ("grant_type", JWT_BEARER_GRANT),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::TokenExchange {
                status: status.as_u16(),
            });
        }
        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    async fn metadata_token(&self) -> Result<String, StorageError> {
        let response = self
            .http
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::TokenExchange {
                status: status.as_u16(),
            });
        }
        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }
}

#[derive(Debug, Clone)]
pub struct UploadConfirmation {
    pub remote_key: String,
    pub public_url: String,
    pub bytes: u64,
}

#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
}

#[derive(Debug, Serialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

fn assertion_claims(client_email: &str, token_uri: &str, now: DateTime<Utc>) -> AssertionClaims {
    AssertionClaims {
        iss: client_email.to_string(),
        scope: DEVSTORAGE_SCOPE.to_string(),
        aud: token_uri.to_string(),
        iat: now.timestamp(),
        exp: (now + chrono::Duration::hours(1)).timestamp(),
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("cannot derive remote key from {}", path.display())]
    KeyDerivation { path: PathBuf },
    #[error("storage io error at {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot read credentials at {}", path.display())]
    Credentials {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed service account key: {0}")]
    CredentialsFormat(#[source] serde_json::Error),
    #[error("token signing error: {0}")]
    TokenSign(#[from] jsonwebtoken::errors::Error),
    #[error("token exchange failed: status={status}")]
    TokenExchange { status: u16 },
    #[error("gcs api error: status={status}, body={body}")]
    Api { status: u16, body: String },
    #[error("gcs url error: {0}")]
    Url(#[from] url::ParseError),
    #[error("gcs transport error: {0}")]
    Transport(#[from] reqwest::Error),
}
