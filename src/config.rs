use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required env var: {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    InvalidVar { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub zendesk: ZendeskConfig,
    pub storage: StorageConfig,
    pub mail: MailConfig,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub data_root: PathBuf,
}

#[derive(Clone)]
pub struct ZendeskConfig {
    pub email: String,
    pub token: String,
    pub subdomain: String,
    pub timeout_secs: u64,
}

#[derive(Clone)]
pub struct StorageConfig {
    pub bucket: String,
    pub access_token: Option<String>,
    pub credentials_path: Option<PathBuf>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub gateway_url: Option<String>,
    pub from: String,
    pub to: Vec<String>,
}

impl fmt::Debug for ZendeskConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZendeskConfig")
            .field("email", &self.email)
            .field("token", &"***REDACTED***")
            .field("subdomain", &self.subdomain)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("bucket", &self.bucket)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "***REDACTED***"),
            )
            .field("credentials_path", &self.credentials_path)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let timeout_secs = env_or_parse("HTTP_TIMEOUT_SECS", 30_u64)?;
        Ok(Self {
            zendesk: ZendeskConfig {
                email: env_required("ZENDESK_EMAIL")?,
                token: env_required("ZENDESK_TOKEN")?,
                subdomain: validated_subdomain(env_required("ZENDESK_SUBDOMAIN")?)?,
                timeout_secs,
            },
            storage: StorageConfig {
                bucket: env_required("GCS_BUCKET_NAME")?,
                access_token: env_opt("GCS_ACCESS_TOKEN"),
                credentials_path: env_opt("GOOGLE_APPLICATION_CREDENTIALS").map(PathBuf::from),
                timeout_secs,
            },
            mail: MailConfig {
                gateway_url: env_opt("MAIL_GATEWAY_URL"),
                from: env_or("MAIL_FROM", "zendesk-extract@localhost"),
                to: split_recipients(&env_or("MAIL_TO", "")),
            },
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            data_root: PathBuf::from(env_or("DATA_ROOT", ".")),
        })
    }
}

fn validated_subdomain(raw: String) -> Result<String, ConfigError> {
    let ok = !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if ok {
        Ok(raw)
    } else {
        Err(ConfigError::InvalidVar {
            key: "ZENDESK_SUBDOMAIN",
            value: raw,
        })
    }
}

fn split_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn env_required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingVar(key))
}

pub fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
{
    match env::var(key) {
        Ok(raw) => raw.parse::<T>().map_err(|_| ConfigError::InvalidVar {
            key,
            value: raw.clone(),
        }),
        Err(_) => Ok(default),
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, OnceLock};

    use super::*;

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    fn managed_keys() -> &'static [&'static str] {
        &[
            "ZENDESK_EMAIL",
            "ZENDESK_TOKEN",
            "ZENDESK_SUBDOMAIN",
            "GCS_BUCKET_NAME",
            "GCS_ACCESS_TOKEN",
            "GOOGLE_APPLICATION_CREDENTIALS",
            "MAIL_GATEWAY_URL",
            "MAIL_FROM",
            "MAIL_TO",
            "HTTP_TIMEOUT_SECS",
            "DATA_ROOT",
        ]
    }

    fn clear_keys(keys: &[&str]) {
        for key in keys {
            env::remove_var(key);
        }
    }

    fn set_required() {
        env::set_var("ZENDESK_EMAIL", "ops@example.com");
        env::set_var("ZENDESK_TOKEN", "tok-123");
        env::set_var("ZENDESK_SUBDOMAIN", "acme");
        env::set_var("GCS_BUCKET_NAME", "acme-extracts");
    }

    #[test]
    fn loads_required_and_defaults() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());
        set_required();

        let cfg = Config::from_env().expect("config");
        assert_eq!(cfg.zendesk.email, "ops@example.com");
        assert_eq!(cfg.zendesk.subdomain, "acme");
        assert_eq!(cfg.zendesk.timeout_secs, 30);
        assert_eq!(cfg.storage.bucket, "acme-extracts");
        assert!(cfg.storage.access_token.is_none());
        assert!(cfg.mail.gateway_url.is_none());
        assert!(cfg.mail.to.is_empty());
        assert_eq!(cfg.data_root, PathBuf::from("."));
    }

    #[test]
    fn missing_required_fails_fast() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        let err = Config::from_env().expect_err("should fail");
        assert_eq!(err, ConfigError::MissingVar("ZENDESK_EMAIL"));
    }

    #[test]
    fn empty_required_counts_as_missing() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());
        set_required();
        env::set_var("ZENDESK_TOKEN", "   ");

        let err = Config::from_env().expect_err("should fail");
        assert_eq!(err, ConfigError::MissingVar("ZENDESK_TOKEN"));
    }

    #[test]
    fn rejects_malformed_subdomain() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());
        set_required();
        env::set_var("ZENDESK_SUBDOMAIN", "Acme Corp");

        let err = Config::from_env().expect_err("should fail");
        assert!(matches!(
            err,
            ConfigError::InvalidVar {
                key: "ZENDESK_SUBDOMAIN",
                ..
            }
        ));
    }

    #[test]
    fn rejects_unparsable_timeout() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());
        set_required();
        env::set_var("HTTP_TIMEOUT_SECS", "soon");

        let err = Config::from_env().expect_err("should fail");
        assert!(matches!(
            err,
            ConfigError::InvalidVar {
                key: "HTTP_TIMEOUT_SECS",
                ..
            }
        ));
    }

    #[test]
    fn splits_mail_recipients() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());
        set_required();
        env::set_var("MAIL_TO", "a@example.com, b@example.com,,");

        let cfg = Config::from_env().expect("config");
        assert_eq!(cfg.mail.to, vec!["a@example.com", "b@example.com"]);
    }

    #[test]
    fn debug_redacts_secrets() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());
        set_required();
        env::set_var("GCS_ACCESS_TOKEN", "ya29.secret");

        let cfg = Config::from_env().expect("config");
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("tok-123"));
        assert!(!rendered.contains("ya29.secret"));
        assert!(rendered.contains("***REDACTED***"));
    }
}
