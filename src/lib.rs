pub mod artifact;
pub mod backfill;
pub mod config;
pub mod error;
pub mod logging;
pub mod mailer;
pub mod pipeline;
pub mod storage;
pub mod window;
pub mod zendesk;
