use thiserror::Error;

use crate::artifact::ArtifactError;
use crate::backfill::MarkerError;
use crate::storage::StorageError;
use crate::window::TimestampError;
use crate::zendesk::ZendeskError;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Zendesk(#[from] ZendeskError),
    #[error(transparent)]
    Window(#[from] TimestampError),
    #[error(transparent)]
    Marker(#[from] MarkerError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("precondition failed: {0}")]
    Precondition(String),
}

/// Renders an error and its full `source()` chain, one cause per line.
/// This is what failure notifications and the final error log carry.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str("\ncaused by: ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
