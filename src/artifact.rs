use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Writes `records` to `path` as a gzip-compressed JSON array, creating
/// parent directories as needed. Serialization happens before the file is
/// touched, so an encoding failure never leaves a truncated artifact behind.
pub fn write_artifact<T: Serialize>(records: &[T], path: &Path) -> Result<PathBuf, ArtifactError> {
    let json = serde_json::to_vec(records)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ArtifactError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let io_err = |source: io::Error| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(io_err)?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(&json).map_err(io_err)?;
    encoder.finish().map_err(io_err)?;
    Ok(path.to_path_buf())
}

/// Inverse of [`write_artifact`].
pub fn read_artifact<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, ArtifactError> {
    let io_err = |source: io::Error| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let mut decoder = GzDecoder::new(file);
    let mut json = Vec::new();
    decoder.read_to_end(&mut json).map_err(io_err)?;
    Ok(serde_json::from_slice(&json)?)
}

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact io error at {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("artifact serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
