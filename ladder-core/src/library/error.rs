use std::path::PathBuf;

use thiserror::Error;

use crate::engine::probe::ProbeError;
use crate::video::VideoError;

/// A file move failed mid-rename. Moves already completed stay where they
/// landed; the record is not updated, so it still describes the pre-rename
/// layout.
#[derive(Debug, Error)]
#[error("failed to move {from} to {to}: {source}")]
pub struct RelocationError {
    pub from: PathBuf,
    pub to: PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("video {video_id} not found")]
    NotFound { video_id: String },
    #[error("store error: {0}")]
    Store(#[from] VideoError),
    #[error("probe error: {0}")]
    Probe(#[from] ProbeError),
    #[error("rename failed: {0}")]
    Relocation(#[from] RelocationError),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type LibraryResult<T> = std::result::Result<T, LibraryError>;
