use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("video {video_id} not found")]
    NotFound { video_id: String },
    #[error("unknown resolution: {0}")]
    InvalidResolution(String),
    #[error("video store path not configured")]
    MissingStore,
    #[error("failed to open database at {path}: {source}")]
    OpenDatabase {
        path: PathBuf,
        source: rusqlite::Error,
    },
}

pub type VideoResult<T> = std::result::Result<T, VideoError>;
