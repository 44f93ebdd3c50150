//! Boundary to the external transcoding engine (ffmpeg-compatible binaries).

pub mod probe;
pub mod transcode;

use std::path::PathBuf;

use tokio::process::Command;

use crate::config::EngineSection;

/// Environment variable overriding the configured encoder binary.
pub const FFMPEG_ENV: &str = "LADDER_FFMPEG";
/// Environment variable overriding the configured prober binary.
pub const FFPROBE_ENV: &str = "LADDER_FFPROBE";

/// Where the engine and its companion prober live. Resolved once at startup
/// and handed to the prober and transcoder as a plain value; nothing reads
/// the environment after this point.
#[derive(Debug, Clone)]
pub struct EngineLocator {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl EngineLocator {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub fn from_config(engine: &EngineSection) -> Self {
        let ffmpeg = std::env::var(FFMPEG_ENV).unwrap_or_else(|_| engine.ffmpeg_bin.clone());
        let ffprobe = std::env::var(FFPROBE_ENV).unwrap_or_else(|_| engine.ffprobe_bin.clone());
        Self::new(ffmpeg, ffprobe)
    }
}

#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, command: &mut Command) -> std::io::Result<std::process::Output>;
}

#[derive(Debug, Default)]
pub struct SystemCommandExecutor;

#[async_trait::async_trait]
impl CommandExecutor for SystemCommandExecutor {
    async fn run(&self, command: &mut Command) -> std::io::Result<std::process::Output> {
        command.output().await
    }
}
