use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LadderConfig {
    pub library: LibrarySection,
    pub engine: EngineSection,
    pub encode: EncodeSection,
}

impl LadderConfig {
    pub fn resolve_path<P: AsRef<Path>>(&self, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.library.media_dir).join(path)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibrarySection {
    pub media_dir: String,
    pub db_path: String,
    pub logs_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncodeSection {
    pub video_codec: String,
    pub preset: String,
    pub crf: u8,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub faststart: bool,
}

pub fn load_ladder_config<P: AsRef<Path>>(path: P) -> Result<LadderConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
