use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::error::VideoError;

/// Target vertical heights of the encoding ladder. Width is always computed
/// by the engine to preserve aspect ratio.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Resolution {
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "240p")]
    P240,
    #[serde(rename = "144p")]
    P144,
}

impl Resolution {
    pub const ALL: [Resolution; 6] = [
        Resolution::P1080,
        Resolution::P720,
        Resolution::P480,
        Resolution::P360,
        Resolution::P240,
        Resolution::P144,
    ];

    pub fn height(&self) -> u32 {
        match self {
            Resolution::P1080 => 1080,
            Resolution::P720 => 720,
            Resolution::P480 => 480,
            Resolution::P360 => 360,
            Resolution::P240 => 240,
            Resolution::P144 => 144,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Resolution::P1080 => "1080p",
            Resolution::P720 => "720p",
            Resolution::P480 => "480p",
            Resolution::P360 => "360p",
            Resolution::P240 => "240p",
            Resolution::P144 => "144p",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Resolution {
    type Err = VideoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_end_matches('p') {
            "1080" => Ok(Resolution::P1080),
            "720" => Ok(Resolution::P720),
            "480" => Ok(Resolution::P480),
            "360" => Ok(Resolution::P360),
            "240" => Ok(Resolution::P240),
            "144" => Ok(Resolution::P144),
            other => Err(VideoError::InvalidResolution(other.to_string())),
        }
    }
}

/// A managed video asset: one primary file plus the per-resolution derived
/// files recorded in `format`. A resolution absent from `format` has not
/// been encoded yet; failure never leaves an entry behind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Video {
    pub id: String,
    pub owner: String,
    pub source: PathBuf,
    pub duration: Option<f64>,
    pub format: BTreeMap<Resolution, PathBuf>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Video {
    pub fn new(id: impl Into<String>, owner: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            source: source.into(),
            duration: None,
            format: BTreeMap::new(),
            created_at: None,
            updated_at: None,
        }
    }

    /// `<sourceDir>/<id>` — the root of every derived file for this video.
    pub fn derived_root(&self) -> PathBuf {
        self.source
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(&self.id)
    }
}

pub(crate) fn parse_db_timestamp(value: Option<NaiveDateTime>) -> Option<DateTime<Utc>> {
    value.map(|dt| Utc.from_utc_datetime(&dt))
}

/// Filter for `SqliteVideoStore::search`: free-text match on the source
/// name, exact owner match, lower bound on duration, page/per-page
/// pagination (pages start at 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoFilter {
    pub name: Option<String>,
    pub owner: Option<String>,
    pub min_duration: Option<f64>,
    pub page: u32,
    pub per_page: u32,
}

impl Default for VideoFilter {
    fn default() -> Self {
        Self {
            name: None,
            owner: None,
            min_duration: None,
            page: 1,
            per_page: 20,
        }
    }
}

impl VideoFilter {
    pub(crate) fn offset(&self) -> i64 {
        let page = self.page.max(1);
        i64::from(page - 1) * i64::from(self.per_page)
    }
}
