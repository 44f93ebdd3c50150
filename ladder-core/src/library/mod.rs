//! The asset lifecycle facade: ingest, encode, rename, delete, audit.

mod error;

use std::collections::{BTreeMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::LadderConfig;
use crate::engine::probe::MediaProber;
use crate::engine::transcode::{EncodeError, EncodeRequest, ProgressSender, Transcoder};
use crate::engine::EngineLocator;
use crate::naming::{self, MonotonicMillis};
use crate::video::{Resolution, SqliteVideoStore, Video};

pub use error::{LibraryError, LibraryResult, RelocationError};

/// An upload the HTTP layer has already staged on disk, ready to be adopted
/// into the library.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub owner: String,
    /// The name the uploader asked for; becomes the visible base name.
    pub display_name: String,
    /// The uploaded file's own name; its extension wins over the display
    /// name's so the true container format is preserved.
    pub upload_name: String,
    pub staged_file: PathBuf,
}

/// Per-resolution outcome of one encode fan-out. Jobs succeed or fail
/// independently; a failed resolution simply stays absent from the format
/// map.
#[derive(Debug)]
pub struct EncodeReport {
    pub video_id: String,
    pub completed: Vec<Resolution>,
    pub failed: Vec<(Resolution, EncodeError)>,
}

impl EncodeReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// What each reclamation step managed to remove. The operation as a whole
/// always completes; a flag left false means the step warned and moved on.
#[derive(Debug, Clone, Serialize)]
pub struct ReclamationReport {
    pub video_id: String,
    pub primary_removed: bool,
    pub derived_removed: bool,
    pub record_removed: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditFinding {
    MissingPrimary {
        video_id: String,
        path: PathBuf,
    },
    MissingRendition {
        video_id: String,
        resolution: Resolution,
        path: PathBuf,
    },
    OrphanDirectory {
        path: PathBuf,
    },
}

pub struct VideoLibrary {
    store: SqliteVideoStore,
    prober: MediaProber,
    transcoder: Transcoder,
    media_dir: PathBuf,
    clock: MonotonicMillis,
}

impl VideoLibrary {
    pub fn new(store: SqliteVideoStore, engine: EngineLocator, config: &LadderConfig) -> Self {
        let prober = MediaProber::new(engine.clone());
        let transcoder = Transcoder::new(engine, config.encode.clone());
        Self {
            store,
            prober,
            transcoder,
            media_dir: PathBuf::from(&config.library.media_dir),
            clock: MonotonicMillis::new(),
        }
    }

    pub fn store(&self) -> &SqliteVideoStore {
        &self.store
    }

    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    /// Adopts a staged upload: moves it to its primary path, probes it for
    /// duration (non-fatal on failure), inserts the record.
    pub async fn ingest(&self, request: IngestRequest) -> LibraryResult<Video> {
        fs::create_dir_all(&self.media_dir)
            .await
            .map_err(|source| LibraryError::Io {
                path: self.media_dir.clone(),
                source,
            })?;
        let primary = naming::primary_path(
            &self.media_dir,
            &request.display_name,
            &request.upload_name,
            self.clock.now(),
        );
        self.stage_into(&request.staged_file, &primary).await?;

        let mut video = Video::new(
            Uuid::new_v4().simple().to_string(),
            request.owner,
            primary,
        );
        match self.prober.probe(&video.source).await {
            Ok(report) => video.duration = report.duration,
            Err(error) => {
                warn!(
                    source = %video.source.display(),
                    error = %error,
                    "probe failed, duration left unset"
                );
            }
        }
        self.store.insert(&video)?;
        info!(video_id = %video.id, source = %video.source.display(), "video ingested");
        Ok(video)
    }

    /// Fans out one encode job per requested resolution, all concurrent, and
    /// records a format entry for each success. Failures are reported per
    /// resolution and never affect their siblings.
    pub async fn encode(
        &self,
        video_id: &str,
        resolutions: &[Resolution],
        progress: Option<ProgressSender>,
    ) -> LibraryResult<EncodeReport> {
        let video = self.fetch_required(video_id)?;
        let original = naming::original_name(&video.source);
        let requests: Vec<EncodeRequest> = resolutions
            .iter()
            .map(|&resolution| {
                let dir = naming::derived_dir(&video.source, &video.id, resolution);
                EncodeRequest {
                    source: video.source.clone(),
                    output: naming::derived_path(&dir, &original, self.clock.now()),
                    resolution,
                    duration_hint: video.duration,
                }
            })
            .collect();

        let outcomes = self.transcoder.encode_many(&requests, progress).await;

        let mut report = EncodeReport {
            video_id: video.id.clone(),
            completed: Vec::new(),
            failed: Vec::new(),
        };
        for (request, (resolution, outcome)) in requests.iter().zip(outcomes) {
            match outcome {
                Ok(()) => {
                    self.store
                        .upsert_rendition(&video.id, resolution, &request.output)?;
                    report.completed.push(resolution);
                }
                Err(error) => report.failed.push((resolution, error)),
            }
        }
        info!(
            video_id = %video.id,
            completed = report.completed.len(),
            failed = report.failed.len(),
            "encode fan-out finished"
        );
        Ok(report)
    }

    /// Renames the asset: primary first, then every derived file, then one
    /// transactional record update. A failure after the primary move leaves
    /// the completed moves in place and the record untouched; there is no
    /// rollback.
    pub async fn rename(&self, video_id: &str, new_name: &str) -> LibraryResult<Video> {
        let mut video = self.fetch_required(video_id)?;
        let new_primary = naming::renamed_path(&video.source, new_name, self.clock.now());
        self.move_file(&video.source, &new_primary).await?;

        let mut new_format = BTreeMap::new();
        for (resolution, old_path) in &video.format {
            // New derived path comes from the current derived path, not from
            // the new primary: it must stay inside its resolution directory.
            let new_path = naming::renamed_path(old_path, new_name, self.clock.now());
            if let Err(error) = self.move_file(old_path, &new_path).await {
                warn!(
                    video_id = %video.id,
                    resolution = %resolution,
                    from = %old_path.display(),
                    to = %new_path.display(),
                    "rename stopped mid-sequence, asset partially moved"
                );
                return Err(error.into());
            }
            new_format.insert(*resolution, new_path);
        }

        self.store
            .update_paths(&video.id, &new_primary, &new_format)?;
        info!(
            video_id = %video.id,
            source = %new_primary.display(),
            moved = new_format.len() + 1,
            "asset renamed"
        );
        video.source = new_primary;
        video.format = new_format;
        Ok(video)
    }

    /// Best-effort reclamation: primary file, derived tree, record, each
    /// attempted regardless of what the previous step did. Step failures are
    /// warnings; a file that is already gone never blocks the record's
    /// removal.
    pub async fn delete(&self, video_id: &str) -> LibraryResult<ReclamationReport> {
        let video = self.fetch_required(video_id)?;
        let mut report = ReclamationReport {
            video_id: video.id.clone(),
            primary_removed: false,
            derived_removed: false,
            record_removed: false,
        };

        match fs::remove_file(&video.source).await {
            Ok(()) => report.primary_removed = true,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!(path = %video.source.display(), "primary file already absent");
            }
            Err(error) => {
                warn!(path = %video.source.display(), error = %error, "failed to remove primary file");
            }
        }

        let derived_root = video.derived_root();
        match fs::remove_dir_all(&derived_root).await {
            Ok(()) => report.derived_removed = true,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!(path = %derived_root.display(), "derived directory already absent");
            }
            Err(error) => {
                warn!(path = %derived_root.display(), error = %error, "failed to remove derived directory");
            }
        }

        match self.store.delete(&video.id) {
            Ok(existed) => report.record_removed = existed,
            Err(error) => {
                warn!(video_id = %video.id, error = %error, "failed to remove video record");
            }
        }

        info!(
            video_id = %video.id,
            primary = report.primary_removed,
            derived = report.derived_removed,
            record = report.record_removed,
            "video reclaimed"
        );
        Ok(report)
    }

    /// Re-runs the prober against the current source and persists the
    /// refreshed duration. Unlike ingest, an explicit reprobe surfaces the
    /// probe failure.
    pub async fn reprobe(&self, video_id: &str) -> LibraryResult<Video> {
        let mut video = self.fetch_required(video_id)?;
        let report = self.prober.probe(&video.source).await?;
        self.store.set_duration(&video.id, report.duration)?;
        video.duration = report.duration;
        Ok(video)
    }

    /// Reconciles records against the disk tree without mutating either:
    /// records pointing at missing files, and derived directories whose id
    /// matches no record.
    pub async fn audit(&self) -> LibraryResult<Vec<AuditFinding>> {
        let mut findings = Vec::new();
        let ids = self.store.list_ids()?;
        for id in &ids {
            let Some(video) = self.store.fetch_by_id(id)? else {
                continue;
            };
            if !fs::try_exists(&video.source).await.unwrap_or(false) {
                findings.push(AuditFinding::MissingPrimary {
                    video_id: video.id.clone(),
                    path: video.source.clone(),
                });
            }
            for (resolution, path) in &video.format {
                if !fs::try_exists(path).await.unwrap_or(false) {
                    findings.push(AuditFinding::MissingRendition {
                        video_id: video.id.clone(),
                        resolution: *resolution,
                        path: path.clone(),
                    });
                }
            }
        }

        let known: HashSet<&str> = ids.iter().map(String::as_str).collect();
        for entry in WalkDir::new(&self.media_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
        {
            if !entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !known.contains(name.as_ref()) {
                findings.push(AuditFinding::OrphanDirectory {
                    path: entry.path().to_path_buf(),
                });
            }
        }
        Ok(findings)
    }

    fn fetch_required(&self, video_id: &str) -> LibraryResult<Video> {
        self.store
            .fetch_by_id(video_id)?
            .ok_or_else(|| LibraryError::NotFound {
                video_id: video_id.to_string(),
            })
    }

    async fn move_file(&self, from: &Path, to: &Path) -> Result<(), RelocationError> {
        fs::rename(from, to)
            .await
            .map_err(|source| RelocationError {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
                source,
            })
    }

    /// Moves a staged upload into the library, falling back to copy+remove
    /// when the staging area sits on a different filesystem.
    async fn stage_into(&self, from: &Path, to: &Path) -> LibraryResult<()> {
        if fs::rename(from, to).await.is_ok() {
            return Ok(());
        }
        fs::copy(from, to)
            .await
            .map_err(|source| LibraryError::Io {
                path: to.to_path_buf(),
                source,
            })?;
        if let Err(error) = fs::remove_file(from).await {
            warn!(path = %from.display(), error = %error, "failed to remove staged upload after copy");
        }
        Ok(())
    }
}
