use std::path::{Path, PathBuf};
use std::process::Stdio;

use futures::future::join_all;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::EncodeSection;
use crate::video::Resolution;

use super::EngineLocator;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to launch engine {program}: {source}")]
    Launch {
        program: PathBuf,
        source: std::io::Error,
    },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("engine failed encoding {source_name} at {resolution} (status {status:?}): {message}")]
    Engine {
        resolution: Resolution,
        source_name: String,
        status: Option<i32>,
        message: String,
    },
}

pub type EncodeResult<T> = std::result::Result<T, EncodeError>;

/// Advisory progress tick for one resolution's job. Delivery is best-effort
/// and never gates completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeProgress {
    pub resolution: Resolution,
    pub percent: u8,
}

pub type ProgressSender = mpsc::UnboundedSender<EncodeProgress>;

#[derive(Debug, Clone)]
pub struct EncodeRequest {
    pub source: PathBuf,
    pub output: PathBuf,
    pub resolution: Resolution,
    /// Total duration of the source, used only to turn the engine's absolute
    /// `out_time` into percents. Without it no percents are emitted.
    pub duration_hint: Option<f64>,
}

pub struct Transcoder {
    engine: EngineLocator,
    settings: EncodeSection,
}

impl Transcoder {
    pub fn new(engine: EngineLocator, settings: EncodeSection) -> Self {
        Self { engine, settings }
    }

    /// Runs one encode job to completion. The output's parent directory is
    /// created first; on engine failure any partially written output is left
    /// in place for diagnosis.
    pub async fn encode(
        &self,
        request: &EncodeRequest,
        progress: Option<ProgressSender>,
    ) -> EncodeResult<()> {
        if let Some(parent) = request.output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| EncodeError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let args = self.build_args(request);
        debug!(
            source = %request.source.display(),
            output = %request.output.display(),
            resolution = %request.resolution,
            "starting encode job"
        );

        let mut command = Command::new(&self.engine.ffmpeg);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = command.spawn().map_err(|source| EncodeError::Launch {
            program: self.engine.ffmpeg.clone(),
            source,
        })?;

        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = Vec::new();
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    lines.push(line);
                }
                lines.join("\n")
            })
        });

        if let Some(stdout) = child.stdout.take() {
            let mut reader = BufReader::new(stdout).lines();
            let mut last_percent = None;
            while let Ok(Some(line)) = reader.next_line().await {
                let Some((key, value)) = line.split_once('=') else {
                    continue;
                };
                if key != "out_time" {
                    continue;
                }
                let (Some(total), Some(sink)) = (request.duration_hint, progress.as_ref()) else {
                    continue;
                };
                if total <= 0.0 {
                    continue;
                }
                let Some(elapsed) = parse_timecode(value) else {
                    continue;
                };
                let percent = ((elapsed / total) * 100.0).round().clamp(0.0, 100.0) as u8;
                if last_percent == Some(percent) {
                    continue;
                }
                last_percent = Some(percent);
                let _ = sink.send(EncodeProgress {
                    resolution: request.resolution,
                    percent,
                });
            }
        }

        let status = child.wait().await.map_err(|source| EncodeError::Launch {
            program: self.engine.ffmpeg.clone(),
            source,
        })?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        let source_name = file_name_of(&request.source);
        if !status.success() {
            warn!(
                resolution = %request.resolution,
                source = %source_name,
                status = ?status.code(),
                "encode job failed"
            );
            return Err(EncodeError::Engine {
                resolution: request.resolution,
                source_name,
                status: status.code(),
                message: stderr.trim().to_string(),
            });
        }

        if let Some(sink) = progress.as_ref() {
            let _ = sink.send(EncodeProgress {
                resolution: request.resolution,
                percent: 100,
            });
        }
        debug!(resolution = %request.resolution, source = %source_name, "encode job finished");
        Ok(())
    }

    /// Runs the given jobs concurrently. Jobs are fully independent: each
    /// writes to its own output path and a failure in one neither cancels
    /// nor taints the others. The caller aggregates the outcomes.
    pub async fn encode_many(
        &self,
        requests: &[EncodeRequest],
        progress: Option<ProgressSender>,
    ) -> Vec<(Resolution, EncodeResult<()>)> {
        let jobs = requests.iter().map(|request| {
            let progress = progress.clone();
            async move { (request.resolution, self.encode(request, progress).await) }
        });
        join_all(jobs).await
    }

    fn build_args(&self, request: &EncodeRequest) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            request.source.to_string_lossy().to_string(),
            "-vf".to_string(),
            format!("scale=-2:{}", request.resolution.height()),
            "-c:v".to_string(),
            self.settings.video_codec.clone(),
            "-preset".to_string(),
            self.settings.preset.clone(),
            "-crf".to_string(),
            self.settings.crf.to_string(),
            "-c:a".to_string(),
            self.settings.audio_codec.clone(),
            "-b:a".to_string(),
            self.settings.audio_bitrate.clone(),
        ];
        if self.settings.faststart {
            args.push("-movflags".to_string());
            args.push("+faststart".to_string());
        }
        args.push("-progress".to_string());
        args.push("pipe:1".to_string());
        args.push("-nostats".to_string());
        args.push(request.output.to_string_lossy().to_string());
        args
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Parses the engine's `HH:MM:SS.micros` progress timecode into seconds.
fn parse_timecode(value: &str) -> Option<f64> {
    let mut parts = value.trim().splitn(3, ':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}
