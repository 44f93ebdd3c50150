use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use super::{CommandExecutor, EngineLocator, SystemCommandExecutor};

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to launch prober {program}: {source}")]
    Launch {
        program: PathBuf,
        source: std::io::Error,
    },
    #[error("prober failed for {path} (status {status:?}): {stderr}")]
    Engine {
        path: PathBuf,
        status: Option<i32>,
        stderr: String,
    },
    #[error("prober output for {path} is not valid metadata: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

pub type ProbeResult<T> = std::result::Result<T, ProbeError>;

/// What the prober learned about a file: the duration in seconds when the
/// container reports one, plus the engine's full metadata document.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub duration: Option<f64>,
    pub raw: serde_json::Value,
}

pub struct MediaProber {
    engine: EngineLocator,
    executor: Arc<dyn CommandExecutor>,
}

impl MediaProber {
    pub fn new(engine: EngineLocator) -> Self {
        Self {
            engine,
            executor: Arc::new(SystemCommandExecutor),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub async fn probe(&self, path: &Path) -> ProbeResult<ProbeReport> {
        debug!(path = %path.display(), "probing media file");
        let mut command = Command::new(&self.engine.ffprobe);
        command
            .arg("-v")
            .arg("error")
            .arg("-print_format")
            .arg("json")
            .arg("-show_format")
            .arg("-show_streams")
            .arg(path);
        let output =
            self.executor
                .run(&mut command)
                .await
                .map_err(|source| ProbeError::Launch {
                    program: self.engine.ffprobe.clone(),
                    source,
                })?;
        if !output.status.success() {
            return Err(ProbeError::Engine {
                path: path.to_path_buf(),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let raw: serde_json::Value =
            serde_json::from_slice(&output.stdout).map_err(|source| ProbeError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let duration = raw
            .pointer("/format/duration")
            .and_then(|value| value.as_str())
            .and_then(|value| value.parse::<f64>().ok());
        Ok(ProbeReport { duration, raw })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::{ExitStatus, Output};

    struct CannedExecutor {
        stdout: &'static str,
        code: i32,
    }

    #[async_trait::async_trait]
    impl CommandExecutor for CannedExecutor {
        async fn run(&self, _command: &mut Command) -> std::io::Result<Output> {
            use std::os::unix::process::ExitStatusExt;
            Ok(Output {
                status: ExitStatus::from_raw(self.code << 8),
                stdout: self.stdout.as_bytes().to_vec(),
                stderr: b"moov atom not found".to_vec(),
            })
        }
    }

    #[tokio::test]
    async fn probe_extracts_duration_from_format_section() {
        let prober = MediaProber::new(EngineLocator::new("ffmpeg", "ffprobe")).with_executor(
            Arc::new(CannedExecutor {
                stdout: r#"{"format":{"duration":"12.500000","format_name":"mov,mp4"},"streams":[]}"#,
                code: 0,
            }),
        );
        let report = prober.probe(Path::new("/tmp/clip.mp4")).await.unwrap();
        assert_eq!(report.duration, Some(12.5));
        assert_eq!(
            report.raw.pointer("/format/format_name").and_then(|v| v.as_str()),
            Some("mov,mp4")
        );
    }

    #[tokio::test]
    async fn probe_without_duration_field_reports_none() {
        let prober = MediaProber::new(EngineLocator::new("ffmpeg", "ffprobe")).with_executor(
            Arc::new(CannedExecutor {
                stdout: r#"{"format":{"format_name":"mov,mp4"},"streams":[]}"#,
                code: 0,
            }),
        );
        let report = prober.probe(Path::new("/tmp/clip.mp4")).await.unwrap();
        assert_eq!(report.duration, None);
    }

    #[tokio::test]
    async fn probe_surfaces_engine_failure_with_stderr() {
        let prober = MediaProber::new(EngineLocator::new("ffmpeg", "ffprobe")).with_executor(
            Arc::new(CannedExecutor {
                stdout: "",
                code: 1,
            }),
        );
        let err = prober.probe(Path::new("/tmp/clip.mp4")).await.unwrap_err();
        match err {
            ProbeError::Engine { status, stderr, .. } => {
                assert_eq!(status, Some(1));
                assert!(stderr.contains("moov atom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
