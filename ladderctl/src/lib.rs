use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use ladder_core::{
    load_ladder_config, AuditFinding, EngineLocator, IngestRequest, LadderConfig, ReclamationReport,
    Resolution, SqliteVideoStore, Video, VideoFilter, VideoLibrary,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ladder_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store error: {0}")]
    Store(#[from] ladder_core::VideoError),
    #[error("library error: {0}")]
    Library(#[from] ladder_core::LibraryError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("upload file has no file name: {0}")]
    MissingUploadName(PathBuf),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Ladder video library control interface", long_about = None)]
pub struct Cli {
    /// Path to the main ladder.toml
    #[arg(long, default_value = "configs/ladder.toml")]
    pub config: PathBuf,
    /// Override for the video database path
    #[arg(long)]
    pub db: Option<PathBuf>,
    /// Override for the media directory
    #[arg(long)]
    pub media_dir: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Summarize the library: record counts and storage locations
    Status,
    /// Operations on individual videos
    #[command(subcommand)]
    Video(VideoCommands),
    /// Reconcile records against the media directory
    Audit,
}

#[derive(Subcommand, Debug)]
pub enum VideoCommands {
    /// List videos matching a filter
    List(ListArgs),
    /// Show one video with its rendition map
    Show { id: String },
    /// Adopt a staged upload into the library
    Ingest(IngestArgs),
    /// Encode one or more resolutions for a video
    Encode(EncodeArgs),
    /// Rename a video and relocate all of its files
    Rename { id: String, new_name: String },
    /// Delete a video, its renditions, and its record
    Delete { id: String },
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Free-text match on the source file name
    #[arg(long)]
    pub name: Option<String>,
    /// Exact owner match
    #[arg(long)]
    pub owner: Option<String>,
    /// Only videos at least this many seconds long
    #[arg(long)]
    pub min_duration: Option<f64>,
    #[arg(long, default_value_t = 1)]
    pub page: u32,
    #[arg(long, default_value_t = 20)]
    pub per_page: u32,
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Owner of the new video
    #[arg(long)]
    pub owner: String,
    /// Display name; the extension still comes from the uploaded file
    #[arg(long)]
    pub name: String,
    /// Staged upload file to adopt
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    pub id: String,
    /// Resolutions to encode, e.g. 720 480; defaults to the whole ladder
    #[arg(long = "resolution", value_parser = parse_resolution)]
    pub resolutions: Vec<Resolution>,
    /// Suppress per-job progress output
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

fn parse_resolution(value: &str) -> std::result::Result<Resolution, String> {
    value.parse::<Resolution>().map_err(|err| err.to_string())
}

pub fn run(cli: Cli) -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_command(cli))
}

async fn run_command(cli: Cli) -> Result<()> {
    let context = AppContext::new(&cli)?;
    match &cli.command {
        Commands::Status => {
            let status = context.gather_status()?;
            render(&status, cli.format)
        }
        Commands::Video(VideoCommands::List(args)) => {
            let listing = context.video_list(args)?;
            render(&listing, cli.format)
        }
        Commands::Video(VideoCommands::Show { id }) => {
            let video = context.video_show(id)?;
            render(&VideoView(video), cli.format)
        }
        Commands::Video(VideoCommands::Ingest(args)) => {
            let video = context.video_ingest(args).await?;
            render(&VideoView(video), cli.format)
        }
        Commands::Video(VideoCommands::Encode(args)) => {
            let summary = context.video_encode(args).await?;
            render(&summary, cli.format)
        }
        Commands::Video(VideoCommands::Rename { id, new_name }) => {
            let video = context.library.rename(id, new_name).await?;
            render(&VideoView(video), cli.format)
        }
        Commands::Video(VideoCommands::Delete { id }) => {
            let report = context.library.delete(id).await?;
            render(&report, cli.format)
        }
        Commands::Audit => {
            let findings = context.library.audit().await?;
            render(&AuditListing(findings), cli.format)
        }
    }
}

struct AppContext {
    library: VideoLibrary,
    config: LadderConfig,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let mut config = load_ladder_config(&cli.config)?;
        if let Some(db) = &cli.db {
            config.library.db_path = db.to_string_lossy().to_string();
        }
        if let Some(media_dir) = &cli.media_dir {
            config.library.media_dir = media_dir.to_string_lossy().to_string();
        }
        let store = SqliteVideoStore::builder()
            .path(&config.library.db_path)
            .build()?;
        store.initialize()?;
        let engine = EngineLocator::from_config(&config.engine);
        let library = VideoLibrary::new(store, engine, &config);
        Ok(Self { library, config })
    }

    fn gather_status(&self) -> Result<StatusReport> {
        let total = self.library.store().count(&VideoFilter::default())?;
        Ok(StatusReport {
            videos: total,
            media_dir: self.config.library.media_dir.clone(),
            db_path: self.config.library.db_path.clone(),
        })
    }

    fn video_list(&self, args: &ListArgs) -> Result<VideoListing> {
        let filter = VideoFilter {
            name: args.name.clone(),
            owner: args.owner.clone(),
            min_duration: args.min_duration,
            page: args.page,
            per_page: args.per_page,
        };
        let videos = self.library.store().search(&filter)?;
        let total = self.library.store().count(&filter)?;
        Ok(VideoListing {
            total,
            page: args.page,
            videos,
        })
    }

    fn video_show(&self, id: &str) -> Result<Video> {
        self.library
            .store()
            .fetch_by_id(id)?
            .ok_or_else(|| {
                AppError::Library(ladder_core::LibraryError::NotFound {
                    video_id: id.to_string(),
                })
            })
    }

    async fn video_ingest(&self, args: &IngestArgs) -> Result<Video> {
        let upload_name = args
            .file
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| AppError::MissingUploadName(args.file.clone()))?;
        let video = self
            .library
            .ingest(IngestRequest {
                owner: args.owner.clone(),
                display_name: args.name.clone(),
                upload_name,
                staged_file: args.file.clone(),
            })
            .await?;
        Ok(video)
    }

    async fn video_encode(&self, args: &EncodeArgs) -> Result<EncodeSummary> {
        let resolutions = if args.resolutions.is_empty() {
            Resolution::ALL.to_vec()
        } else {
            args.resolutions.clone()
        };

        let (progress, printer) = if args.quiet {
            (None, None)
        } else {
            let (tx, mut rx) = mpsc::unbounded_channel::<ladder_core::EncodeProgress>();
            let printer = tokio::spawn(async move {
                while let Some(tick) = rx.recv().await {
                    eprintln!("{} {}%", tick.resolution, tick.percent);
                }
            });
            (Some(tx), Some(printer))
        };

        let report = self.library.encode(&args.id, &resolutions, progress).await?;
        if let Some(printer) = printer {
            let _ = printer.await;
        }

        Ok(EncodeSummary {
            video_id: report.video_id.clone(),
            completed: report
                .completed
                .iter()
                .map(|resolution| resolution.to_string())
                .collect(),
            failed: report
                .failed
                .iter()
                .map(|(resolution, error)| FailedJob {
                    resolution: resolution.to_string(),
                    error: error.to_string(),
                })
                .collect(),
        })
    }
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug, Serialize)]
struct StatusReport {
    videos: i64,
    media_dir: String,
    db_path: String,
}

impl DisplayFallback for StatusReport {
    fn display(&self) -> String {
        format!(
            "videos: {}\nmedia dir: {}\ndatabase: {}",
            self.videos, self.media_dir, self.db_path
        )
    }
}

#[derive(Debug, Serialize)]
struct VideoListing {
    total: i64,
    page: u32,
    videos: Vec<Video>,
}

impl DisplayFallback for VideoListing {
    fn display(&self) -> String {
        let mut lines = vec![format!("{} video(s), page {}", self.total, self.page)];
        for video in &self.videos {
            lines.push(format!(
                "{}  owner={}  duration={}  renditions={}  {}",
                video.id,
                video.owner,
                video
                    .duration
                    .map(|d| format!("{d:.1}s"))
                    .unwrap_or_else(|| "?".into()),
                video.format.len(),
                video.source.display(),
            ));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
struct VideoView(Video);

impl DisplayFallback for VideoView {
    fn display(&self) -> String {
        let video = &self.0;
        let mut lines = vec![
            format!("id: {}", video.id),
            format!("owner: {}", video.owner),
            format!("source: {}", video.source.display()),
            format!(
                "duration: {}",
                video
                    .duration
                    .map(|d| format!("{d:.1}s"))
                    .unwrap_or_else(|| "unknown".into())
            ),
        ];
        for (resolution, path) in &video.format {
            lines.push(format!("{resolution}: {}", path.display()));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
struct FailedJob {
    resolution: String,
    error: String,
}

#[derive(Debug, Serialize)]
struct EncodeSummary {
    video_id: String,
    completed: Vec<String>,
    failed: Vec<FailedJob>,
}

impl DisplayFallback for EncodeSummary {
    fn display(&self) -> String {
        let mut lines = vec![format!("video: {}", self.video_id)];
        if !self.completed.is_empty() {
            lines.push(format!("completed: {}", self.completed.join(", ")));
        }
        for job in &self.failed {
            lines.push(format!("failed {}: {}", job.resolution, job.error));
        }
        lines.join("\n")
    }
}

impl DisplayFallback for ReclamationReport {
    fn display(&self) -> String {
        format!(
            "video {} reclaimed (primary={} derived={} record={})",
            self.video_id, self.primary_removed, self.derived_removed, self.record_removed
        )
    }
}

#[derive(Debug, Serialize)]
struct AuditListing(Vec<AuditFinding>);

impl DisplayFallback for AuditListing {
    fn display(&self) -> String {
        if self.0.is_empty() {
            return "library is consistent".to_string();
        }
        self.0
            .iter()
            .map(|finding| match finding {
                AuditFinding::MissingPrimary { video_id, path } => {
                    format!("missing primary for {video_id}: {}", path.display())
                }
                AuditFinding::MissingRendition {
                    video_id,
                    resolution,
                    path,
                } => format!(
                    "missing {resolution} rendition for {video_id}: {}",
                    path.display()
                ),
                AuditFinding::OrphanDirectory { path } => {
                    format!("orphan directory: {}", path.display())
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
