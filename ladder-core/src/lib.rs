pub mod config;
pub mod engine;
pub mod error;
pub mod library;
pub mod naming;
pub mod sqlite;
pub mod video;

pub use config::{
    load_ladder_config, EncodeSection, EngineSection, LadderConfig, LibrarySection,
};
pub use engine::probe::{MediaProber, ProbeError, ProbeReport};
pub use engine::transcode::{
    EncodeError, EncodeProgress, EncodeRequest, ProgressSender, Transcoder,
};
pub use engine::{CommandExecutor, EngineLocator, SystemCommandExecutor};
pub use error::{ConfigError, Result};
pub use library::{
    AuditFinding, EncodeReport, IngestRequest, LibraryError, ReclamationReport, RelocationError,
    VideoLibrary,
};
pub use naming::MonotonicMillis;
pub use video::{
    Resolution, SqliteVideoStore, SqliteVideoStoreBuilder, Video, VideoError, VideoFilter,
};
