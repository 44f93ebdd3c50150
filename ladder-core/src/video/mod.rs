mod error;
mod models;
mod store;

pub use error::{VideoError, VideoResult};
pub use models::{Resolution, Video, VideoFilter};
pub use store::{SqliteVideoStore, SqliteVideoStoreBuilder};
