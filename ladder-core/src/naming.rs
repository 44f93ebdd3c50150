//! Deterministic path construction for primary and derived assets.
//!
//! Everything here is a pure string transform: callers hand in a timestamp
//! from [`MonotonicMillis`] and get a path back, nothing touches the
//! filesystem.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

use crate::video::Resolution;

/// Millisecond timestamps that never repeat within a process. Returns the
/// wall clock when it has advanced, otherwise last + 1.
#[derive(Debug, Default)]
pub struct MonotonicMillis {
    last: AtomicI64,
}

impl MonotonicMillis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> i64 {
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let wall = Utc::now().timestamp_millis();
            let next = wall.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::SeqCst, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

/// `<folder>/<ts>_<declared_name>.<ext>` where the extension comes from the
/// uploaded file's own name, never from the declared display name.
///
/// An upload name without a `.` yields an empty extension and a path ending
/// in `.`; callers rely on that shape, so it is kept as-is.
pub fn primary_path(folder: &Path, declared_name: &str, upload_name: &str, ts: i64) -> PathBuf {
    let ext = upload_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .unwrap_or("");
    folder.join(format!("{ts}_{declared_name}.{ext}"))
}

/// `<sourceDir>/<id>/<resolution>p` — the home of one resolution's derived
/// files, always inside the video's own id directory.
pub fn derived_dir(source: &Path, id: &str, resolution: Resolution) -> PathBuf {
    let dir = source.parent().unwrap_or_else(|| Path::new(""));
    dir.join(id).join(resolution.label())
}

/// `<folder>/<ts>_<original_filename>`.
pub fn derived_path(folder: &Path, original_filename: &str, ts: i64) -> PathBuf {
    folder.join(format!("{ts}_{original_filename}"))
}

/// Keeps `old_path`'s directory and extension, substitutes a fresh timestamp
/// and the last `/`-separated segment of `new_base_name`.
pub fn renamed_path(old_path: &Path, new_base_name: &str, ts: i64) -> PathBuf {
    let dir = old_path.parent().unwrap_or_else(|| Path::new(""));
    let old_name = old_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = old_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .unwrap_or("");
    let base = new_base_name.rsplit('/').next().unwrap_or(new_base_name);
    dir.join(format!("{ts}_{base}.{ext}"))
}

/// The file name of a managed asset minus its leading `<digits>_` timestamp
/// prefix, i.e. the name the file was uploaded or renamed under.
pub fn original_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.split_once('_') {
        Some((prefix, rest))
            if !prefix.is_empty()
                && !rest.is_empty()
                && prefix.chars().all(|c| c.is_ascii_digit()) =>
        {
            rest.to_string()
        }
        _ => name,
    }
}
