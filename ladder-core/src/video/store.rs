use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::backup::Backup;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};

use crate::sqlite::configure_connection;

use super::error::{VideoError, VideoResult};
use super::models::{parse_db_timestamp, Resolution, Video, VideoFilter};

const VIDEO_SCHEMA: &str = include_str!("../../../sql/videos.sql");

#[derive(Debug, Clone)]
pub struct SqliteVideoStoreBuilder {
    path: Option<PathBuf>,
    read_only: bool,
    create_if_missing: bool,
}

impl Default for SqliteVideoStoreBuilder {
    fn default() -> Self {
        Self {
            path: None,
            read_only: false,
            create_if_missing: true,
        }
    }
}

impl SqliteVideoStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn build(self) -> VideoResult<SqliteVideoStore> {
        let path = self.path.ok_or(VideoError::MissingStore)?;
        let mut flags = if self.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };
        if !self.read_only && self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        Ok(SqliteVideoStore { path, flags })
    }
}

#[derive(Debug, Clone)]
pub struct SqliteVideoStore {
    path: PathBuf,
    flags: OpenFlags,
}

impl SqliteVideoStore {
    pub fn builder() -> SqliteVideoStoreBuilder {
        SqliteVideoStoreBuilder::new()
    }

    pub fn new(path: impl AsRef<Path>) -> VideoResult<Self> {
        SqliteVideoStoreBuilder::new().path(path).build()
    }

    fn open(&self) -> VideoResult<Connection> {
        let conn = Connection::open_with_flags(&self.path, self.flags).map_err(|source| {
            VideoError::OpenDatabase {
                path: self.path.clone(),
                source,
            }
        })?;
        configure_connection(&conn).map_err(|source| VideoError::OpenDatabase {
            path: self.path.clone(),
            source,
        })?;
        Ok(conn)
    }

    pub fn initialize(&self) -> VideoResult<()> {
        let conn = self.open()?;
        conn.execute_batch(VIDEO_SCHEMA)?;
        Ok(())
    }

    pub fn insert(&self, video: &Video) -> VideoResult<()> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO videos (video_id, owner, source, duration_s) VALUES (?1, ?2, ?3, ?4)",
            params![
                &video.id,
                &video.owner,
                video.source.to_string_lossy(),
                video.duration,
            ],
        )?;
        for (resolution, path) in &video.format {
            tx.execute(
                "INSERT INTO renditions (video_id, resolution, path) VALUES (?1, ?2, ?3)",
                params![&video.id, resolution.label(), path.to_string_lossy()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn fetch_by_id(&self, video_id: &str) -> VideoResult<Option<Video>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare("SELECT * FROM videos WHERE video_id = ?1")?;
        let video = stmt
            .query_row([video_id], |row| video_from_row(row))
            .optional()?;
        match video {
            Some(mut video) => {
                video.format = self.load_renditions(&conn, video_id)?;
                Ok(Some(video))
            }
            None => Ok(None),
        }
    }

    /// Removes the record and its rendition rows. Returns whether a record
    /// existed; a missing record is not an error here, deletion is
    /// best-effort all the way down.
    pub fn delete(&self, video_id: &str) -> VideoResult<bool> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM renditions WHERE video_id = ?1", [video_id])?;
        let affected = tx.execute("DELETE FROM videos WHERE video_id = ?1", [video_id])?;
        tx.commit()?;
        Ok(affected > 0)
    }

    pub fn set_duration(&self, video_id: &str, duration: Option<f64>) -> VideoResult<()> {
        let conn = self.open()?;
        let affected = conn.execute(
            "UPDATE videos SET duration_s = ?1, updated_at = CURRENT_TIMESTAMP WHERE video_id = ?2",
            params![duration, video_id],
        )?;
        if affected == 0 {
            return Err(VideoError::NotFound {
                video_id: video_id.to_string(),
            });
        }
        Ok(())
    }

    /// Records one freshly encoded rendition. Encodes land one at a time, so
    /// the format map grows incrementally.
    pub fn upsert_rendition(
        &self,
        video_id: &str,
        resolution: Resolution,
        path: &Path,
    ) -> VideoResult<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO renditions (video_id, resolution, path) VALUES (?1, ?2, ?3)
             ON CONFLICT(video_id, resolution) DO UPDATE SET path = excluded.path",
            params![video_id, resolution.label(), path.to_string_lossy()],
        )?;
        conn.execute(
            "UPDATE videos SET updated_at = CURRENT_TIMESTAMP WHERE video_id = ?1",
            [video_id],
        )?;
        Ok(())
    }

    /// Rewrites the source path and the whole rendition map in one
    /// transaction. This is the commit step of a rename: either every path
    /// in the record flips to the new layout or none does.
    pub fn update_paths(
        &self,
        video_id: &str,
        source: &Path,
        format: &BTreeMap<Resolution, PathBuf>,
    ) -> VideoResult<()> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let affected = tx.execute(
            "UPDATE videos SET source = ?1, updated_at = CURRENT_TIMESTAMP WHERE video_id = ?2",
            params![source.to_string_lossy(), video_id],
        )?;
        if affected == 0 {
            return Err(VideoError::NotFound {
                video_id: video_id.to_string(),
            });
        }
        tx.execute("DELETE FROM renditions WHERE video_id = ?1", [video_id])?;
        for (resolution, path) in format {
            tx.execute(
                "INSERT INTO renditions (video_id, resolution, path) VALUES (?1, ?2, ?3)",
                params![video_id, resolution.label(), path.to_string_lossy()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn search(&self, filter: &VideoFilter) -> VideoResult<Vec<Video>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM videos
             WHERE (?1 IS NULL OR source LIKE '%' || ?1 || '%')
               AND (?2 IS NULL OR owner = ?2)
               AND (?3 IS NULL OR duration_s >= ?3)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?4 OFFSET ?5",
        )?;
        let mut videos = stmt
            .query_map(
                params![
                    &filter.name,
                    &filter.owner,
                    &filter.min_duration,
                    i64::from(filter.per_page),
                    filter.offset(),
                ],
                |row| video_from_row(row),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        for video in &mut videos {
            video.format = self.load_renditions(&conn, &video.id)?;
        }
        Ok(videos)
    }

    pub fn count(&self, filter: &VideoFilter) -> VideoResult<i64> {
        let conn = self.open()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM videos
             WHERE (?1 IS NULL OR source LIKE '%' || ?1 || '%')
               AND (?2 IS NULL OR owner = ?2)
               AND (?3 IS NULL OR duration_s >= ?3)",
            params![&filter.name, &filter.owner, &filter.min_duration],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn list_ids(&self) -> VideoResult<Vec<String>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare("SELECT video_id FROM videos ORDER BY rowid")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn export_backup(&self, dest: &Path) -> VideoResult<()> {
        let src = self.open()?;
        let mut dst = Connection::open(dest)?;
        let backup = Backup::new(&src, &mut dst)?;
        backup.run_to_completion(64, Duration::from_millis(25), None)?;
        Ok(())
    }

    fn load_renditions(
        &self,
        conn: &Connection,
        video_id: &str,
    ) -> VideoResult<BTreeMap<Resolution, PathBuf>> {
        let mut stmt =
            conn.prepare("SELECT resolution, path FROM renditions WHERE video_id = ?1")?;
        let mut rows = stmt.query([video_id])?;
        let mut format = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let resolution: String = row.get(0)?;
            let path: String = row.get(1)?;
            let Ok(resolution) = resolution.parse::<Resolution>() else {
                continue;
            };
            format.insert(resolution, PathBuf::from(path));
        }
        Ok(format)
    }
}

fn video_from_row(row: &Row<'_>) -> rusqlite::Result<Video> {
    Ok(Video {
        id: row.get("video_id")?,
        owner: row.get("owner")?,
        source: PathBuf::from(row.get::<_, String>("source")?),
        duration: row.get("duration_s")?,
        format: BTreeMap::new(),
        created_at: parse_db_timestamp(row.get("created_at")?),
        updated_at: parse_db_timestamp(row.get("updated_at")?),
    })
}
