use crate::error::AppError;
use crate::metadata::{ImageInfo, ImageRecord};
use crate::repository::MetadataRepository;
use crate::tags::{join_tags, normalize_tag_string};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// SQLite-backed [`MetadataRepository`].
///
/// One connection behind a mutex; statements run on the blocking pool. Holding the
/// lock for the whole statement serialises writers, so upserts on one key never interleave.
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    pub fn open(db_path: &Path) -> Result<Self, AppError> {
        log::debug!("Opening image database at: {:?}", db_path);
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, AppError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| AppError::Generic("image database lock poisoned".to_string()))?;
            f(&conn)
        })
        .await?
    }
}

fn format_timestamp(ts: &DateTime<Utc>, precision: SecondsFormat) -> String {
    ts.to_rfc3339_opts(precision, true)
}

fn parse_timestamp(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[async_trait]
impl MetadataRepository for SqliteRepository {
    async fn ensure_schema(&self) -> Result<(), AppError> {
        self.with_conn(|conn| {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS images (
                    id              INTEGER PRIMARY KEY AUTOINCREMENT,
                    file_path       TEXT NOT NULL UNIQUE,
                    title           TEXT NOT NULL DEFAULT '',
                    description     TEXT NOT NULL DEFAULT '',
                    tags            TEXT NOT NULL DEFAULT '',
                    last_filesize   INTEGER NOT NULL,
                    last_modified   TEXT NOT NULL,
                    created_at      TEXT NOT NULL,
                    updated_at      TEXT NOT NULL
                )",
                [],
            )?;
            log::debug!("Image database schema ready.");
            Ok(())
        })
        .await
    }

    async fn lookup(&self, file_path: &str) -> Result<Option<ImageInfo>, AppError> {
        let file_path = file_path.to_string();
        self.with_conn(move |conn| {
            let info = conn
                .query_row(
                    "SELECT title, description, tags FROM images WHERE file_path = ?1",
                    [&file_path],
                    |row| {
                        let tags: String = row.get(2)?;
                        Ok(ImageInfo {
                            title: row.get(0)?,
                            description: row.get(1)?,
                            tags: tags
                                .split(',')
                                .filter(|tag| !tag.is_empty())
                                .map(str::to_string)
                                .collect(),
                        })
                    },
                )
                .optional()?;
            log::trace!("Lookup of '{}' found record: {}", file_path, info.is_some());
            Ok(info)
        })
        .await
    }

    async fn get(&self, file_path: &str) -> Result<Option<ImageRecord>, AppError> {
        let file_path = file_path.to_string();
        self.with_conn(move |conn| {
            let record = conn
                .query_row(
                    "SELECT file_path, title, description, tags, last_filesize, last_modified,
                            created_at, updated_at
                     FROM images WHERE file_path = ?1",
                    [&file_path],
                    |row| {
                        let tags: String = row.get(3)?;
                        let last_filesize: i64 = row.get(4)?;
                        Ok(ImageRecord {
                            file_path: row.get(0)?,
                            title: row.get(1)?,
                            description: row.get(2)?,
                            tags: normalize_tag_string(&tags),
                            last_filesize: last_filesize.max(0) as u64,
                            last_modified: parse_timestamp(5, row.get(5)?)?,
                            created_at: Some(parse_timestamp(6, row.get(6)?)?),
                            updated_at: Some(parse_timestamp(7, row.get(7)?)?),
                        })
                    },
                )
                .optional()?;
            Ok(record)
        })
        .await
    }

    async fn upsert(&self, record: ImageRecord) -> Result<(), AppError> {
        self.with_conn(move |conn| {
            let now = format_timestamp(&Utc::now(), SecondsFormat::Millis);
            log::debug!("Upserting metadata for file: {}", record.file_path);
            conn.execute(
                "INSERT INTO images
                    (file_path, title, description, tags, last_filesize, last_modified,
                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT(file_path) DO UPDATE SET
                    title = excluded.title,
                    description = excluded.description,
                    tags = excluded.tags,
                    last_filesize = excluded.last_filesize,
                    last_modified = excluded.last_modified,
                    updated_at = excluded.updated_at",
                params![
                    record.file_path,
                    record.title,
                    record.description,
                    join_tags(&record.tags),
                    record.last_filesize as i64,
                    format_timestamp(&record.last_modified, SecondsFormat::Secs),
                    now,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn count(&self) -> Result<u64, AppError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }
}
