//! Cache store trait and SQLite implementation.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::DateTime;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{Map, Value};

use super::error::StoreError;
use super::schema;
use super::types::{
    image_id_for, normalize_exif_image_id, parse_timestamp, Album, AlbumInput,
    AlbumSaveSummary, AlbumWithImages, ExifInput, ExifPatch, ExifRecord, ExifSaveSummary, Image,
    ImageView, StoreSummary, UpdateEvent,
};
use crate::types::{StatusCode, SyncStatus, UpdateKind};

/// Highest star rating an image can carry.
pub const MAX_STAR: u8 = 5;

/// Trait for cache store operations.
///
/// Object-safe so the sync engine and the HTTP layer can share an
/// `Arc<dyn GalleryStore>`. Every write runs in its own transaction that is
/// committed or rolled back before the call returns.
#[async_trait]
pub trait GalleryStore: Send + Sync {
    /// Upsert albums and their images.
    ///
    /// Album fields that are `None` keep their stored value. Image star and
    /// likes are never modified. The whole batch rolls back on any error.
    async fn save_albums(
        &self,
        albums: &BTreeMap<String, AlbumInput>,
    ) -> Result<AlbumSaveSummary, StoreError>;

    /// Upsert EXIF rows for images that exist.
    ///
    /// Source ids with a JPEG extension are matched against the stored
    /// `.webp` asset. Entries with no matching image, and entries whose
    /// individual write fails, are counted as skipped.
    async fn save_exif_data(
        &self,
        exif: &BTreeMap<String, ExifInput>,
    ) -> Result<ExifSaveSummary, StoreError>;

    /// Append one row to the update log and return its sequence id.
    ///
    /// `status_code` defaults from `status`.
    async fn log_update(
        &self,
        kind: UpdateKind,
        status: SyncStatus,
        message: Option<&str>,
        status_code: Option<StatusCode>,
    ) -> Result<i64, StoreError>;

    /// Most recent update event of a kind, by sequence then timestamp.
    async fn last_update(&self, kind: UpdateKind) -> Result<Option<UpdateEvent>, StoreError>;

    /// All albums, newest date first.
    async fn albums(&self) -> Result<Vec<Album>, StoreError>;

    async fn album_with_images(&self, id: &str) -> Result<Option<AlbumWithImages>, StoreError>;

    /// Every image joined with its album; attaches EXIF when `with_exif`.
    async fn all_images(&self, with_exif: bool) -> Result<Vec<ImageView>, StoreError>;

    /// Set an image's star rating. Returns false when the id is unknown.
    async fn update_image_star(&self, id: &str, star: u8) -> Result<bool, StoreError>;

    /// Set an image's like count. Returns false when the id is unknown.
    async fn update_image_likes(&self, id: &str, likes: u64) -> Result<bool, StoreError>;

    /// Merge a manual edit over an image's EXIF row.
    ///
    /// Returns false when the image does not exist.
    async fn update_exif(&self, image_id: &str, patch: &ExifPatch) -> Result<bool, StoreError>;

    async fn summary(&self) -> Result<StoreSummary, StoreError>;

    /// Write a consistent copy of the database to `dest`, which must not exist.
    async fn snapshot(&self, dest: &Path) -> Result<(), StoreError>;
}

/// SQLite implementation of the cache store.
pub struct SqliteGalleryStore {
    /// Wrapped in Mutex because rusqlite::Connection is not Sync.
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteGalleryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteGalleryStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteGalleryStore {
    /// Open or create a database at the given path and bring its schema up
    /// to date.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let path = path.to_path_buf();
        let path_clone = path.clone();

        let conn = tokio::task::spawn_blocking(move || {
            if let Some(parent) = path_clone.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| StoreError::CreateDir {
                        path: parent.to_path_buf(),
                        source: e,
                    })?;
                }
            }

            let conn = Connection::open(&path_clone).map_err(|e| StoreError::Open {
                path: path_clone.clone(),
                source: e,
            })?;

            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(StoreError::Migration)?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(StoreError::Migration)?;
            conn.pragma_update(None, "foreign_keys", "ON")
                .map_err(StoreError::Migration)?;

            schema::initialize_schema(&conn)?;

            Ok::<_, StoreError>(conn)
        })
        .await
        .map_err(|e| StoreError::Query(format!("database open task failed: {e}")))??;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Open an in-memory database (for testing).
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Open {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    /// Get the path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|e| StoreError::Lock(e.to_string()))
    }
}

const ALBUM_UPSERT: &str = r#"
    INSERT INTO albums (id, title, description, location, date, cover_image, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, CURRENT_TIMESTAMP)
    ON CONFLICT(id) DO UPDATE SET
        title = COALESCE(excluded.title, albums.title),
        description = COALESCE(excluded.description, albums.description),
        location = COALESCE(excluded.location, albums.location),
        date = COALESCE(excluded.date, albums.date),
        cover_image = COALESCE(excluded.cover_image, albums.cover_image),
        updated_at = CURRENT_TIMESTAMP
"#;

// star and likes are absent from the update set: a sync never touches them.
const IMAGE_UPSERT: &str = r#"
    INSERT INTO images (id, album_id, url, title, location, date, star, likes, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0, CURRENT_TIMESTAMP)
    ON CONFLICT(id) DO UPDATE SET
        album_id = excluded.album_id,
        url = excluded.url,
        title = excluded.title,
        location = excluded.location,
        date = excluded.date,
        updated_at = CURRENT_TIMESTAMP
"#;

const EXIF_UPSERT: &str = r#"
    INSERT INTO exif_data (
        image_id, camera_model, lens_model, f_number, exposure_time,
        iso, focal_length, location, date_time, raw_data, updated_at
    )
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, CURRENT_TIMESTAMP)
    ON CONFLICT(image_id) DO UPDATE SET
        camera_model = excluded.camera_model,
        lens_model = excluded.lens_model,
        f_number = excluded.f_number,
        exposure_time = excluded.exposure_time,
        iso = excluded.iso,
        focal_length = excluded.focal_length,
        location = excluded.location,
        date_time = excluded.date_time,
        raw_data = excluded.raw_data,
        updated_at = CURRENT_TIMESTAMP
"#;

const ALBUM_COLUMNS: &str =
    "id, title, description, location, date, cover_image, created_at, updated_at";

const IMAGE_COLUMNS: &str =
    "i.id, i.album_id, i.url, i.title, i.location, i.date, i.star, i.likes, i.created_at, i.updated_at";

const EXIF_COLUMNS: &str = "e.image_id, e.camera_model, e.lens_model, e.f_number, e.exposure_time, e.iso, e.focal_length, e.location, e.date_time, e.raw_data, e.created_at, e.updated_at";

#[async_trait]
impl GalleryStore for SqliteGalleryStore {
    async fn save_albums(
        &self,
        albums: &BTreeMap<String, AlbumInput>,
    ) -> Result<AlbumSaveSummary, StoreError> {
        let mut conn = self.lock()?;
        let mut summary = AlbumSaveSummary::default();

        let result = (|| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction()?;
            {
                let mut upsert_album = tx.prepare_cached(ALBUM_UPSERT)?;
                let mut stored_album =
                    tx.prepare_cached("SELECT title, location, date FROM albums WHERE id = ?1")?;
                let mut upsert_image = tx.prepare_cached(IMAGE_UPSERT)?;

                for (album_id, album) in albums {
                    tracing::debug!(album = %album_id, images = album.images.len(), "Saving album");
                    upsert_album.execute(rusqlite::params![
                        album_id,
                        album.title,
                        album.description,
                        album.location,
                        album.date,
                        album.images.first(),
                    ])?;
                    summary.albums += 1;

                    // Images carry the album's merged fields, not just this pass's.
                    let (title, location, date): (Option<String>, Option<String>, Option<String>) =
                        stored_album.query_row([album_id], |row| {
                            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                        })?;

                    for url in &album.images {
                        let Some(image_id) = image_id_for(album_id, url) else {
                            tracing::warn!(album = %album_id, url = %url, "Skipping image URL without a file name");
                            summary.skipped_images += 1;
                            continue;
                        };
                        upsert_image.execute(rusqlite::params![
                            image_id, album_id, url, title, location, date,
                        ])?;
                        summary.images += 1;
                    }
                }
            }
            tx.commit()
        })();

        match result {
            Ok(()) => {
                tracing::info!(
                    albums = summary.albums,
                    images = summary.images,
                    skipped = summary.skipped_images,
                    "Saved albums"
                );
                Ok(summary)
            }
            Err(e) => {
                tracing::error!(error = %e, "Saving albums failed, batch rolled back");
                Err(StoreError::AlbumBatch {
                    albums: summary.albums,
                    images: summary.images,
                    message: e.to_string(),
                })
            }
        }
    }

    async fn save_exif_data(
        &self,
        exif: &BTreeMap<String, ExifInput>,
    ) -> Result<ExifSaveSummary, StoreError> {
        let mut summary = ExifSaveSummary::default();
        if exif.is_empty() {
            tracing::warn!("EXIF data is empty, nothing to save");
            return Ok(summary);
        }
        tracing::debug!(entries = exif.len(), "Saving EXIF data");

        // Several source names can map to one stored image (`a.jpg`, `a.JPG`).
        // Keep one entry per image, preferring a source named exactly like it.
        let mut entries: BTreeMap<String, (&str, &ExifInput)> = BTreeMap::new();
        for (source_id, input) in exif {
            if source_id.is_empty() {
                tracing::warn!("Skipping EXIF entry with an empty image id");
                summary.skipped += 1;
                continue;
            }
            let image_id = normalize_exif_image_id(source_id);
            let exact = *source_id == image_id;
            match entries.entry(image_id) {
                Entry::Vacant(slot) => {
                    slot.insert((source_id.as_str(), input));
                }
                Entry::Occupied(mut slot) => {
                    let (kept, dropped) = if exact {
                        let previous = slot.insert((source_id.as_str(), input));
                        (source_id.as_str(), previous.0)
                    } else {
                        (slot.get().0, source_id.as_str())
                    };
                    tracing::warn!(
                        image = %slot.key(),
                        kept,
                        dropped,
                        "Skipping duplicate EXIF entry for the same image"
                    );
                    summary.skipped += 1;
                }
            }
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(StoreError::query)?;
        {
            let mut image_exists = tx
                .prepare_cached("SELECT 1 FROM images WHERE id = ?1")
                .map_err(StoreError::query)?;
            let mut upsert = tx.prepare_cached(EXIF_UPSERT).map_err(StoreError::query)?;

            for (image_id, (source_id, input)) in &entries {
                if !image_exists.exists([image_id]).map_err(StoreError::query)? {
                    tracing::debug!(
                        source = %source_id,
                        image = %image_id,
                        "Skipping EXIF entry, image not found"
                    );
                    summary.skipped += 1;
                    continue;
                }

                let raw_data = match serde_json::to_string(&input.raw) {
                    Ok(raw) => raw,
                    Err(e) => {
                        tracing::warn!(image = %image_id, error = %e, "Skipping EXIF entry, payload not serializable");
                        summary.skipped += 1;
                        continue;
                    }
                };

                let written = upsert.execute(rusqlite::params![
                    image_id,
                    input.camera_model,
                    input.lens_model,
                    input.f_number,
                    input.exposure_time,
                    input.iso,
                    input.focal_length,
                    input.location,
                    input.date_time,
                    raw_data,
                ]);
                match written {
                    Ok(_) => summary.processed += 1,
                    Err(e) => {
                        tracing::warn!(image = %image_id, error = %e, "Skipping EXIF entry, write failed");
                        summary.skipped += 1;
                    }
                }
            }
        }
        tx.commit().map_err(StoreError::query)?;

        tracing::info!(
            processed = summary.processed,
            skipped = summary.skipped,
            "Saved EXIF data"
        );
        Ok(summary)
    }

    async fn log_update(
        &self,
        kind: UpdateKind,
        status: SyncStatus,
        message: Option<&str>,
        status_code: Option<StatusCode>,
    ) -> Result<i64, StoreError> {
        let status_code = status_code.unwrap_or_else(|| StatusCode::from(status));
        tracing::info!(
            kind = kind.as_str(),
            status = %status,
            status_code = status_code.as_str(),
            message = message.unwrap_or_default(),
            "Recording update"
        );

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO updates (type, status, message, status_code) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![kind.as_str(), status.as_str(), message, status_code.as_str()],
        )
        .map_err(StoreError::query)?;

        Ok(conn.last_insert_rowid())
    }

    async fn last_update(&self, kind: UpdateKind) -> Result<Option<UpdateEvent>, StoreError> {
        let conn = self.lock()?;

        conn.query_row(
            r#"
            SELECT id, status, message, status_code, created_at FROM updates
            WHERE type = ?1
            ORDER BY id DESC, created_at DESC
            LIMIT 1
            "#,
            [kind.as_str()],
            |row| {
                let status: String = row.get(1)?;
                let status_code: Option<String> = row.get(3)?;
                let created_at: Option<String> = row.get(4)?;
                Ok(UpdateEvent {
                    id: row.get(0)?,
                    kind,
                    status_code: StatusCode::from_status_str(
                        status_code.as_deref().unwrap_or(&status),
                    ),
                    status,
                    message: row.get(2)?,
                    created_at: parse_timestamp(created_at.as_deref())
                        .unwrap_or(DateTime::UNIX_EPOCH),
                })
            },
        )
        .optional()
        .map_err(StoreError::query)
    }

    async fn albums(&self) -> Result<Vec<Album>, StoreError> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(&format!("SELECT {ALBUM_COLUMNS} FROM albums ORDER BY date DESC"))
            .map_err(StoreError::query)?;

        let albums = stmt
            .query_map([], row_to_album)
            .map_err(StoreError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::query)?;

        Ok(albums)
    }

    async fn album_with_images(&self, id: &str) -> Result<Option<AlbumWithImages>, StoreError> {
        let conn = self.lock()?;

        let album = conn
            .query_row(
                &format!("SELECT {ALBUM_COLUMNS} FROM albums WHERE id = ?1"),
                [id],
                row_to_album,
            )
            .optional()
            .map_err(StoreError::query)?;

        let Some(album) = album else {
            tracing::debug!(album = %id, "Album not found");
            return Ok(None);
        };

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {IMAGE_COLUMNS} FROM images i WHERE i.album_id = ?1 ORDER BY i.rowid"
            ))
            .map_err(StoreError::query)?;
        let images = stmt
            .query_map([id], |row| row_to_image(row, 0))
            .map_err(StoreError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::query)?;

        Ok(Some(AlbumWithImages { album, images }))
    }

    async fn all_images(&self, with_exif: bool) -> Result<Vec<ImageView>, StoreError> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(&format!(
                r#"
                SELECT {IMAGE_COLUMNS}, a.title, a.location, {EXIF_COLUMNS}
                FROM images i
                LEFT JOIN albums a ON i.album_id = a.id
                LEFT JOIN exif_data e ON e.image_id = i.id
                ORDER BY i.rowid
                "#
            ))
            .map_err(StoreError::query)?;

        let images = stmt
            .query_map([], |row| {
                let exif = if with_exif {
                    row_to_exif(row, 12)?
                } else {
                    None
                };
                Ok(ImageView {
                    image: row_to_image(row, 0)?,
                    album_title: row.get(10)?,
                    album_location: row.get(11)?,
                    exif,
                })
            })
            .map_err(StoreError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::query)?;

        Ok(images)
    }

    async fn update_image_star(&self, id: &str, star: u8) -> Result<bool, StoreError> {
        if star > MAX_STAR {
            return Err(StoreError::InvalidInput(format!(
                "star must be between 0 and {MAX_STAR}, got {star}"
            )));
        }

        let conn = self.lock()?;
        let rows = conn
            .execute(
                "UPDATE images SET star = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
                rusqlite::params![star, id],
            )
            .map_err(StoreError::query)?;

        Ok(rows > 0)
    }

    async fn update_image_likes(&self, id: &str, likes: u64) -> Result<bool, StoreError> {
        let likes = i64::try_from(likes)
            .map_err(|_| StoreError::InvalidInput(format!("likes out of range: {likes}")))?;

        let conn = self.lock()?;
        let rows = conn
            .execute(
                "UPDATE images SET likes = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
                rusqlite::params![likes, id],
            )
            .map_err(StoreError::query)?;

        Ok(rows > 0)
    }

    async fn update_exif(&self, image_id: &str, patch: &ExifPatch) -> Result<bool, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(StoreError::query)?;

        let image_exists = tx
            .query_row("SELECT 1 FROM images WHERE id = ?1", [image_id], |_| Ok(()))
            .optional()
            .map_err(StoreError::query)?
            .is_some();
        if !image_exists {
            return Ok(false);
        }

        let existing = tx
            .query_row(
                &format!("SELECT {EXIF_COLUMNS} FROM exif_data e WHERE e.image_id = ?1"),
                [image_id],
                |row| row_to_exif(row, 0),
            )
            .optional()
            .map_err(StoreError::query)?
            .flatten();

        let merged = merge_exif_patch(existing.as_ref(), patch);
        let raw_data = serde_json::to_string(&merged.raw)
            .map_err(|e| StoreError::InvalidInput(format!("EXIF payload not serializable: {e}")))?;

        tx.execute(
            EXIF_UPSERT,
            rusqlite::params![
                image_id,
                merged.camera_model,
                merged.lens_model,
                merged.f_number,
                merged.exposure_time,
                merged.iso,
                merged.focal_length,
                merged.location,
                merged.date_time,
                raw_data,
            ],
        )
        .map_err(StoreError::query)?;
        tx.commit().map_err(StoreError::query)?;

        tracing::info!(image = %image_id, "Updated EXIF data");
        Ok(true)
    }

    async fn summary(&self) -> Result<StoreSummary, StoreError> {
        let conn = self.lock()?;

        let count = |table: &str| -> Result<u64, StoreError> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as u64)
            .map_err(StoreError::query)
        };
        let last_updated = |table: &str| -> Result<Option<String>, StoreError> {
            conn.query_row(&format!("SELECT MAX(updated_at) FROM {table}"), [], |row| {
                row.get(0)
            })
            .map_err(StoreError::query)
        };

        Ok(StoreSummary {
            albums: count("albums")?,
            images: count("images")?,
            exif_records: count("exif_data")?,
            albums_updated_at: parse_timestamp(last_updated("albums")?.as_deref()),
            exif_updated_at: parse_timestamp(last_updated("exif_data")?.as_deref()),
        })
    }

    async fn snapshot(&self, dest: &Path) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute("VACUUM INTO ?1", [dest.to_string_lossy()])
            .map_err(StoreError::query)?;
        tracing::debug!(dest = %dest.display(), "Wrote database snapshot");
        Ok(())
    }
}

/// Overlay a manual edit on the stored EXIF fields.
///
/// The raw payload keeps every key it already had (GPS included); the
/// modeled fields are written back into it under their source names.
fn merge_exif_patch(existing: Option<&ExifRecord>, patch: &ExifPatch) -> ExifInput {
    let mut raw = existing
        .and_then(|e| e.raw.as_ref())
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let merged = ExifInput {
        camera_model: patch
            .camera_model
            .clone()
            .or_else(|| existing.and_then(|e| e.camera_model.clone())),
        lens_model: patch
            .lens_model
            .clone()
            .or_else(|| existing.and_then(|e| e.lens_model.clone())),
        f_number: patch.f_number.or_else(|| existing.and_then(|e| e.f_number)),
        exposure_time: patch
            .exposure_time
            .clone()
            .or_else(|| existing.and_then(|e| e.exposure_time.clone())),
        iso: patch.iso.or_else(|| existing.and_then(|e| e.iso)),
        focal_length: patch
            .focal_length
            .clone()
            .or_else(|| existing.and_then(|e| e.focal_length.clone())),
        location: patch
            .location
            .clone()
            .or_else(|| existing.and_then(|e| e.location.clone())),
        date_time: patch
            .date_time
            .clone()
            .or_else(|| existing.and_then(|e| e.date_time.clone())),
        raw: Map::new(),
    };

    let fields: [(&str, Value); 8] = [
        ("CameraModel", merged.camera_model.clone().into()),
        ("LensModel", merged.lens_model.clone().into()),
        ("FNumber", merged.f_number.into()),
        ("ExposureTime", merged.exposure_time.clone().into()),
        ("ISO", merged.iso.into()),
        ("FocalLength", merged.focal_length.clone().into()),
        ("Location", merged.location.clone().into()),
        ("DateTime", merged.date_time.clone().into()),
    ];
    for (key, value) in fields {
        raw.insert(key.to_string(), value);
    }

    ExifInput { raw, ..merged }
}

fn row_to_album(row: &rusqlite::Row<'_>) -> rusqlite::Result<Album> {
    let created_at: Option<String> = row.get(6)?;
    let updated_at: Option<String> = row.get(7)?;
    Ok(Album {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        location: row.get(3)?,
        date: row.get(4)?,
        cover_image: row.get(5)?,
        created_at: parse_timestamp(created_at.as_deref()).unwrap_or(DateTime::UNIX_EPOCH),
        updated_at: parse_timestamp(updated_at.as_deref()).unwrap_or(DateTime::UNIX_EPOCH),
    })
}

/// Read the image columns starting at `offset`.
fn row_to_image(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Image> {
    let star: Option<i64> = row.get(offset + 6)?;
    let likes: Option<i64> = row.get(offset + 7)?;
    let created_at: Option<String> = row.get(offset + 8)?;
    let updated_at: Option<String> = row.get(offset + 9)?;
    Ok(Image {
        id: row.get(offset)?,
        album_id: row.get::<_, Option<String>>(offset + 1)?.unwrap_or_default(),
        url: row.get(offset + 2)?,
        title: row.get(offset + 3)?,
        location: row.get(offset + 4)?,
        date: row.get(offset + 5)?,
        star: star.unwrap_or(0).clamp(0, i64::from(MAX_STAR)) as u8,
        likes: likes.unwrap_or(0).max(0) as u64,
        created_at: parse_timestamp(created_at.as_deref()).unwrap_or(DateTime::UNIX_EPOCH),
        updated_at: parse_timestamp(updated_at.as_deref()).unwrap_or(DateTime::UNIX_EPOCH),
    })
}

/// Read the EXIF columns starting at `offset`; `None` when the LEFT JOIN
/// found no row.
fn row_to_exif(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Option<ExifRecord>> {
    let Some(image_id) = row.get::<_, Option<String>>(offset)? else {
        return Ok(None);
    };
    let raw_data: Option<String> = row.get(offset + 9)?;
    let raw = raw_data
        .as_deref()
        .and_then(|raw| match serde_json::from_str::<Value>(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(image = %image_id, error = %e, "Failed to parse raw EXIF data");
                None
            }
        });
    let created_at: Option<String> = row.get(offset + 10)?;
    let updated_at: Option<String> = row.get(offset + 11)?;

    Ok(Some(ExifRecord {
        camera_model: row.get(offset + 1)?,
        lens_model: row.get(offset + 2)?,
        f_number: row.get(offset + 3)?,
        exposure_time: row.get(offset + 4)?,
        iso: row.get(offset + 5)?,
        focal_length: row.get(offset + 6)?,
        location: row.get(offset + 7)?,
        date_time: row.get(offset + 8)?,
        raw_data,
        raw,
        created_at: parse_timestamp(created_at.as_deref()).unwrap_or(DateTime::UNIX_EPOCH),
        updated_at: parse_timestamp(updated_at.as_deref()).unwrap_or(DateTime::UNIX_EPOCH),
        image_id,
    }))
}
