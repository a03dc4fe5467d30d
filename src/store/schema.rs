//! Database schema definitions and migrations.
//!
//! Migrations are forward-only and applied in order. Each one must be safe
//! to run against a database that already has its effect, because the
//! first deployments created tables without recording `user_version`.

use rusqlite::Connection;

use super::error::StoreError;

/// A single versioned schema change.
pub(crate) struct Migration {
    pub version: i32,
    pub name: &'static str,
    pub apply: fn(&Connection) -> Result<(), StoreError>,
}

/// All migrations in order.
pub(crate) const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "base tables",
        apply: create_base_tables,
    },
    Migration {
        version: 2,
        name: "updates.status_code",
        apply: add_update_status_code,
    },
];

/// Current schema version. Equal to the last migration's version.
pub const SCHEMA_VERSION: i32 = 2;

const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS albums (
    id TEXT PRIMARY KEY,
    title TEXT,
    description TEXT,
    location TEXT,
    date TEXT,
    cover_image TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS images (
    id TEXT PRIMARY KEY,
    album_id TEXT,
    url TEXT NOT NULL,
    title TEXT,
    location TEXT,
    date TEXT,
    star INTEGER DEFAULT 0,
    likes INTEGER DEFAULT 0,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (album_id) REFERENCES albums(id)
);

CREATE INDEX IF NOT EXISTS idx_images_album_id ON images(album_id);

CREATE TABLE IF NOT EXISTS exif_data (
    image_id TEXT PRIMARY KEY,
    camera_model TEXT,
    lens_model TEXT,
    f_number REAL,
    exposure_time TEXT,
    iso INTEGER,
    focal_length TEXT,
    location TEXT,
    date_time TEXT,
    raw_data TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (image_id) REFERENCES images(id)
);

CREATE TABLE IF NOT EXISTS updates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    type TEXT NOT NULL,
    status TEXT NOT NULL,
    message TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
"#;

fn create_base_tables(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(SCHEMA_V1)?;
    Ok(())
}

fn add_update_status_code(conn: &Connection) -> Result<(), StoreError> {
    if has_column(conn, "updates", "status_code")? {
        return Ok(());
    }
    tracing::info!("Adding status_code column to updates");
    conn.execute_batch(
        r#"
        ALTER TABLE updates ADD COLUMN status_code TEXT;
        UPDATE updates SET status_code =
            CASE
                WHEN status = 'success' THEN 'success'
                WHEN status = 'warning' THEN 'warning'
                WHEN status = 'error' THEN 'error'
                WHEN status = 'partial_success' THEN 'partial_success'
                ELSE 'info'
            END;
        "#,
    )?;
    Ok(())
}

/// Whether `table` has a column named `column`.
pub(crate) fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool, StoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names.iter().any(|name| name == column))
}

/// Get the current schema version from the database.
pub(crate) fn get_schema_version(conn: &Connection) -> Result<i32, StoreError> {
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), StoreError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

/// Bring the schema up to [`SCHEMA_VERSION`].
///
/// Called once at process start; idempotent on an up-to-date database.
pub fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
    let current_version = get_schema_version(conn)?;

    if current_version > SCHEMA_VERSION {
        return Err(StoreError::UnsupportedSchemaVersion {
            found: current_version,
            expected: SCHEMA_VERSION,
        });
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > current_version) {
        (migration.apply)(conn)?;
        set_schema_version(conn, migration.version)?;
        tracing::debug!(
            version = migration.version,
            name = migration.name,
            "Applied schema migration"
        );
    }

    Ok(())
}
