//! Error types for the cache store.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during cache store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open or create the database file.
    #[error("Failed to open database at {path}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    /// Failed to create the directory holding the database file.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to run a schema migration.
    #[error("Database migration failed: {0}")]
    Migration(#[from] rusqlite::Error),

    /// A query failed.
    #[error("Database query failed: {0}")]
    Query(String),

    /// The connection mutex was poisoned by a panicking writer.
    #[error("Database connection unavailable: {0}")]
    Lock(String),

    /// An album batch was rolled back part-way through.
    #[error("Failed to save albums ({albums} albums, {images} images processed before the failure): {message}")]
    AlbumBatch {
        albums: u64,
        images: u64,
        message: String,
    },

    /// Caller supplied a value outside the allowed domain.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The database schema version is newer than supported.
    #[error("Database schema version {found} is newer than supported version {expected}")]
    UnsupportedSchemaVersion { found: i32, expected: i32 },
}

impl StoreError {
    /// Create a Query error from a rusqlite error.
    pub fn query(source: rusqlite::Error) -> Self {
        Self::Query(source.to_string())
    }
}
