//! Local relational cache of the gallery.
//!
//! Holds albums, images, EXIF records, and the append-only update log in a
//! single SQLite file. User-curated image fields (star, likes) live only
//! here; a sync pass never resets them.

pub mod db;
pub mod error;
pub mod schema;
pub mod types;

pub use db::{GalleryStore, SqliteGalleryStore, MAX_STAR};
pub use error::StoreError;
pub use types::{
    Album, AlbumInput, AlbumSaveSummary, AlbumWithImages, ExifInput, ExifPatch, ExifRecord,
    ExifSaveSummary, Image, ImageView, StoreSummary, UpdateEvent,
};
