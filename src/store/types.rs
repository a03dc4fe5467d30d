//! Types for the cache store.

use std::borrow::Cow;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::types::{StatusCode, SyncStatus, UpdateKind};

/// Extension every gallery asset is stored under after conversion.
pub const CANONICAL_IMAGE_EXTENSION: &str = "webp";

/// Album fields discovered for one album id, already normalized.
///
/// `None` means "not provided this pass"; the stored value is kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlbumInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub date: Option<String>,
    /// Public image URLs in discovery order.
    pub images: Vec<String>,
}

/// EXIF fields for one image, extracted from the bulk EXIF document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExifInput {
    pub camera_model: Option<String>,
    pub lens_model: Option<String>,
    pub f_number: Option<f64>,
    pub exposure_time: Option<String>,
    pub iso: Option<i64>,
    pub focal_length: Option<String>,
    pub location: Option<String>,
    pub date_time: Option<String>,
    /// Full original payload, including GPS fields not modeled above.
    pub raw: Map<String, Value>,
}

/// Partial EXIF edit; absent fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
pub struct ExifPatch {
    pub camera_model: Option<String>,
    pub lens_model: Option<String>,
    pub f_number: Option<f64>,
    pub exposure_time: Option<String>,
    pub iso: Option<i64>,
    pub focal_length: Option<String>,
    pub location: Option<String>,
    pub date_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Album {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub date: Option<String>,
    pub cover_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Image {
    /// `{album_id}/{basename}`.
    pub id: String,
    pub album_id: String,
    pub url: String,
    pub title: Option<String>,
    pub location: Option<String>,
    pub date: Option<String>,
    /// User-curated, 0..=5. Never reset by a sync pass.
    pub star: u8,
    /// User-curated. Never reset by a sync pass.
    pub likes: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlbumWithImages {
    #[serde(flatten)]
    pub album: Album,
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExifRecord {
    pub image_id: String,
    pub camera_model: Option<String>,
    pub lens_model: Option<String>,
    pub f_number: Option<f64>,
    pub exposure_time: Option<String>,
    pub iso: Option<i64>,
    pub focal_length: Option<String>,
    pub location: Option<String>,
    pub date_time: Option<String>,
    pub raw_data: Option<String>,
    /// Parsed view of `raw_data`; `None` when absent or unparseable.
    pub raw: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An image joined with its album and, optionally, its EXIF record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageView {
    #[serde(flatten)]
    pub image: Image,
    pub album_title: Option<String>,
    pub album_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exif: Option<ExifRecord>,
}

/// One row of the append-only update log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateEvent {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    /// Raw status text; rows written by older deployments may fall outside
    /// [`SyncStatus`].
    pub status: String,
    pub status_code: StatusCode,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Counts from one `save_albums` batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlbumSaveSummary {
    pub albums: u64,
    pub images: u64,
    /// Image URLs that could not yield an image id.
    pub skipped_images: u64,
}

/// Counts from one `save_exif_data` batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExifSaveSummary {
    pub processed: u64,
    pub skipped: u64,
}

impl ExifSaveSummary {
    /// Empty input and "nothing matched" are warnings, not failures.
    pub fn status(&self) -> SyncStatus {
        if self.processed == 0 {
            SyncStatus::Warning
        } else {
            SyncStatus::Success
        }
    }

    pub fn message(&self) -> String {
        match (self.processed, self.skipped) {
            (0, 0) => "EXIF data is empty, nothing to process".to_string(),
            (0, skipped) => format!("No matching images, all {skipped} EXIF entries skipped"),
            (processed, skipped) => {
                format!("Saved EXIF data: {processed} processed, {skipped} skipped")
            }
        }
    }
}

/// Row counts and freshness of the cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreSummary {
    pub albums: u64,
    pub images: u64,
    pub exif_records: u64,
    pub albums_updated_at: Option<DateTime<Utc>>,
    pub exif_updated_at: Option<DateTime<Utc>>,
}

/// Derive the stored image id for an image URL under `album_id`.
///
/// The query and fragment are dropped and the basename is percent-decoded,
/// so the id carries the object's own file name. Returns `None` when the
/// URL has no basename (e.g. ends in `/`).
pub fn image_id_for(album_id: &str, url: &str) -> Option<String> {
    let path = url.split(|c: char| c == '?' || c == '#').next().unwrap_or(url);
    let basename = path.rsplit('/').next().unwrap_or(path);
    if basename.is_empty() {
        return None;
    }
    let basename = urlencoding::decode(basename).unwrap_or(Cow::Borrowed(basename));
    Some(format!("{album_id}/{basename}"))
}

/// Rewrite JPEG-family extensions to the stored extension.
///
/// EXIF is extracted from the camera originals, while the bucket holds the
/// converted assets, so `paris/IMG_001.JPG` refers to `paris/IMG_001.webp`.
pub fn normalize_exif_image_id(id: &str) -> String {
    match id.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg")) =>
        {
            format!("{stem}.{CANONICAL_IMAGE_EXTENSION}")
        }
        _ => id.to_string(),
    }
}

/// Parse a SQLite `CURRENT_TIMESTAMP` value (`YYYY-MM-DD HH:MM:SS`, UTC).
pub(crate) fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?;
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_id_from_url() {
        assert_eq!(
            image_id_for("tokyo", "https://b.oss.example.com/gallery/tokyo/a.webp").as_deref(),
            Some("tokyo/a.webp")
        );
        assert_eq!(
            image_id_for("tokyo", "https://b.example.com/gallery/tokyo/a.webp?v=2").as_deref(),
            Some("tokyo/a.webp")
        );
        assert_eq!(image_id_for("tokyo", "https://b.example.com/gallery/tokyo/"), None);
    }

    #[test]
    fn test_image_id_decodes_escaped_file_name() {
        assert_eq!(
            image_id_for("tokyo", "https://b.example.com/gallery/tokyo/a%231.webp").as_deref(),
            Some("tokyo/a#1.webp")
        );
        assert_eq!(
            image_id_for("tokyo", "https://b.example.com/gallery/tokyo/why%3F%20not.webp").as_deref(),
            Some("tokyo/why? not.webp")
        );
    }

    #[test]
    fn test_normalize_exif_image_id() {
        assert_eq!(normalize_exif_image_id("paris/IMG_001.JPG"), "paris/IMG_001.webp");
        assert_eq!(normalize_exif_image_id("paris/IMG_001.jpeg"), "paris/IMG_001.webp");
        assert_eq!(normalize_exif_image_id("paris/IMG_001.Jpg"), "paris/IMG_001.webp");
        assert_eq!(normalize_exif_image_id("paris/IMG_001.webp"), "paris/IMG_001.webp");
        assert_eq!(normalize_exif_image_id("paris/IMG_001.png"), "paris/IMG_001.png");
        assert_eq!(normalize_exif_image_id("noext"), "noext");
    }

    #[test]
    fn test_exif_summary_status() {
        let empty = ExifSaveSummary::default();
        assert_eq!(empty.status(), SyncStatus::Warning);

        let unmatched = ExifSaveSummary { processed: 0, skipped: 4 };
        assert_eq!(unmatched.status(), SyncStatus::Warning);
        assert!(unmatched.message().contains("4"));

        let some = ExifSaveSummary { processed: 2, skipped: 3 };
        assert_eq!(some.status(), SyncStatus::Success);
    }

    #[test]
    fn test_parse_timestamp() {
        let ts = parse_timestamp(Some("2024-05-01 12:30:00")).unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-05-01T12:30:00+00:00");
        assert!(parse_timestamp(Some("garbage")).is_none());
        assert!(parse_timestamp(None).is_none());
    }
}
