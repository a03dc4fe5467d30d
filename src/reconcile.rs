//! Normalization of raw discovery output into typed store inputs.
//!
//! Album manifests and the bulk EXIF document arrive as untyped YAML/JSON.
//! Everything here is a pure transformation; no I/O.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Value as JsonValue};
use serde_yaml::value::TaggedValue;
use serde_yaml::{Mapping, Value as YamlValue};
use thiserror::Error;

use crate::config::SyncConfig;
use crate::discovery::{yaml_type_name, Discovery};
use crate::store::{AlbumInput, ExifInput};

/// Keys tried, in order, to name an entry of an array-shaped EXIF document.
const EXIF_ARRAY_ID_FIELDS: [&str; 6] = ["FileName", "fileName", "filename", "file_name", "name", "id"];

/// Domain-level failures that abort the albums or EXIF phase.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("No albums found under the gallery prefix")]
    NoAlbums,

    #[error("Failed to parse EXIF data, check the document format: {0}")]
    ExifParse(String),

    #[error("EXIF data is not an object: {0}")]
    ExifNotObject(&'static str),

    #[error("EXIF data array contains no object entries")]
    ExifNoValidEntries,
}

/// Typed EXIF entries plus the count of entries rejected as malformed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExifDocument {
    pub entries: BTreeMap<String, ExifInput>,
    pub rejected: u64,
}

/// Turn discovered albums into store inputs.
///
/// Zero albums is an error: a gallery with no albums means content ingestion
/// failed, not that the gallery is legitimately empty.
pub fn albums_from_discovery(
    discovery: &Discovery,
    config: &SyncConfig,
) -> Result<BTreeMap<String, AlbumInput>, ReconcileError> {
    if discovery.albums.is_empty() {
        return Err(ReconcileError::NoAlbums);
    }

    let albums = discovery
        .albums
        .iter()
        .map(|(album_id, raw)| {
            let manifest = canonicalize_mapping(&raw.manifest);
            let images = manifest_images(&manifest, &raw.folder, config)
                .unwrap_or_else(|| raw.images.clone());
            let album = AlbumInput {
                title: scalar_field(&manifest, "title"),
                description: scalar_field(&manifest, "description")
                    .or_else(|| scalar_field(&manifest, "desc")),
                location: location_field(&manifest),
                date: scalar_field(&manifest, "date"),
                images,
            };
            tracing::debug!(
                album = %album_id,
                title = album.title.as_deref().unwrap_or_default(),
                images = album.images.len(),
                "Normalized album"
            );
            (album_id.clone(), album)
        })
        .collect();

    Ok(albums)
}

/// Image list declared by the manifest, which takes precedence over the
/// folder listing. Relative entries are resolved inside the album folder.
fn manifest_images(manifest: &Mapping, folder: &str, config: &SyncConfig) -> Option<Vec<String>> {
    let YamlValue::Sequence(entries) = manifest.get("images")? else {
        return None;
    };
    let images = entries
        .iter()
        .filter_map(yaml_scalar)
        .map(|entry| {
            if entry.contains("://") {
                entry
            } else {
                config.public_url(&format!("{folder}{}", entry.trim_start_matches('/')))
            }
        })
        .collect();
    Some(images)
}

fn scalar_field(manifest: &Mapping, field: &str) -> Option<String> {
    let value = manifest.get(field)?;
    let scalar = yaml_scalar(value);
    if scalar.is_none() && !value.is_null() {
        tracing::warn!(
            field,
            kind = yaml_type_name(value),
            "Ignoring non-scalar manifest field"
        );
    }
    scalar
}

/// `location` as free text, or `"lat,lon"` from a pair or a coordinate map.
fn location_field(manifest: &Mapping) -> Option<String> {
    let coordinates = match manifest.get("location")? {
        YamlValue::Sequence(pair) if pair.len() == 2 => {
            yaml_number(&pair[0]).zip(yaml_number(&pair[1]))
        }
        YamlValue::Mapping(coords) => {
            let get = |short: &str, long: &str| {
                coords
                    .get(short)
                    .or_else(|| coords.get(long))
                    .and_then(yaml_number)
            };
            get("lat", "latitude").zip(get("lon", "longitude"))
        }
        _ => return scalar_field(manifest, "location"),
    };
    match coordinates {
        Some((lat, lon)) => Some(format!("{lat},{lon}")),
        None => {
            tracing::warn!("Ignoring manifest location without numeric latitude and longitude");
            None
        }
    }
}

fn yaml_scalar(value: &YamlValue) -> Option<String> {
    match value {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        YamlValue::Tagged(tagged) => yaml_scalar(&tagged.value),
        YamlValue::Null | YamlValue::Sequence(_) | YamlValue::Mapping(_) => None,
    }
}

fn yaml_number(value: &YamlValue) -> Option<f64> {
    match value {
        YamlValue::Number(n) => n.as_f64(),
        YamlValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Rewrite timestamp strings under date or time keys to RFC 3339 UTC.
///
/// Only values whose key names a date or time (`date`, `shot_time`,
/// `taken_at`, ...) are touched, at any depth; free text such as a title is
/// left alone even when it looks like a timestamp.
pub fn canonicalize_mapping(mapping: &Mapping) -> Mapping {
    mapping
        .iter()
        .map(|(k, v)| (k.clone(), canonicalize_value(v, is_date_key(k))))
        .collect()
}

fn is_date_key(key: &YamlValue) -> bool {
    let Some(key) = key.as_str() else {
        return false;
    };
    let key = key.to_ascii_lowercase();
    key.contains("date") || key.contains("time") || key.ends_with("_at")
}

fn canonicalize_value(value: &YamlValue, date_field: bool) -> YamlValue {
    match value {
        YamlValue::String(s) if date_field => {
            YamlValue::String(canonical_timestamp(s).unwrap_or_else(|| s.clone()))
        }
        YamlValue::Sequence(items) => YamlValue::Sequence(
            items
                .iter()
                .map(|item| canonicalize_value(item, date_field))
                .collect(),
        ),
        YamlValue::Mapping(mapping) => YamlValue::Mapping(canonicalize_mapping(mapping)),
        YamlValue::Tagged(tagged) => YamlValue::Tagged(Box::new(TaggedValue {
            tag: tagged.tag.clone(),
            value: canonicalize_value(&tagged.value, date_field),
        })),
        other => other.clone(),
    }
}

/// Canonical form of a YAML timestamp that carries a time of day.
///
/// Date-only values (`2024-04-01`) and free text are left alone.
pub fn canonical_timestamp(s: &str) -> Option<String> {
    let s = s.trim();
    let parsed = DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| naive.and_utc())
        })?;
    Some(parsed.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Parse the bulk EXIF document.
///
/// Accepts an object keyed by image id, or an array of objects keyed by
/// their first present name field (else `item_{index}`). An empty object is
/// valid and yields no entries.
pub fn parse_exif_document(bytes: &[u8]) -> Result<ExifDocument, ReconcileError> {
    let value: JsonValue =
        serde_json::from_slice(bytes).map_err(|e| ReconcileError::ExifParse(e.to_string()))?;

    let object = match value {
        JsonValue::Object(object) => object,
        JsonValue::Array(items) => exif_array_to_object(items)?,
        JsonValue::Null => return Err(ReconcileError::ExifNotObject("null")),
        JsonValue::Bool(_) => return Err(ReconcileError::ExifNotObject("boolean")),
        JsonValue::Number(_) => return Err(ReconcileError::ExifNotObject("number")),
        JsonValue::String(_) => return Err(ReconcileError::ExifNotObject("string")),
    };

    let mut document = ExifDocument::default();
    for (image_id, entry) in object {
        match entry {
            JsonValue::Object(fields) if !image_id.is_empty() => {
                document.entries.insert(image_id, exif_input_from(fields));
            }
            _ => {
                tracing::warn!(image = %image_id, "Rejecting malformed EXIF entry");
                document.rejected += 1;
            }
        }
    }
    Ok(document)
}

fn exif_array_to_object(items: Vec<JsonValue>) -> Result<Map<String, JsonValue>, ReconcileError> {
    let mut object = Map::new();
    for (index, item) in items.into_iter().enumerate() {
        let JsonValue::Object(fields) = item else {
            tracing::debug!(index, "Ignoring non-object EXIF array item");
            continue;
        };
        let key = EXIF_ARRAY_ID_FIELDS
            .iter()
            .find_map(|field| match fields.get(*field) {
                Some(JsonValue::String(s)) if !s.is_empty() => Some(s.clone()),
                Some(JsonValue::Number(n)) => Some(n.to_string()),
                _ => None,
            })
            .unwrap_or_else(|| format!("item_{index}"));
        object.insert(key, JsonValue::Object(fields));
    }
    if object.is_empty() {
        return Err(ReconcileError::ExifNoValidEntries);
    }
    Ok(object)
}

/// Pick the modeled fields out of one EXIF entry, keeping the full payload.
pub fn exif_input_from(raw: Map<String, JsonValue>) -> ExifInput {
    ExifInput {
        camera_model: json_text(raw.get("CameraModel")),
        lens_model: json_text(raw.get("LensModel")),
        f_number: raw.get("FNumber").and_then(json_f_number),
        exposure_time: json_text(raw.get("ExposureTime")),
        iso: raw.get("ISO").and_then(json_integer),
        focal_length: json_text(raw.get("FocalLength")),
        location: json_text(raw.get("Location")),
        date_time: json_text(raw.get("DateTime")),
        raw,
    }
}

fn json_text(value: Option<&JsonValue>) -> Option<String> {
    match value? {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn json_f_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => {
            let s = s.trim();
            let s = s
                .strip_prefix("f/")
                .or_else(|| s.strip_prefix("F/"))
                .or_else(|| s.strip_prefix('f'))
                .unwrap_or(s);
            s.trim().parse().ok()
        }
        _ => None,
    }
}

fn json_integer(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::RawAlbum;
    use serde_json::json;

    fn discovery_with(album_id: &str, manifest: &str, images: &[&str]) -> Discovery {
        let mut discovery = Discovery::default();
        discovery.albums.insert(
            album_id.to_string(),
            RawAlbum {
                manifest: crate::discovery::parse_manifest(manifest.as_bytes()).unwrap(),
                images: images.iter().map(|s| s.to_string()).collect(),
                folder: format!("gallery/{album_id}/"),
            },
        );
        discovery
    }

    #[test]
    fn test_zero_albums_is_error() {
        let result = albums_from_discovery(&Discovery::default(), &SyncConfig::for_tests());
        assert_eq!(result.unwrap_err(), ReconcileError::NoAlbums);
    }

    #[test]
    fn test_desc_alias_and_scalar_fields() {
        let discovery = discovery_with(
            "tokyo",
            "title: Tokyo Trip\ndesc: Cherry blossoms\nlocation: \"35.6762,139.6503\"\ndate: 2024-04\n",
            &["https://portfolio.oss.example.com/gallery/tokyo/a.webp"],
        );
        let albums = albums_from_discovery(&discovery, &SyncConfig::for_tests()).unwrap();
        let tokyo = &albums["tokyo"];
        assert_eq!(tokyo.title.as_deref(), Some("Tokyo Trip"));
        assert_eq!(tokyo.description.as_deref(), Some("Cherry blossoms"));
        assert_eq!(tokyo.location.as_deref(), Some("35.6762,139.6503"));
        assert_eq!(tokyo.date.as_deref(), Some("2024-04"));
        assert_eq!(tokyo.images.len(), 1);
    }

    #[test]
    fn test_description_wins_over_desc() {
        let discovery = discovery_with("a", "description: long\ndesc: short\n", &[]);
        let albums = albums_from_discovery(&discovery, &SyncConfig::for_tests()).unwrap();
        assert_eq!(albums["a"].description.as_deref(), Some("long"));
    }

    #[test]
    fn test_sparse_album_is_kept() {
        let discovery = discovery_with("empty", "", &[]);
        let albums = albums_from_discovery(&discovery, &SyncConfig::for_tests()).unwrap();
        assert_eq!(albums["empty"], AlbumInput::default());
    }

    #[test]
    fn test_manifest_image_list_resolves_relative_entries() {
        let discovery = discovery_with(
            "kyoto",
            "images:\n  - b.webp\n  - https://cdn.example.com/x.webp\n",
            &["https://portfolio.oss.example.com/gallery/kyoto/a.webp"],
        );
        let albums = albums_from_discovery(&discovery, &SyncConfig::for_tests()).unwrap();
        assert_eq!(
            albums["kyoto"].images,
            [
                "https://portfolio.oss.example.com/gallery/kyoto/b.webp",
                "https://cdn.example.com/x.webp",
            ]
        );
    }

    #[test]
    fn test_structured_location() {
        let discovery = discovery_with("a", "location: [35.6, 139.7]\n", &[]);
        let albums = albums_from_discovery(&discovery, &SyncConfig::for_tests()).unwrap();
        assert_eq!(albums["a"].location.as_deref(), Some("35.6,139.7"));

        let discovery = discovery_with("b", "location:\n  lat: 48.85\n  lon: 2.35\n", &[]);
        let albums = albums_from_discovery(&discovery, &SyncConfig::for_tests()).unwrap();
        assert_eq!(albums["b"].location.as_deref(), Some("48.85,2.35"));
    }

    #[test]
    fn test_numeric_title_is_stringified() {
        let discovery = discovery_with("a", "title: 2024\n", &[]);
        let albums = albums_from_discovery(&discovery, &SyncConfig::for_tests()).unwrap();
        assert_eq!(albums["a"].title.as_deref(), Some("2024"));
    }

    #[test]
    fn test_canonical_timestamp() {
        assert_eq!(
            canonical_timestamp("2024-04-01 10:30:00").as_deref(),
            Some("2024-04-01T10:30:00.000Z")
        );
        assert_eq!(
            canonical_timestamp("2024-04-01T10:30:00+08:00").as_deref(),
            Some("2024-04-01T02:30:00.000Z")
        );
        assert_eq!(canonical_timestamp("2024-04-01"), None);
        assert_eq!(canonical_timestamp("Spring 2024"), None);
    }

    #[test]
    fn test_dates_canonicalized_recursively() {
        let manifest = crate::discovery::parse_manifest(
            b"date: 2024-04-01 10:30:00\nshots:\n  - taken_at: 2024-04-02T00:00:00Z\n    caption: 2024-04-02 08:00:00\n",
        )
        .unwrap();
        let canonical = canonicalize_mapping(&manifest);
        assert_eq!(
            canonical.get("date"),
            Some(&YamlValue::from("2024-04-01T10:30:00.000Z"))
        );
        let shots = canonical.get("shots").unwrap();
        assert_eq!(shots[0]["taken_at"], YamlValue::from("2024-04-02T00:00:00.000Z"));
        assert_eq!(shots[0]["caption"], YamlValue::from("2024-04-02 08:00:00"));
    }

    #[test]
    fn test_timestamp_like_title_is_untouched() {
        let manifest =
            crate::discovery::parse_manifest(b"title: 2024-04-01 10:30:00\nshot_time: !local 2024-04-01 10:30:00\n")
                .unwrap();
        let canonical = canonicalize_mapping(&manifest);
        assert_eq!(canonical.get("title"), Some(&YamlValue::from("2024-04-01 10:30:00")));

        let YamlValue::Tagged(tagged) = canonical.get("shot_time").unwrap() else {
            panic!("tag dropped");
        };
        assert_eq!(tagged.tag, "local");
        assert_eq!(tagged.value, YamlValue::from("2024-04-01T10:30:00.000Z"));
    }

    #[test]
    fn test_unusable_structured_location_is_dropped() {
        let discovery = discovery_with("a", "location: [north, east]\n", &[]);
        let albums = albums_from_discovery(&discovery, &SyncConfig::for_tests()).unwrap();
        assert_eq!(albums["a"].location, None);

        let discovery = discovery_with("b", "location:\n  city: Paris\n", &[]);
        let albums = albums_from_discovery(&discovery, &SyncConfig::for_tests()).unwrap();
        assert_eq!(albums["b"].location, None);
    }

    #[test]
    fn test_parse_exif_object() {
        let doc = parse_exif_document(
            json!({
                "paris/IMG_001.JPG": {
                    "CameraModel": "X100V",
                    "FNumber": "f/2.0",
                    "ISO": "160",
                    "ExposureTime": "1/250",
                    "FocalLength": 23,
                    "GPSLatitude": 48.85
                },
                "paris/bad.jpg": "not an object"
            })
            .to_string()
            .as_bytes(),
        )
        .unwrap();
        assert_eq!(doc.rejected, 1);
        let entry = &doc.entries["paris/IMG_001.JPG"];
        assert_eq!(entry.camera_model.as_deref(), Some("X100V"));
        assert_eq!(entry.f_number, Some(2.0));
        assert_eq!(entry.iso, Some(160));
        assert_eq!(entry.focal_length.as_deref(), Some("23"));
        assert_eq!(entry.raw["GPSLatitude"], json!(48.85));
    }

    #[test]
    fn test_parse_exif_array() {
        let doc = parse_exif_document(
            br#"[{"FileName": "tokyo/a.jpg", "ISO": 200}, 7, {"ISO": 100}]"#,
        )
        .unwrap();
        assert_eq!(doc.entries.len(), 2);
        assert_eq!(doc.entries["tokyo/a.jpg"].iso, Some(200));
        assert!(doc.entries.contains_key("item_2"));
    }

    #[test]
    fn test_parse_exif_errors() {
        assert!(matches!(
            parse_exif_document(b"{not json"),
            Err(ReconcileError::ExifParse(_))
        ));
        assert_eq!(
            parse_exif_document(b"null").unwrap_err(),
            ReconcileError::ExifNotObject("null")
        );
        assert_eq!(
            parse_exif_document(b"42").unwrap_err(),
            ReconcileError::ExifNotObject("number")
        );
        assert_eq!(
            parse_exif_document(b"[1, 2]").unwrap_err(),
            ReconcileError::ExifNoValidEntries
        );
    }

    #[test]
    fn test_parse_exif_empty_object() {
        let doc = parse_exif_document(b"{}").unwrap();
        assert!(doc.entries.is_empty());
        assert_eq!(doc.rejected, 0);
    }
}
