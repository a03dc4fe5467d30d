//! Read projections of the cache in the shapes the portfolio frontend
//! consumes. Shared by the HTTP layer and the `export` command.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::ExportConfig;
use crate::store::{ExifRecord, GalleryStore, ImageView, StoreError, StoreSummary, UpdateEvent};
use crate::types::UpdateKind;

const UNKNOWN_ALBUM: &str = "Unknown album";
const UNKNOWN_LOCATION: &str = "Unknown location";
const UNKNOWN_DATE: &str = "Unknown date";
const UNKNOWN_CAMERA: &str = "Unknown camera";

/// One album as listed in the albums map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlbumEntry {
    pub title: Option<String>,
    pub desc: Option<String>,
    pub location: Option<String>,
    pub date: Option<String>,
    pub images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlbumDetail {
    pub id: String,
    #[serde(flatten)]
    pub entry: AlbumEntry,
}

/// A geotagged image for the map view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapPoint {
    pub id: String,
    pub url: String,
    pub title: String,
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    pub date: String,
    pub camera_model: String,
    pub exif: MapExif,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapExif {
    #[serde(rename = "FNumber")]
    pub f_number: Option<f64>,
    #[serde(rename = "ISO")]
    pub iso: Option<i64>,
    #[serde(rename = "FocalLength")]
    pub focal_length: Option<String>,
    #[serde(rename = "ExposureTime")]
    pub exposure_time: Option<String>,
    #[serde(rename = "LensModel")]
    pub lens_model: Option<String>,
}

/// Freshness of the cache: row counts plus the last event of each kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    #[serde(flatten)]
    pub summary: StoreSummary,
    pub last_albums_update: Option<UpdateEvent>,
    pub last_exif_update: Option<UpdateEvent>,
}

/// Every album keyed by id, with its image URLs in discovery order.
pub async fn albums_map(
    store: &dyn GalleryStore,
) -> Result<BTreeMap<String, AlbumEntry>, StoreError> {
    let albums = store.albums().await?;
    let mut urls: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for view in store.all_images(false).await? {
        urls.entry(view.image.album_id)
            .or_default()
            .push(view.image.url);
    }

    Ok(albums
        .into_iter()
        .map(|album| {
            let images = urls.remove(&album.id).unwrap_or_default();
            let entry = AlbumEntry {
                title: album.title,
                desc: album.description,
                location: album.location,
                date: album.date,
                images,
            };
            (album.id, entry)
        })
        .collect())
}

pub async fn album_detail(
    store: &dyn GalleryStore,
    id: &str,
) -> Result<Option<AlbumDetail>, StoreError> {
    let Some(found) = store.album_with_images(id).await? else {
        return Ok(None);
    };
    Ok(Some(AlbumDetail {
        id: found.album.id,
        entry: AlbumEntry {
            title: found.album.title,
            desc: found.album.description,
            location: found.album.location,
            date: found.album.date,
            images: found.images.into_iter().map(|i| i.url).collect(),
        },
    }))
}

/// EXIF keyed by image id: the modeled fields, overlaid by the raw payload.
pub async fn exif_map(store: &dyn GalleryStore) -> Result<Map<String, Value>, StoreError> {
    let mut map = Map::new();
    for view in store.all_images(true).await? {
        if let Some(exif) = view.exif {
            map.insert(view.image.id, Value::Object(exif_object(exif)));
        }
    }
    Ok(map)
}

fn exif_object(exif: ExifRecord) -> Map<String, Value> {
    let mut object = Map::new();
    object.insert("CameraModel".into(), exif.camera_model.into());
    object.insert("LensModel".into(), exif.lens_model.into());
    object.insert("FNumber".into(), exif.f_number.into());
    object.insert("ExposureTime".into(), exif.exposure_time.into());
    object.insert("ISO".into(), exif.iso.into());
    object.insert("FocalLength".into(), exif.focal_length.into());
    object.insert("Location".into(), exif.location.into());
    object.insert("DateTime".into(), exif.date_time.into());
    if let Some(Value::Object(raw)) = exif.raw {
        object.extend(raw);
    }
    object
}

/// Images whose raw EXIF carries a coordinate pair.
///
/// Coordinates are returned as stored, with no datum conversion.
pub async fn map_points(store: &dyn GalleryStore) -> Result<Vec<MapPoint>, StoreError> {
    let images = store.all_images(true).await?;
    Ok(images.into_iter().filter_map(map_point).collect())
}

fn map_point(view: ImageView) -> Option<MapPoint> {
    let exif = view.exif?;
    let (latitude, longitude) = exif
        .raw
        .as_ref()
        .and_then(Value::as_object)
        .and_then(coordinates)?;

    let image = view.image;
    Some(MapPoint {
        title: view
            .album_title
            .or(image.title)
            .unwrap_or_else(|| UNKNOWN_ALBUM.to_string()),
        location: exif
            .location
            .or(image.location)
            .or(view.album_location)
            .unwrap_or_else(|| UNKNOWN_LOCATION.to_string()),
        date: exif
            .date_time
            .or(image.date)
            .unwrap_or_else(|| UNKNOWN_DATE.to_string()),
        camera_model: exif
            .camera_model
            .unwrap_or_else(|| UNKNOWN_CAMERA.to_string()),
        exif: MapExif {
            f_number: exif.f_number,
            iso: exif.iso,
            focal_length: exif.focal_length,
            exposure_time: exif.exposure_time,
            lens_model: exif.lens_model,
        },
        latitude,
        longitude,
        id: image.id,
        url: image.url,
    })
}

/// `Latitude`/`Longitude`, else `GPSLatitude`/`GPSLongitude`.
fn coordinates(raw: &Map<String, Value>) -> Option<(f64, f64)> {
    let pair = |lat: &str, lon: &str| {
        Some((
            coordinate(raw.get(lat)?)?,
            coordinate(raw.get(lon)?)?,
        ))
    };
    pair("Latitude", "Longitude").or_else(|| pair("GPSLatitude", "GPSLongitude"))
}

fn coordinate(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

pub async fn status_report(store: &dyn GalleryStore) -> Result<StatusReport, StoreError> {
    Ok(StatusReport {
        summary: store.summary().await?,
        last_albums_update: store.last_update(UpdateKind::Albums).await?,
        last_exif_update: store.last_update(UpdateKind::Exif).await?,
    })
}

/// Write the albums and EXIF projections as pretty-printed JSON files.
pub async fn export_json(store: &dyn GalleryStore, config: &ExportConfig) -> anyhow::Result<()> {
    let albums = albums_map(store).await?;
    write_json(&config.albums_json_path, &albums).await?;
    tracing::info!(
        path = %config.albums_json_path.display(),
        albums = albums.len(),
        "Exported albums"
    );

    let exif = exif_map(store).await?;
    write_json(&config.exif_json_path, &exif).await?;
    tracing::info!(
        path = %config.exif_json_path.display(),
        images = exif.len(),
        "Exported EXIF data"
    );
    Ok(())
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let body = serde_json::to_vec_pretty(value)?;
    // Rename over the target so readers never see a partial file.
    let tmp = path.with_extension("json.part");
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
