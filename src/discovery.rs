//! Manifest and asset discovery.
//!
//! Walks every object under the gallery prefix, groups image assets and YAML
//! manifests by album folder (`{prefix}{album_id}/...`), and parses each
//! manifest into an untyped mapping. Typing happens in [`crate::reconcile`].

use std::collections::BTreeMap;

use serde_yaml::{Mapping, Value};

use crate::config::SyncConfig;
use crate::storage::{ListRequest, ObjectEntry, ObjectStore, StorageError};

const IMAGE_EXTENSIONS: [&str; 4] = ["webp", "jpg", "jpeg", "png"];
const MANIFEST_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// What an object key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Image,
    Manifest,
    Other,
}

/// Classify a key by its extension, case-insensitively.
pub fn classify_key(key: &str) -> ObjectKind {
    let Some((_, ext)) = key.rsplit_once('.') else {
        return ObjectKind::Other;
    };
    if ext.contains('/') {
        return ObjectKind::Other;
    }
    if IMAGE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)) {
        ObjectKind::Image
    } else if MANIFEST_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)) {
        ObjectKind::Manifest
    } else {
        ObjectKind::Other
    }
}

/// Album folder for a key: the first path segment below `prefix`.
///
/// Returns `None` for keys outside the prefix and for files placed directly
/// in the prefix with no album folder.
pub fn album_id_for_key<'a>(prefix: &str, key: &'a str) -> Option<&'a str> {
    let rest = key.strip_prefix(prefix)?;
    let (album_id, file) = rest.split_once('/')?;
    if album_id.is_empty() || file.is_empty() {
        return None;
    }
    Some(album_id)
}

/// Everything discovered for one album folder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawAlbum {
    /// Manifest fields, merged key by key across the folder's manifests.
    pub manifest: Mapping,
    /// Public URLs of image assets in storage order.
    pub images: Vec<String>,
    /// Folder key prefix (`{prefix}{album_id}/`), used to resolve relative
    /// image entries in a manifest.
    pub folder: String,
}

#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub albums: BTreeMap<String, RawAlbum>,
    pub objects_listed: usize,
    /// Manifest keys that could not be fetched or parsed.
    pub failed_manifests: Vec<String>,
}

/// List every object under `prefix`, following the listing cursor.
pub async fn list_all(
    store: &dyn ObjectStore,
    prefix: &str,
) -> Result<Vec<ObjectEntry>, StorageError> {
    let mut request = ListRequest::new(prefix);
    let mut objects = Vec::new();
    let mut pages = 0u32;

    loop {
        let page = store.list(&request).await?;
        pages += 1;
        objects.extend(page.objects);

        if !page.is_truncated {
            break;
        }
        match page.next_marker {
            Some(marker) if request.marker.as_deref() != Some(marker.as_str()) => {
                request.marker = Some(marker);
            }
            _ => {
                tracing::warn!(
                    prefix = %prefix,
                    pages,
                    "Listing reported more results without a new marker, stopping"
                );
                break;
            }
        }
    }

    tracing::debug!(prefix = %prefix, pages, objects = objects.len(), "Listed objects");
    Ok(objects)
}

/// Discover albums under the configured gallery prefix.
///
/// A listing failure is returned as an error. A manifest that cannot be
/// fetched or parsed is logged, recorded in
/// [`Discovery::failed_manifests`], and skipped.
pub async fn discover(
    store: &dyn ObjectStore,
    config: &SyncConfig,
) -> Result<Discovery, StorageError> {
    let prefix = config.gallery_prefix.as_str();
    let objects = list_all(store, prefix).await?;
    let mut discovery = Discovery {
        objects_listed: objects.len(),
        ..Default::default()
    };

    for object in &objects {
        let key = object.key.as_str();
        let kind = classify_key(key);
        if kind == ObjectKind::Other {
            continue;
        }
        let Some(album_id) = album_id_for_key(prefix, key) else {
            tracing::debug!(key = %key, "Skipping object outside an album folder");
            continue;
        };

        let album = discovery
            .albums
            .entry(album_id.to_string())
            .or_insert_with(|| RawAlbum {
                folder: format!("{prefix}{album_id}/"),
                ..Default::default()
            });

        match kind {
            ObjectKind::Image => {
                tracing::debug!(
                    album = %album_id,
                    key = %key,
                    size = object.size,
                    last_modified = object.last_modified.as_deref().unwrap_or("unknown"),
                    "Discovered image"
                );
                album.images.push(config.public_url(key));
            }
            ObjectKind::Manifest => match fetch_manifest(store, key, config).await {
                Ok(fields) => {
                    tracing::debug!(album = %album_id, key = %key, fields = fields.len(), "Parsed album manifest");
                    for (field, value) in fields {
                        album.manifest.insert(field, value);
                    }
                }
                Err(e) => {
                    tracing::warn!(album = %album_id, key = %key, error = %e, "Skipping unreadable album manifest");
                    discovery.failed_manifests.push(key.to_string());
                }
            },
            ObjectKind::Other => {}
        }
    }

    tracing::info!(
        albums = discovery.albums.len(),
        objects = discovery.objects_listed,
        failed_manifests = discovery.failed_manifests.len(),
        "Discovery finished"
    );
    Ok(discovery)
}

async fn fetch_manifest(
    store: &dyn ObjectStore,
    key: &str,
    config: &SyncConfig,
) -> anyhow::Result<Mapping> {
    let bytes = store.get(key, config.request_timeout).await?;
    parse_manifest(&bytes)
}

/// Parse a manifest body. An empty document yields an empty mapping.
pub fn parse_manifest(bytes: &[u8]) -> anyhow::Result<Mapping> {
    match serde_yaml::from_slice::<Value>(bytes)? {
        Value::Mapping(mapping) => Ok(mapping),
        Value::Null => Ok(Mapping::new()),
        other => anyhow::bail!("manifest is not a mapping: {}", yaml_type_name(&other)),
    }
}

pub(crate) fn yaml_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;

    fn sync_config() -> SyncConfig {
        SyncConfig::for_tests()
    }

    #[test]
    fn test_classify_key() {
        assert_eq!(classify_key("gallery/tokyo/a.webp"), ObjectKind::Image);
        assert_eq!(classify_key("gallery/tokyo/B.JPG"), ObjectKind::Image);
        assert_eq!(classify_key("gallery/tokyo/c.Jpeg"), ObjectKind::Image);
        assert_eq!(classify_key("gallery/tokyo/d.PNG"), ObjectKind::Image);
        assert_eq!(classify_key("gallery/tokyo/album.yaml"), ObjectKind::Manifest);
        assert_eq!(classify_key("gallery/tokyo/info.YML"), ObjectKind::Manifest);
        assert_eq!(classify_key("gallery/exif_data.json"), ObjectKind::Other);
        assert_eq!(classify_key("gallery/v1.2/README"), ObjectKind::Other);
        assert_eq!(classify_key("gallery/tokyo/"), ObjectKind::Other);
    }

    #[test]
    fn test_album_id_for_key() {
        assert_eq!(album_id_for_key("gallery/", "gallery/tokyo/a.webp"), Some("tokyo"));
        assert_eq!(
            album_id_for_key("gallery/", "gallery/tokyo/raw/a.webp"),
            Some("tokyo")
        );
        assert_eq!(album_id_for_key("gallery/", "gallery/cover.webp"), None);
        assert_eq!(album_id_for_key("gallery/", "other/tokyo/a.webp"), None);
        assert_eq!(album_id_for_key("", "tokyo/a.webp"), Some("tokyo"));
        assert_eq!(album_id_for_key("", "exif_data.json"), None);
    }

    #[test]
    fn test_parse_manifest() {
        let fields = parse_manifest(b"title: Tokyo Trip\ndesc: Spring\n").unwrap();
        assert_eq!(fields.get("title"), Some(&Value::from("Tokyo Trip")));
        assert!(parse_manifest(b"").unwrap().is_empty());
        assert!(parse_manifest(b"- a\n- b\n").is_err());
        assert!(parse_manifest(b"title: [unclosed").is_err());
    }

    #[tokio::test]
    async fn test_list_all_follows_marker() {
        let store = MemoryStore::new()
            .with_object("gallery/a/1.webp", "x")
            .with_object("gallery/a/2.webp", "x")
            .with_object("gallery/b/3.webp", "x")
            .with_object("other/c/4.webp", "x")
            .with_page_size(2);

        let objects = list_all(&store, "gallery/").await.unwrap();
        let keys: Vec<_> = objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["gallery/a/1.webp", "gallery/a/2.webp", "gallery/b/3.webp"]);
        assert_eq!(store.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_discover_groups_images_and_manifests() {
        let store = MemoryStore::new()
            .with_object("gallery/exif_data.json", "{}")
            .with_object("gallery/tokyo/a.webp", "x")
            .with_object("gallery/tokyo/album.yaml", "title: Tokyo Trip\nlocation: Tokyo\n")
            .with_object("gallery/tokyo/b.webp", "x")
            .with_object("gallery/tokyo/notes.txt", "x")
            .with_object("gallery/kyoto/info.yml", "title: Kyoto\n")
            .with_page_size(2);

        let discovery = discover(&store, &sync_config()).await.unwrap();
        assert_eq!(discovery.objects_listed, 6);
        assert!(discovery.failed_manifests.is_empty());

        let tokyo = &discovery.albums["tokyo"];
        assert_eq!(
            tokyo.images,
            [
                "https://portfolio.oss.example.com/gallery/tokyo/a.webp",
                "https://portfolio.oss.example.com/gallery/tokyo/b.webp",
            ]
        );
        assert_eq!(tokyo.manifest.get("title"), Some(&Value::from("Tokyo Trip")));
        assert_eq!(tokyo.folder, "gallery/tokyo/");

        // Manifest-only albums are kept as sparse entries.
        let kyoto = &discovery.albums["kyoto"];
        assert!(kyoto.images.is_empty());
        assert_eq!(kyoto.manifest.get("title"), Some(&Value::from("Kyoto")));
    }

    #[tokio::test]
    async fn test_discover_skips_broken_manifest() {
        let store = MemoryStore::new()
            .with_object("gallery/paris/album.yaml", "title: [unclosed")
            .with_object("gallery/paris/a.webp", "x")
            .with_object("gallery/rome/album.yaml", "title: Rome\n");

        let discovery = discover(&store, &sync_config()).await.unwrap();
        assert_eq!(discovery.failed_manifests, ["gallery/paris/album.yaml"]);
        assert_eq!(discovery.albums.len(), 2);
        assert!(discovery.albums["paris"].manifest.is_empty());
        assert_eq!(discovery.albums["paris"].images.len(), 1);
    }

    #[tokio::test]
    async fn test_discover_albums_at_bucket_root() {
        let store = MemoryStore::new()
            .with_object("exif_data.json", "{}")
            .with_object("cover.webp", "x")
            .with_object("tokyo/a.webp", "x")
            .with_object("tokyo/album.yaml", "title: Tokyo Trip\n");
        let config = SyncConfig {
            gallery_prefix: String::new(),
            ..sync_config()
        };

        let discovery = discover(&store, &config).await.unwrap();
        assert_eq!(discovery.albums.len(), 1);
        let tokyo = &discovery.albums["tokyo"];
        assert_eq!(tokyo.folder, "tokyo/");
        assert_eq!(tokyo.images, ["https://portfolio.oss.example.com/tokyo/a.webp"]);
        assert_eq!(tokyo.manifest.get("title"), Some(&Value::from("Tokyo Trip")));
    }

    #[tokio::test]
    async fn test_discover_empty_bucket() {
        let store = MemoryStore::new();
        let discovery = discover(&store, &sync_config()).await.unwrap();
        assert!(discovery.albums.is_empty());
        assert_eq!(discovery.objects_listed, 0);
    }
}
