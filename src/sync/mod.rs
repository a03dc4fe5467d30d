//! Sync orchestration: one run discovers albums, then fetches EXIF data,
//! and reports a composite status.
//!
//! Each phase ends in an [`OperationReport`]. Lower-level errors never escape
//! a phase; they are logged and turned into an `error` report. The albums
//! phase is fatal to the run, the EXIF phase only degrades it.

pub mod report;

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::SyncConfig;
use crate::discovery;
use crate::reconcile;
use crate::retry::retry_until;
use crate::storage::ObjectStore;
use crate::store::GalleryStore;
use crate::types::{SyncStatus, UpdateKind};

pub use report::{OperationReport, SyncOutcome};

/// Runs sync passes against one store and one bucket.
#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<dyn GalleryStore>,
    objects: Arc<dyn ObjectStore>,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn GalleryStore>,
        objects: Arc<dyn ObjectStore>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            objects,
            config,
        }
    }

    /// Run a full sync and record one update event per domain.
    pub async fn run(&self) -> SyncOutcome {
        let started = Instant::now();
        tracing::info!(prefix = %self.config.gallery_prefix, "Starting sync");

        let albums = self.sync_albums().await;
        self.record(UpdateKind::Albums, &albums).await;

        let exif = self.sync_exif().await;
        self.record(UpdateKind::Exif, &exif).await;

        let outcome = SyncOutcome::from_reports(albums, exif);
        tracing::info!("── Sync Summary ──");
        tracing::info!(
            "  albums: {} ({} processed, {} skipped)",
            outcome.albums.status,
            outcome.albums.processed,
            outcome.albums.skipped
        );
        tracing::info!(
            "  exif: {} ({} processed, {} skipped)",
            outcome.exif.status,
            outcome.exif.processed,
            outcome.exif.skipped
        );
        tracing::info!("  elapsed: {}", format_duration(started.elapsed()));
        if outcome.status == SyncStatus::Error {
            tracing::error!(status = %outcome.status, "{}", outcome.message);
        } else {
            tracing::info!(status = %outcome.status, "{}", outcome.message);
        }
        outcome
    }

    /// Discover albums in the bucket and upsert them.
    pub async fn sync_albums(&self) -> OperationReport {
        let discovery =
            match discovery::discover(self.objects.as_ref(), &self.config).await {
                Ok(discovery) => discovery,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to list gallery objects");
                    return OperationReport::error(format!(
                        "Failed to list gallery objects: {e}"
                    ));
                }
            };

        let albums = match reconcile::albums_from_discovery(&discovery, &self.config) {
            Ok(albums) => albums,
            Err(e) => {
                tracing::error!(error = %e, "Album reconciliation failed");
                return OperationReport::error(e.to_string());
            }
        };

        let summary = match self.store.save_albums(&albums).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!(error = %e, "Failed to save albums");
                return OperationReport::error(e.to_string());
            }
        };

        let failed = discovery.failed_manifests.len() as u64;
        let skipped = summary.skipped_images + failed;
        let mut message = format!(
            "Albums updated: {} albums, {} images",
            summary.albums, summary.images
        );
        if failed > 0 {
            message.push_str(&format!(", {failed} manifests unreadable"));
        }
        if summary.skipped_images > 0 {
            message.push_str(&format!(", {} images skipped", summary.skipped_images));
        }
        let status = if skipped > 0 {
            SyncStatus::Warning
        } else {
            SyncStatus::Success
        };
        OperationReport::new(status, message).with_counts(summary.albums, skipped)
    }

    /// Fetch and store EXIF data, retrying until a usable outcome.
    pub async fn sync_exif(&self) -> OperationReport {
        retry_until(
            &self.config.exif_retry,
            |report: &OperationReport| report.status.is_usable(),
            |attempt| {
                tracing::info!(
                    attempt,
                    key = %self.config.exif_key,
                    "Fetching EXIF data"
                );
                self.sync_exif_once()
            },
        )
        .await
    }

    async fn sync_exif_once(&self) -> OperationReport {
        let bytes = match self
            .objects
            .get(&self.config.exif_key, self.config.request_timeout)
            .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch EXIF data");
                return OperationReport::error(format!("Failed to fetch EXIF data: {e}"));
            }
        };

        let document = match reconcile::parse_exif_document(&bytes) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read EXIF data");
                return OperationReport::error(e.to_string());
            }
        };

        let summary = match self.store.save_exif_data(&document.entries).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to save EXIF data");
                return OperationReport::error(format!("Failed to save EXIF data: {e}"));
            }
        };

        let mut message = summary.message();
        if document.rejected > 0 {
            message.push_str(&format!(", {} malformed entries rejected", document.rejected));
        }
        OperationReport::new(summary.status(), message)
            .with_counts(summary.processed, summary.skipped + document.rejected)
    }

    /// Append a domain's outcome to the update log.
    ///
    /// A failed write is logged; it does not change the run's outcome.
    async fn record(&self, kind: UpdateKind, report: &OperationReport) {
        if let Err(e) = self
            .store
            .log_update(kind, report.status, Some(&report.message), None)
            .await
        {
            tracing::error!(kind = kind.as_str(), error = %e, "Failed to record update event");
        }
    }
}

fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let mins = total_secs / 60;
    let secs = total_secs % 60;
    if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}.{:03}s", secs, d.subsec_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;
    use crate::store::{SqliteGalleryStore, MAX_STAR};

    const EXIF_KEY: &str = "gallery/exif_data.json";

    fn tokyo_bucket() -> MemoryStore {
        MemoryStore::new()
            .with_object("gallery/tokyo/album.yaml", "title: Tokyo Trip\nlocation: Tokyo\n")
            .with_object("gallery/tokyo/a.webp", "x")
            .with_object("gallery/tokyo/b.webp", "x")
            .with_object(
                EXIF_KEY,
                r#"{
                    "tokyo/a.JPG": {"CameraModel": "X100V", "FNumber": 2.0, "ISO": 200},
                    "osaka/z.jpg": {"CameraModel": "X100V"}
                }"#,
            )
    }

    fn engine(
        store: &Arc<SqliteGalleryStore>,
        objects: MemoryStore,
    ) -> (SyncEngine, Arc<MemoryStore>) {
        let objects = Arc::new(objects);
        let engine = SyncEngine::new(store.clone(), objects.clone(), SyncConfig::for_tests());
        (engine, objects)
    }

    fn memory_store() -> Arc<SqliteGalleryStore> {
        Arc::new(SqliteGalleryStore::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_end_to_end_tokyo() {
        let store = memory_store();
        let (engine, _) = engine(&store, tokyo_bucket());

        let outcome = engine.run().await;
        assert_eq!(outcome.status, SyncStatus::Success, "{}", outcome.message);
        assert_eq!(outcome.message, "All data updated");
        assert_eq!(outcome.exif.processed, 1);
        assert_eq!(outcome.exif.skipped, 1);

        let summary = store.summary().await.unwrap();
        assert_eq!(summary.albums, 1);
        assert_eq!(summary.images, 2);
        assert_eq!(summary.exif_records, 1);

        let tokyo = store.album_with_images("tokyo").await.unwrap().unwrap();
        assert_eq!(tokyo.album.title.as_deref(), Some("Tokyo Trip"));
        assert!(tokyo.images.iter().all(|i| i.star == 0 && i.likes == 0));

        // Exactly one event per domain: ids are assigned in write order.
        let albums_event = store.last_update(UpdateKind::Albums).await.unwrap().unwrap();
        let exif_event = store.last_update(UpdateKind::Exif).await.unwrap().unwrap();
        assert_eq!((albums_event.id, albums_event.status.as_str()), (1, "success"));
        assert_eq!((exif_event.id, exif_event.status.as_str()), (2, "success"));
    }

    #[tokio::test]
    async fn test_reserved_url_characters_keep_images_distinct() {
        let store = memory_store();
        let objects = MemoryStore::new()
            .with_object("gallery/tokyo/a#1.webp", "x")
            .with_object("gallery/tokyo/a#2.webp", "x")
            .with_object("gallery/tokyo/b?.webp", "x")
            .with_object(EXIF_KEY, r#"{"tokyo/a#2.jpg": {"CameraModel": "X100V"}}"#);
        let (engine, _) = engine(&store, objects);

        let outcome = engine.run().await;
        assert_eq!(outcome.status, SyncStatus::Success, "{}", outcome.message);

        let tokyo = store.album_with_images("tokyo").await.unwrap().unwrap();
        let mut ids: Vec<_> = tokyo.images.iter().map(|i| i.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, ["tokyo/a#1.webp", "tokyo/a#2.webp", "tokyo/b?.webp"]);
        assert!(tokyo
            .images
            .iter()
            .any(|i| i.url == "https://portfolio.oss.example.com/gallery/tokyo/a%232.webp"));
        assert_eq!(outcome.exif.processed, 1);
    }

    #[tokio::test]
    async fn test_zero_albums_is_error() {
        let store = memory_store();
        let (engine, _) = engine(&store, MemoryStore::new().with_object(EXIF_KEY, "{}"));

        let outcome = engine.run().await;
        assert_eq!(outcome.status, SyncStatus::Error);
        assert!(!outcome.success);
        assert!(outcome.albums.message.contains("No albums"));
        // EXIF still runs and is logged.
        assert_eq!(outcome.exif.status, SyncStatus::Warning);

        let event = store.last_update(UpdateKind::Albums).await.unwrap().unwrap();
        assert_eq!(event.status, "error");
        assert!(store.last_update(UpdateKind::Exif).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_exif_retried_until_success() {
        let store = memory_store();
        let (engine, objects) = engine(&store, tokyo_bucket().failing(EXIF_KEY, 2));

        let outcome = engine.run().await;
        assert_eq!(outcome.status, SyncStatus::Success);
        assert_eq!(outcome.exif.processed, 1);
        // One manifest fetch plus three EXIF attempts.
        assert_eq!(objects.get_calls(), 4);

        let event = store.last_update(UpdateKind::Exif).await.unwrap().unwrap();
        assert_eq!(event.id, 2);
    }

    #[tokio::test]
    async fn test_exif_exhausted_is_partial_success() {
        let store = memory_store();
        let (engine, objects) = engine(&store, tokyo_bucket().failing(EXIF_KEY, 5));

        let outcome = engine.run().await;
        assert_eq!(outcome.status, SyncStatus::PartialSuccess);
        assert!(outcome.success);
        assert_eq!(outcome.exif.status, SyncStatus::Error);
        assert!(outcome.message.contains("EXIF update failed"));
        assert_eq!(objects.get_calls(), 4);

        let event = store.last_update(UpdateKind::Exif).await.unwrap().unwrap();
        assert_eq!(event.status, "error");
        assert!(event.message.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_missing_exif_document_is_retried_then_fails() {
        let store = memory_store();
        let objects = MemoryStore::new().with_object("gallery/tokyo/a.webp", "x");
        let (engine, objects) = engine(&store, objects);

        let outcome = engine.run().await;
        assert_eq!(outcome.albums.status, SyncStatus::Success);
        assert_eq!(outcome.status, SyncStatus::PartialSuccess);
        assert_eq!(objects.get_calls(), 3);
    }

    #[tokio::test]
    async fn test_empty_exif_is_partial_success() {
        let store = memory_store();
        let objects = MemoryStore::new()
            .with_object("gallery/tokyo/a.webp", "x")
            .with_object(EXIF_KEY, "{}");
        let (engine, objects) = engine(&store, objects);

        let outcome = engine.run().await;
        assert_eq!(outcome.exif.status, SyncStatus::Warning);
        assert_eq!(outcome.status, SyncStatus::PartialSuccess);
        // A warning stops the retry loop.
        assert_eq!(objects.get_calls(), 1);
    }

    #[tokio::test]
    async fn test_broken_manifest_degrades_albums() {
        let store = memory_store();
        let objects = tokyo_bucket()
            .with_object("gallery/paris/album.yaml", "title: [unclosed")
            .with_object("gallery/paris/p.webp", "x");
        let (engine, _) = engine(&store, objects);

        let outcome = engine.sync_albums().await;
        assert_eq!(outcome.status, SyncStatus::Warning);
        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.skipped, 1);
        assert!(store.album_with_images("paris").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_resync_preserves_curation() {
        let store = memory_store();
        let (engine, _) = engine(&store, tokyo_bucket());
        engine.run().await;

        assert!(store.update_image_star("tokyo/a.webp", MAX_STAR - 1).await.unwrap());
        assert!(store.update_image_likes("tokyo/a.webp", 10).await.unwrap());

        let outcome = engine.run().await;
        assert_eq!(outcome.status, SyncStatus::Success);

        let tokyo = store.album_with_images("tokyo").await.unwrap().unwrap();
        let a = tokyo.images.iter().find(|i| i.id == "tokyo/a.webp").unwrap();
        assert_eq!((a.star, a.likes), (4, 10));
        assert_eq!(store.summary().await.unwrap().images, 2);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.500s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 05s");
    }
}
