//! Structured results of sync operations.
//!
//! Every phase of a sync ends in an [`OperationReport`]; failures below the
//! phase boundary are logged and translated, never propagated as errors.

use serde::Serialize;

use crate::types::SyncStatus;

/// Outcome of one data domain (albums or EXIF).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationReport {
    pub success: bool,
    pub status: SyncStatus,
    pub message: String,
    pub processed: u64,
    pub skipped: u64,
}

impl OperationReport {
    pub fn new(status: SyncStatus, message: impl Into<String>) -> Self {
        Self {
            success: status.is_usable(),
            status,
            message: message.into(),
            processed: 0,
            skipped: 0,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(SyncStatus::Error, message)
    }

    pub fn with_counts(mut self, processed: u64, skipped: u64) -> Self {
        self.processed = processed;
        self.skipped = skipped;
        self
    }
}

/// Composite result of a full sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub success: bool,
    pub status: SyncStatus,
    pub message: String,
    #[serde(rename = "albumsResult")]
    pub albums: OperationReport,
    #[serde(rename = "exifResult")]
    pub exif: OperationReport,
}

impl SyncOutcome {
    pub fn from_reports(albums: OperationReport, exif: OperationReport) -> Self {
        let (status, message) = compose(&albums, &exif);
        Self {
            success: status.is_usable(),
            status,
            message,
            albums,
            exif,
        }
    }
}

/// Combine the two domain outcomes.
///
/// Albums failing is fatal. EXIF failing or warning only degrades the run,
/// since the gallery is usable without metadata.
pub fn compose(albums: &OperationReport, exif: &OperationReport) -> (SyncStatus, String) {
    if albums.status == SyncStatus::Error {
        return (
            SyncStatus::Error,
            format!(
                "Update failed: albums={}, exif={}",
                albums.message, exif.message
            ),
        );
    }

    let albums_warned = albums.status != SyncStatus::Success;
    match exif.status {
        SyncStatus::Success if albums_warned => (
            SyncStatus::Success,
            format!("All data updated (with warnings): {}", albums.message),
        ),
        SyncStatus::Success => (SyncStatus::Success, "All data updated".to_string()),
        SyncStatus::Warning | SyncStatus::PartialSuccess => (
            SyncStatus::PartialSuccess,
            format!("Albums updated, EXIF update incomplete: {}", exif.message),
        ),
        SyncStatus::Error => (
            SyncStatus::PartialSuccess,
            format!("Albums updated, but EXIF update failed: {}", exif.message),
        ),
    }
}
