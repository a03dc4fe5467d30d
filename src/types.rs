use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Outcome taxonomy shared by every sync operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    /// Completed, but the result is degraded or empty.
    Warning,
    /// One of two sub-domains failed while the other succeeded.
    PartialSuccess,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Warning => "warning",
            Self::PartialSuccess => "partial_success",
            Self::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "warning" => Some(Self::Warning),
            "partial_success" => Some(Self::PartialSuccess),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Whether the gallery is usable after an operation with this status.
    pub fn is_usable(&self) -> bool {
        !matches!(self, Self::Error)
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status code stored alongside every update event.
///
/// Same domain as [`SyncStatus`] plus `info` for legacy rows whose status
/// is outside the taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    Success,
    Warning,
    PartialSuccess,
    Error,
    Info,
}

impl StatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Warning => "warning",
            Self::PartialSuccess => "partial_success",
            Self::Error => "error",
            Self::Info => "info",
        }
    }

    /// Map a raw `status` column value onto a status code.
    pub fn from_status_str(s: &str) -> Self {
        SyncStatus::from_str(s).map_or(Self::Info, Self::from)
    }
}

impl From<SyncStatus> for StatusCode {
    fn from(status: SyncStatus) -> Self {
        match status {
            SyncStatus::Success => Self::Success,
            SyncStatus::Warning => Self::Warning,
            SyncStatus::PartialSuccess => Self::PartialSuccess,
            SyncStatus::Error => Self::Error,
        }
    }
}

/// Data domain an update event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Albums,
    Exif,
}

impl UpdateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Albums => "albums",
            Self::Exif => "exif",
        }
    }
}
