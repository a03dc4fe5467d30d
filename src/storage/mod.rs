//! Object storage collaborator.
//!
//! Discovery depends only on two read operations, listing a prefix page by
//! page and fetching one object, expressed by [`ObjectStore`].

pub mod error;
pub mod listing;
#[cfg(test)]
pub mod memory;
pub mod oss;

use std::time::Duration;

use async_trait::async_trait;

pub use error::StorageError;
pub use oss::OssClient;

/// Largest page the listing API accepts without negotiation.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// One object in a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    pub prefix: String,
    /// Resume after this key; `None` starts at the beginning.
    pub marker: Option<String>,
    pub max_keys: u32,
}

impl ListRequest {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            marker: None,
            max_keys: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Objects in storage order.
    pub objects: Vec<ObjectEntry>,
    pub next_marker: Option<String>,
    pub is_truncated: bool,
}

/// Read access to a remote bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list(&self, request: &ListRequest) -> Result<ListPage, StorageError>;

    /// Fetch an object's full content within `timeout`.
    async fn get(&self, key: &str, timeout: Duration) -> Result<Vec<u8>, StorageError>;
}
