//! In-memory [`ObjectStore`] for tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{ListPage, ListRequest, ObjectEntry, ObjectStore, StorageError};

/// Objects held in key order, paged like the real listing API.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: BTreeMap<String, Vec<u8>>,
    page_size: Option<u32>,
    /// Remaining injected failures per key for `get`.
    failures: Mutex<HashMap<String, u32>>,
    list_calls: AtomicU32,
    get_calls: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(mut self, key: &str, content: impl Into<Vec<u8>>) -> Self {
        self.objects.insert(key.to_string(), content.into());
        self
    }

    /// Cap every listing page at `size` objects regardless of the request.
    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Make the next `times` fetches of `key` fail with a 503.
    pub fn failing(self, key: &str, times: u32) -> Self {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(key.to_string(), times);
        }
        self
    }

    pub fn list_calls(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> u32 {
        self.get_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list(&self, request: &ListRequest) -> Result<ListPage, StorageError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let limit = self
            .page_size
            .map_or(request.max_keys, |size| size.min(request.max_keys))
            .max(1) as usize;

        let mut matching = self
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(&request.prefix))
            .filter(|(key, _)| {
                request
                    .marker
                    .as_deref()
                    .map_or(true, |marker| key.as_str() > marker)
            });

        let objects: Vec<ObjectEntry> = matching
            .by_ref()
            .take(limit)
            .map(|(key, content)| ObjectEntry {
                key: key.clone(),
                size: content.len() as u64,
                last_modified: None,
            })
            .collect();
        let is_truncated = matching.next().is_some();

        Ok(ListPage {
            next_marker: if is_truncated {
                objects.last().map(|o| o.key.clone())
            } else {
                None
            },
            objects,
            is_truncated,
        })
    }

    async fn get(&self, key: &str, _timeout: Duration) -> Result<Vec<u8>, StorageError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self
                .failures
                .lock()
                .map_err(|e| StorageError::Config(e.to_string()))?;
            if let Some(remaining) = failures.get_mut(key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(StorageError::HttpStatus {
                        status: 503,
                        key: key.to_string(),
                    });
                }
            }
        }
        self.objects
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}
