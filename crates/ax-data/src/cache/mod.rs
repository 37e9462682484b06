//! Source byte caching

use std::sync::Arc;
use parking_lot::Mutex;
use ahash::AHashMap;

use crate::sources::SourceLocator;

struct CacheInner {
    files: AHashMap<SourceLocator, Arc<Vec<u8>>>,
    /// Least recently used first
    access_order: Vec<SourceLocator>,
}

/// LRU cache of downloaded source files.
///
/// Only avoids re-downloading; files are still re-registered with the engine
/// on every query.
pub struct SourceCache {
    inner: Mutex<CacheInner>,
    /// Maximum number of files to keep
    max_entries: usize,
}

impl SourceCache {
    /// Create a new cache holding at most `max_entries` files
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                files: AHashMap::new(),
                access_order: Vec::new(),
            }),
            max_entries: max_entries.max(1),
        }
    }

    /// Get a file from cache
    pub fn get(&self, locator: &SourceLocator) -> Option<Arc<Vec<u8>>> {
        let mut inner = self.inner.lock();
        let bytes = inner.files.get(locator).cloned()?;
        Self::touch(&mut inner.access_order, locator);
        Some(bytes)
    }

    /// Put a file in cache, evicting the least recently used one at capacity
    pub fn put(&self, locator: SourceLocator, bytes: Arc<Vec<u8>>) {
        let mut inner = self.inner.lock();

        if !inner.files.contains_key(&locator) && inner.files.len() >= self.max_entries {
            if !inner.access_order.is_empty() {
                let evicted = inner.access_order.remove(0);
                inner.files.remove(&evicted);
                tracing::debug!("Evicted {} from source cache", evicted);
            }
        }

        inner.files.insert(locator.clone(), bytes);
        Self::touch(&mut inner.access_order, &locator);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear the cache
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.files.clear();
        inner.access_order.clear();
    }

    fn touch(order: &mut Vec<SourceLocator>, locator: &SourceLocator) {
        order.retain(|l| l != locator);
        order.push(locator.clone());
    }
}
