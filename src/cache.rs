use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug)]
pub struct DecodeCache<V> {
    entries: LruCache<PathBuf, V>,
}

impl<V: Clone> DecodeCache<V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    pub fn get(&mut self, key: &Path) -> Option<V> {
        self.entries.get(key).cloned()
    }

    pub fn set(&mut self, key: PathBuf, value: V) -> Option<PathBuf> {
        let refreshed = self.entries.contains(&key);
        let (evicted, _) = self.entries.push(key, value).filter(|_| !refreshed)?;
        tracing::trace!(path = %evicted.display(), "dropped cache entry");
        Some(evicted)
    }

    pub fn remove(&mut self, key: &Path) -> Option<V> {
        self.entries.pop(key)
    }

    pub fn contains(&self, key: &Path) -> bool {
        self.entries.contains(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }
}

impl<V: Clone> Default for DecodeCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
