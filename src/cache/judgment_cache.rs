use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};

use crate::oracle::PromptKind;

/// Thread-safe LRU cache for oracle replies
///
/// Keyed by prompt kind and exact payload, so a repeated judgment within or
/// across sessions does not hit the remote model again.
pub struct JudgmentCache {
    cache: Mutex<LruCache<String, String>>,
}

impl JudgmentCache {
    /// Create a new judgment cache holding at most `capacity` replies (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);

        Self {
            cache: Mutex::new(LruCache::new(cap)),
        }
    }

    fn key(kind: PromptKind, payload: &str) -> String {
        format!("{}\u{1f}{}", kind.as_str(), payload)
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, String>> {
        // A poisoned cache only loses recency bookkeeping; keep serving it.
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cached reply for this judgment, if any
    pub fn get(&self, kind: PromptKind, payload: &str) -> Option<String> {
        self.lock().get(&Self::key(kind, payload)).cloned()
    }

    /// Store a reply
    pub fn put(&self, kind: PromptKind, payload: &str, reply: String) {
        self.lock().put(Self::key(kind, payload), reply);
    }

    /// Get the current number of cached entries
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Clear all entries from the cache
    pub fn clear(&self) {
        self.lock().clear();
    }
}
