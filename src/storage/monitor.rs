//! Read-only management view over the live statement cache

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::cache::{CachedStatementStats, StatementCache};

/// Slot holding the cache of the current connection; replaced on reconnect
pub(crate) type CacheSlot = Arc<RwLock<Arc<StatementCache>>>;

pub(crate) fn current(slot: &CacheSlot) -> Arc<StatementCache> {
    Arc::clone(&slot.read().unwrap_or_else(PoisonError::into_inner))
}

/// Monitor handle, cheap to clone and safe to move to another thread
#[derive(Clone)]
pub struct StatementCacheMonitor {
    slot: CacheSlot,
}

impl StatementCacheMonitor {
    pub(crate) fn new(slot: CacheSlot) -> Self {
        Self { slot }
    }

    /// Per-statement usage, keyed by SQL text
    pub fn statistics(&self) -> HashMap<String, CachedStatementStats> {
        current(&self.slot).statement_stats()
    }

    pub fn cached_statement_count(&self) -> usize {
        current(&self.slot).len()
    }

    pub fn is_cache_enabled(&self) -> bool {
        current(&self.slot).is_enabled()
    }

    /// Toggle caching; compiled statements are flushed on the connection's next use
    pub fn set_cache_enabled(&self, enabled: bool) {
        current(&self.slot).set_enabled(enabled);
    }
}
