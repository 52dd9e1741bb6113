use super::replacer::Replacer;
use crate::storage::page::PageId;
use std::collections::HashMap;

/// Evicts the page whose last access is oldest.
#[derive(Debug, Default)]
pub struct LruReplacer {
    /// Logical clock; bumped on every access so stamps are unique and ordered.
    clock: u64,
    last_access: HashMap<PageId, u64>,
}

impl LruReplacer {
    pub fn new(capacity: usize) -> Self {
        Self {
            clock: 0,
            last_access: HashMap::with_capacity(capacity),
        }
    }
}

impl Replacer for LruReplacer {
    fn record_access(&mut self, page_id: PageId) {
        self.clock += 1;
        self.last_access.insert(page_id, self.clock);
    }

    fn evict(&mut self, evictable: &dyn Fn(&PageId) -> bool) -> Option<PageId> {
        let victim = self
            .last_access
            .iter()
            .filter(|(page_id, _)| evictable(page_id))
            .min_by_key(|(_, stamp)| **stamp)
            .map(|(page_id, _)| *page_id)?;
        self.last_access.remove(&victim);
        Some(victim)
    }

    fn remove(&mut self, page_id: PageId) {
        self.last_access.remove(&page_id);
    }

    fn size(&self) -> usize {
        self.last_access.len()
    }
}
