use crate::storage::page::PageId;
use std::fmt::Debug;

/// Victim selection policy for the buffer pool.
pub trait Replacer: Send + Sync + Debug {
    /// Note that `page_id` was just loaded or touched.
    fn record_access(&mut self, page_id: PageId);

    /// Choose a page to evict among those for which `evictable` holds, and stop
    /// tracking it. Returns None if no tracked page qualifies.
    fn evict(&mut self, evictable: &dyn Fn(&PageId) -> bool) -> Option<PageId>;

    /// Stop tracking `page_id`, e.g. because it was discarded.
    fn remove(&mut self, page_id: PageId);

    /// Number of tracked pages.
    fn size(&self) -> usize;
}
