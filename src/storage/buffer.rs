pub mod lru;
pub mod replacer;

use crate::access::tuple::Tuple;
use crate::catalog::{Catalog, TableId};
use crate::concurrency::{LockManager, Permissions};
use crate::config::BufferPoolConfig;
use crate::error::{DbError, DbResult};
use crate::storage::page::{HeapPage, PageId};
use crate::transaction::TransactionId;
use log::{debug, warn};
use lru::LruReplacer;
use parking_lot::{Mutex, RwLock};
use replacer::Replacer;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared handle to a cached page. Holders keep it alive past eviction, but only the copy
/// in the cache is ever written back.
pub type PageRef = Arc<RwLock<HeapPage>>;

/// Page cache with page-level two-phase locking.
///
/// Pages dirtied by a transaction stay in memory until that transaction completes: they
/// are written out on commit and reloaded from disk on abort. Eviction only ever picks
/// clean pages, so disk never holds uncommitted data.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<BufferPoolInner>,
}

struct BufferPoolInner {
    config: BufferPoolConfig,
    catalog: Arc<Catalog>,
    state: Mutex<CacheState>,
    lock_manager: LockManager,
}

struct CacheState {
    pages: HashMap<PageId, PageRef>,
    replacer: Box<dyn Replacer>,
}

impl BufferPool {
    pub fn new(catalog: Arc<Catalog>, config: BufferPoolConfig) -> DbResult<Self> {
        let replacer = Box::new(LruReplacer::new(config.num_pages));
        Self::with_replacer(catalog, config, replacer)
    }

    pub fn with_replacer(
        catalog: Arc<Catalog>,
        config: BufferPoolConfig,
        replacer: Box<dyn Replacer>,
    ) -> DbResult<Self> {
        config.validate()?;
        if catalog.page_size() != config.page_size {
            return Err(DbError::Catalog(format!(
                "catalog uses {} byte pages, buffer pool {}",
                catalog.page_size(),
                config.page_size
            )));
        }
        Ok(Self {
            inner: Arc::new(BufferPoolInner {
                state: Mutex::new(CacheState {
                    pages: HashMap::with_capacity(config.num_pages),
                    replacer,
                }),
                config,
                catalog,
                lock_manager: LockManager::new(),
            }),
        })
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.inner.catalog
    }

    pub fn config(&self) -> &BufferPoolConfig {
        &self.inner.config
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.inner.lock_manager
    }

    pub fn capacity(&self) -> usize {
        self.inner.config.num_pages
    }

    /// Number of pages currently cached.
    pub fn len(&self) -> usize {
        self.inner.state.lock().pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_cached(&self, page_id: PageId) -> bool {
        self.inner.state.lock().pages.contains_key(&page_id)
    }

    /// Locks `page_id` for `tid` and returns the cached page, reading it from its table's
    /// file on a miss.
    ///
    /// Blocks while another transaction holds a conflicting lock. If the lock is still
    /// unavailable after the configured timeout the caller is expected to abort `tid`.
    pub fn get_page(
        &self,
        tid: TransactionId,
        page_id: PageId,
        perm: Permissions,
    ) -> DbResult<PageRef> {
        let mode = perm.lock_mode();
        let timeout = self.inner.config.lock_timeout;
        if !self
            .inner
            .lock_manager
            .acquire_timeout(tid, page_id, mode, timeout)
        {
            warn!(
                "{} gave up waiting {:?} for a {:?} lock on {}",
                tid, timeout, mode, page_id
            );
            return Err(DbError::TransactionAborted { tid, page_id });
        }

        let mut state = self.inner.state.lock();
        if let Some(page) = state.pages.get(&page_id).cloned() {
            state.replacer.record_access(page_id);
            debug!("cache hit for {}", page_id);
            return Ok(page);
        }

        let file = self.inner.catalog.storage_file(page_id.table_id)?;
        let page = Arc::new(RwLock::new(file.read_page(page_id)?));
        if state.pages.len() >= self.capacity() {
            Self::evict(&mut state, self.capacity())?;
        }
        state.pages.insert(page_id, page.clone());
        state.replacer.record_access(page_id);
        debug!("cache miss for {}, {} pages cached", page_id, state.pages.len());
        Ok(page)
    }

    /// Drops the least recently used page that is neither dirty nor latched. Nothing is
    /// written back.
    fn evict(state: &mut CacheState, capacity: usize) -> DbResult<PageId> {
        let CacheState { pages, replacer } = state;
        let victim = replacer.evict(&|page_id| {
            pages.get(page_id).is_some_and(|page| {
                page.try_read()
                    .is_some_and(|guard| guard.is_dirty().is_none())
            })
        });

        match victim {
            Some(page_id) => {
                pages.remove(&page_id);
                debug!("evicted {}", page_id);
                Ok(page_id)
            }
            None => {
                warn!("no clean page to evict among {} cached", pages.len());
                Err(DbError::BufferPoolFull { capacity })
            }
        }
    }

    /// Adds `tuple` to table `table_id` on behalf of `tid`. The pages it touched stay
    /// cached and dirty until `tid` completes.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: TableId,
        tuple: &mut Tuple,
    ) -> DbResult<()> {
        let file = self.inner.catalog.storage_file(table_id)?;
        if tuple.schema().as_ref() != file.schema().as_ref() {
            return Err(DbError::SchemaMismatch {
                expected: file.schema().to_string(),
                found: tuple.schema().to_string(),
            });
        }
        for page in file.insert_tuple(self, tid, tuple)? {
            self.cache_dirty(tid, page)?;
        }
        Ok(())
    }

    /// Removes `tuple` from the table its record id points into.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> DbResult<()> {
        let record_id = tuple
            .record_id()
            .ok_or_else(|| DbError::InvalidTuple("tuple has no record id".to_string()))?;
        let file = self.inner.catalog.storage_file(record_id.page_id.table_id)?;
        if tuple.schema().as_ref() != file.schema().as_ref() {
            return Err(DbError::SchemaMismatch {
                expected: file.schema().to_string(),
                found: tuple.schema().to_string(),
            });
        }
        let page = file.delete_tuple(self, tid, tuple)?;
        self.cache_dirty(tid, page)
    }

    /// Marks `page` dirtied by `tid` and makes sure it is the cached copy.
    fn cache_dirty(&self, tid: TransactionId, page: PageRef) -> DbResult<()> {
        let page_id = {
            let mut guard = page.write();
            guard.mark_dirty(true, tid);
            guard.page_id()
        };

        let mut state = self.inner.state.lock();
        if !state.pages.contains_key(&page_id) {
            if state.pages.len() >= self.capacity() {
                Self::evict(&mut state, self.capacity())?;
            }
            state.pages.insert(page_id, page);
        }
        state.replacer.record_access(page_id);
        Ok(())
    }

    /// Releases whatever lock `tid` holds on `page_id`.
    ///
    /// Dropping a lock before the transaction completes breaks strict two-phase locking;
    /// only do so for pages `tid` has merely inspected.
    pub fn release_page(&self, tid: TransactionId, page_id: PageId) {
        self.inner.lock_manager.release(tid, page_id);
    }

    pub fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.inner.lock_manager.holds_lock(tid, page_id)
    }

    /// Commits `tid`.
    pub fn transaction_complete(&self, tid: TransactionId) -> DbResult<()> {
        self.transaction_complete_with(tid, true)
    }

    /// Commits or aborts `tid`, then releases all of its locks. Locks are released even
    /// if writing or reloading a page fails; that error is returned afterwards.
    pub fn transaction_complete_with(&self, tid: TransactionId, commit: bool) -> DbResult<()> {
        let result = if commit {
            self.flush_pages(tid)
        } else {
            self.revert_pages(tid)
        };
        self.inner.lock_manager.release_all(tid);
        debug!(
            "{} {}",
            tid,
            match (commit, result.is_ok()) {
                (true, true) => "committed",
                (false, true) => "aborted",
                _ => "completed with errors",
            }
        );
        result
    }

    /// Pages currently cached, taken under the cache mutex and returned without it so that
    /// callers can latch them.
    fn cached_pages(&self) -> Vec<PageRef> {
        self.inner.state.lock().pages.values().cloned().collect()
    }

    fn dirtied_by(&self, tid: TransactionId) -> Vec<PageRef> {
        self.cached_pages()
            .into_iter()
            .filter(|page| page.read().is_dirty() == Some(tid))
            .collect()
    }

    /// Writes every page dirtied by `tid` to disk.
    pub fn flush_pages(&self, tid: TransactionId) -> DbResult<()> {
        for page in self.dirtied_by(tid) {
            self.write_back(&page)?;
        }
        Ok(())
    }

    /// Writes every dirty cached page to disk regardless of which transaction dirtied it.
    /// Doing so while those transactions are running defeats rollback.
    pub fn flush_all_pages(&self) -> DbResult<()> {
        for page in self.cached_pages() {
            self.write_back(&page)?;
        }
        Ok(())
    }

    fn write_back(&self, page: &PageRef) -> DbResult<()> {
        let mut guard = page.write();
        let Some(tid) = guard.is_dirty() else {
            return Ok(());
        };
        let file = self.inner.catalog.storage_file(guard.page_id().table_id)?;
        file.write_page(&guard)?;
        guard.mark_dirty(false, tid);
        guard.set_before_image()?;
        debug!("flushed {} for {}", guard.page_id(), tid);
        Ok(())
    }

    /// Replaces every page dirtied by `tid` with its on-disk content, in place, so that
    /// handles other threads hold see the rollback too.
    fn revert_pages(&self, tid: TransactionId) -> DbResult<()> {
        for page in self.dirtied_by(tid) {
            let mut guard = page.write();
            if guard.is_dirty() != Some(tid) {
                continue;
            }
            let page_id = guard.page_id();
            let file = self.inner.catalog.storage_file(page_id.table_id)?;
            *guard = file.read_page(page_id)?;
            debug!("reverted {} for {}", page_id, tid);
        }
        Ok(())
    }

    /// Drops `page_id` from the cache without writing it.
    pub fn discard_page(&self, page_id: PageId) {
        let mut state = self.inner.state.lock();
        if state.pages.remove(&page_id).is_some() {
            state.replacer.remove(page_id);
            debug!("discarded {}", page_id);
        }
    }
}
