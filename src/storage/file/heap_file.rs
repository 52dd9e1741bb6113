use super::StorageFile;
use crate::access::schema::Schema;
use crate::access::tuple::Tuple;
use crate::catalog::TableId;
use crate::concurrency::Permissions;
use crate::error::{DbError, DbResult};
use crate::storage::buffer::{BufferPool, PageRef};
use crate::storage::disk::PageManager;
use crate::storage::page::{HeapPage, PageId, PageLayout};
use crate::transaction::TransactionId;
use log::debug;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Fresh pages claimed by concurrent inserters before giving up on an insert.
const MAX_APPEND_ATTEMPTS: usize = 16;

/// A table stored as an unordered sequence of slotted pages in a single file.
pub struct HeapFile {
    table_id: TableId,
    schema: Arc<Schema>,
    page_size: usize,
    path: PathBuf,
    pages: Mutex<PageManager>,
}

impl HeapFile {
    /// Opens the heap file at `path`, creating it empty if it does not exist yet.
    pub fn open(
        table_id: TableId,
        path: &Path,
        schema: Arc<Schema>,
        page_size: usize,
    ) -> DbResult<Self> {
        let pages = PageManager::open_or_create(path, page_size)?;
        Ok(Self {
            table_id,
            schema,
            page_size,
            path: path.to_path_buf(),
            pages: Mutex::new(pages),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> PageLayout {
        PageLayout::new(self.page_size, self.schema.byte_size())
    }

    fn check_table(&self, page_id: PageId) -> DbResult<()> {
        if page_id.table_id != self.table_id {
            return Err(DbError::UnknownTable(page_id.table_id));
        }
        Ok(())
    }

    /// Extends the file by one empty page and returns its id.
    fn append_empty_page(&self) -> DbResult<PageId> {
        let page_no = self
            .pages
            .lock()
            .append_page(&HeapPage::empty_page_data(self.page_size))?;
        let page_id = PageId::new(self.table_id, page_no);
        debug!("appended empty page {}", page_id);
        Ok(page_id)
    }

    /// Inserts into `page_id` if it has room. Scans with a shared lock first so that
    /// full pages do not collect exclusive locks; the lock is given back whenever the
    /// page turns out to be full and `tid` did not hold a lock on it before.
    fn try_insert_into(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        page_id: PageId,
        tuple: &mut Tuple,
    ) -> DbResult<Option<PageRef>> {
        let held_before = pool.holds_lock(tid, page_id);
        let page = pool.get_page(tid, page_id, Permissions::ReadOnly)?;
        let has_room = page.read().num_empty_slots() > 0;
        if !has_room {
            if !held_before {
                pool.release_page(tid, page_id);
            }
            return Ok(None);
        }

        let page = pool.get_page(tid, page_id, Permissions::ReadWrite)?;
        let mut guard = page.write();
        match guard.insert(tuple) {
            Ok(_) => {
                // Dirty before the latch drops: a clean unlatched page is an eviction
                // candidate.
                guard.mark_dirty(true, tid);
                drop(guard);
                Ok(Some(page))
            }
            Err(DbError::PageFull(_)) => {
                drop(guard);
                if !held_before {
                    pool.release_page(tid, page_id);
                }
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

impl StorageFile for HeapFile {
    fn id(&self) -> TableId {
        self.table_id
    }

    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn read_page(&self, page_id: PageId) -> DbResult<HeapPage> {
        self.check_table(page_id)?;
        let mut buf = vec![0u8; self.page_size];
        self.pages.lock().read_page(page_id.page_no, &mut buf)?;
        HeapPage::from_bytes(page_id, self.schema.clone(), self.page_size, &buf)
    }

    fn write_page(&self, page: &HeapPage) -> DbResult<()> {
        self.check_table(page.page_id())?;
        let data = page.page_data()?;
        self.pages.lock().write_page(page.page_id().page_no, &data)
    }

    fn num_pages(&self) -> DbResult<u32> {
        self.pages.lock().num_pages()
    }

    fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> DbResult<Vec<PageRef>> {
        if tuple.schema().as_ref() != self.schema.as_ref() {
            return Err(DbError::SchemaMismatch {
                expected: self.schema.to_string(),
                found: tuple.schema().to_string(),
            });
        }

        if self.layout().num_slots() == 0 {
            return Err(DbError::PageFull(PageId::new(self.table_id, self.num_pages()?)));
        }

        for page_no in 0..self.num_pages()? {
            let page_id = PageId::new(self.table_id, page_no);
            if let Some(page) = self.try_insert_into(pool, tid, page_id, tuple)? {
                return Ok(vec![page]);
            }
        }

        // Every existing page is full. Another transaction may claim a freshly appended
        // page first, in which case append again.
        let mut last = None;
        for _ in 0..MAX_APPEND_ATTEMPTS {
            let page_id = self.append_empty_page()?;
            if let Some(page) = self.try_insert_into(pool, tid, page_id, tuple)? {
                return Ok(vec![page]);
            }
            last = Some(page_id);
        }
        Err(DbError::PageFull(last.unwrap_or_else(|| PageId::new(self.table_id, 0))))
    }

    fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> DbResult<PageRef> {
        let record_id = tuple.record_id().ok_or(DbError::InvalidTuple(
            "tuple has no record id".to_string(),
        ))?;
        if record_id.page_id.table_id != self.table_id {
            return Err(DbError::NotOnThisPage {
                page_id: record_id.page_id,
            });
        }

        let page = pool.get_page(tid, record_id.page_id, Permissions::ReadWrite)?;
        {
            let mut guard = page.write();
            guard.delete(tuple)?;
            guard.mark_dirty(true, tid);
        }
        Ok(page)
    }
}
