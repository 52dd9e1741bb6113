//! Sequential scan over a heap file.

use crate::access::tuple::Tuple;
use crate::catalog::TableId;
use crate::concurrency::Permissions;
use crate::error::DbResult;
use crate::storage::buffer::BufferPool;
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use std::collections::VecDeque;

/// Yields every tuple of a table in page and slot order, locking each page shared for
/// `tid` as it is reached. Pages appended while the scan runs are picked up.
pub struct HeapScan {
    pool: BufferPool,
    tid: TransactionId,
    table_id: TableId,
    next_page: u32,
    current: VecDeque<Tuple>,
    done: bool,
}

impl HeapScan {
    pub fn new(pool: BufferPool, tid: TransactionId, table_id: TableId) -> Self {
        Self {
            pool,
            tid,
            table_id,
            next_page: 0,
            current: VecDeque::new(),
            done: false,
        }
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    /// Restarts the scan from the first page.
    pub fn rewind(&mut self) {
        self.next_page = 0;
        self.current.clear();
        self.done = false;
    }

    /// Loads the next non-empty page into `current`. Returns false at the end of the file.
    fn fetch_next_page(&mut self) -> DbResult<bool> {
        let file = self.pool.catalog().storage_file(self.table_id)?;
        while self.next_page < file.num_pages()? {
            let page_id = PageId::new(self.table_id, self.next_page);
            self.next_page += 1;

            let page = self.pool.get_page(self.tid, page_id, Permissions::ReadOnly)?;
            self.current.extend(page.read().iter().cloned());
            if !self.current.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl Iterator for HeapScan {
    type Item = DbResult<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(tuple) = self.current.pop_front() {
                return Some(Ok(tuple));
            }
            if self.done {
                return None;
            }
            match self.fetch_next_page() {
                Ok(true) => continue,
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
