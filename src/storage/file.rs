pub mod heap_file;

use crate::access::schema::Schema;
use crate::access::tuple::Tuple;
use crate::catalog::TableId;
use crate::error::DbResult;
use crate::storage::buffer::{BufferPool, PageRef};
use crate::storage::page::{HeapPage, PageId};
use crate::transaction::TransactionId;
use std::sync::Arc;

/// On-disk home of one table.
///
/// The buffer pool reads and writes whole pages through this trait and delegates tuple
/// placement to it; it never looks at file offsets itself.
pub trait StorageFile: Send + Sync {
    fn id(&self) -> TableId;

    fn schema(&self) -> &Arc<Schema>;

    fn page_size(&self) -> usize;

    fn read_page(&self, page_id: PageId) -> DbResult<HeapPage>;

    fn write_page(&self, page: &HeapPage) -> DbResult<()>;

    fn num_pages(&self) -> DbResult<u32>;

    /// Stores `tuple` on some page, fetching pages through `pool` on behalf of `tid`.
    /// Returns every page that was modified, already marked dirty by `tid`.
    fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> DbResult<Vec<PageRef>>;

    /// Removes `tuple` from the page its record id points at and returns that page.
    fn delete_tuple(&self, pool: &BufferPool, tid: TransactionId, tuple: &Tuple)
        -> DbResult<PageRef>;
}

pub use heap_file::HeapFile;
