use crate::access::scan::HeapScan;
use crate::access::schema::Schema;
use crate::access::tuple::Tuple;
use crate::catalog::TableId;
use crate::error::DbResult;
use crate::executor::Executor;
use crate::storage::buffer::BufferPool;
use crate::transaction::TransactionId;
use std::sync::Arc;

/// Leaf operator yielding every tuple of one table
pub struct SeqScanExecutor {
    scan: HeapScan,
    schema: Arc<Schema>,
}

impl SeqScanExecutor {
    pub fn new(pool: BufferPool, tid: TransactionId, table_id: TableId) -> DbResult<Self> {
        let schema = pool.catalog().schema_of(table_id)?;
        Ok(Self {
            scan: HeapScan::new(pool, tid, table_id),
            schema,
        })
    }

    pub fn table_id(&self) -> TableId {
        self.scan.table_id()
    }
}

impl Executor for SeqScanExecutor {
    fn init(&mut self) -> DbResult<()> {
        self.scan.rewind();
        Ok(())
    }

    fn next(&mut self) -> DbResult<Option<Tuple>> {
        self.scan.next().transpose()
    }

    fn output_schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}
