use crate::access::scan::HeapScan;
use crate::access::schema::Schema;
use crate::access::tuple::{RecordId, Tuple};
use crate::access::value::Field;
use crate::catalog::{Catalog, TableId};
use crate::concurrency::Permissions;
use crate::config::BufferPoolConfig;
use crate::error::{DbError, DbResult};
use crate::storage::buffer::BufferPool;
use crate::transaction::TransactionId;
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// High-level database interface over a data directory of heap files
pub struct Database {
    data_dir: PathBuf,
    catalog: Arc<Catalog>,
    buffer_pool: BufferPool,
}

impl Database {
    /// Open the database in `data_dir`, creating an empty one if the directory is new
    pub fn open(data_dir: &Path, config: BufferPoolConfig) -> DbResult<Self> {
        let catalog = Arc::new(Catalog::open(data_dir, config.page_size)?);
        let buffer_pool = BufferPool::new(catalog.clone(), config)?;
        info!(
            "opened {:?}: {} tables, {} page buffer pool",
            data_dir,
            catalog.table_ids().len(),
            buffer_pool.capacity()
        );
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            catalog,
            buffer_pool,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.buffer_pool
    }

    /// Start a transaction
    pub fn begin(&self) -> TransactionId {
        let tid = TransactionId::new();
        debug!("began {}", tid);
        tid
    }

    pub fn commit(&self, tid: TransactionId) -> DbResult<()> {
        self.buffer_pool.transaction_complete_with(tid, true)
    }

    pub fn abort(&self, tid: TransactionId) -> DbResult<()> {
        self.buffer_pool.transaction_complete_with(tid, false)
    }

    /// Run `f` in a fresh transaction, committing on success and aborting on error
    pub fn with_transaction<T, F>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(TransactionId) -> DbResult<T>,
    {
        let tid = self.begin();
        match f(tid) {
            Ok(value) => {
                self.commit(tid)?;
                Ok(value)
            }
            Err(e) => {
                // The original error matters more than a failed rollback.
                if let Err(abort_err) = self.abort(tid) {
                    log::warn!("abort of {} failed: {}", tid, abort_err);
                }
                Err(e)
            }
        }
    }

    pub fn create_table(&self, name: &str, schema: Schema) -> DbResult<TableId> {
        self.catalog.create_table(name, schema)
    }

    /// Look up a table id by name
    pub fn table(&self, name: &str) -> DbResult<TableId> {
        self.catalog
            .table_id(name)
            .ok_or_else(|| DbError::Catalog(format!("table '{}' does not exist", name)))
    }

    /// Names of all tables, ordered by table id
    pub fn list_tables(&self) -> Vec<String> {
        self.catalog
            .table_ids()
            .into_iter()
            .filter_map(|id| self.catalog.table_name(id))
            .collect()
    }

    /// Insert a row built from `fields` and return where it was stored
    pub fn insert(
        &self,
        tid: TransactionId,
        table_id: TableId,
        fields: Vec<Field>,
    ) -> DbResult<RecordId> {
        let schema = self.catalog.schema_of(table_id)?;
        let mut tuple = Tuple::new(schema, fields)?;
        self.buffer_pool.insert_tuple(tid, table_id, &mut tuple)?;
        tuple
            .record_id()
            .ok_or_else(|| DbError::InvalidTuple("insert did not place the tuple".to_string()))
    }

    /// Delete the row stored at `record_id` and return it
    pub fn delete(&self, tid: TransactionId, record_id: RecordId) -> DbResult<Tuple> {
        let page = self
            .buffer_pool
            .get_page(tid, record_id.page_id, Permissions::ReadWrite)?;
        let tuple = page
            .read()
            .tuple(record_id.slot as usize)
            .cloned()
            .ok_or(DbError::SlotAlreadyEmpty {
                page_id: record_id.page_id,
                slot: record_id.slot,
            })?;
        self.buffer_pool.delete_tuple(tid, &tuple)?;
        Ok(tuple)
    }

    pub fn scan(&self, tid: TransactionId, table_id: TableId) -> HeapScan {
        HeapScan::new(self.buffer_pool.clone(), tid, table_id)
    }
}
