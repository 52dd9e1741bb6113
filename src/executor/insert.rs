//! Insert executor: writes every tuple of its child into a table.

use crate::access::schema::{Column, Schema};
use crate::access::tuple::Tuple;
use crate::access::value::{Field, FieldType};
use crate::catalog::TableId;
use crate::error::{DbError, DbResult};
use crate::executor::Executor;
use crate::storage::buffer::BufferPool;
use crate::transaction::TransactionId;
use log::debug;
use std::sync::Arc;

/// Executor for inserting rows into a table.
///
/// The first `next()` drains the child, inserting on behalf of `tid`, and returns a
/// single `count` tuple; later calls return `None`.
pub struct InsertExecutor {
    pool: BufferPool,
    tid: TransactionId,
    table_id: TableId,
    table_schema: Arc<Schema>,
    child: Box<dyn Executor>,
    output_schema: Arc<Schema>,
    done: bool,
    initialized: bool,
}

impl InsertExecutor {
    pub fn new(
        pool: BufferPool,
        tid: TransactionId,
        table_id: TableId,
        child: Box<dyn Executor>,
    ) -> DbResult<Self> {
        let table_schema = pool.catalog().schema_of(table_id)?;
        if child.output_schema().as_ref() != table_schema.as_ref() {
            return Err(DbError::SchemaMismatch {
                expected: table_schema.to_string(),
                found: child.output_schema().to_string(),
            });
        }
        let output_schema = Arc::new(Schema::new(vec![Column::new("count", FieldType::Int)])?);
        Ok(Self {
            pool,
            tid,
            table_id,
            table_schema,
            child,
            output_schema,
            done: false,
            initialized: false,
        })
    }
}

impl Executor for InsertExecutor {
    fn init(&mut self) -> DbResult<()> {
        self.child.init()?;
        self.done = false;
        self.initialized = true;
        Ok(())
    }

    fn next(&mut self) -> DbResult<Option<Tuple>> {
        if !self.initialized {
            return Err(DbError::Executor(
                "insert not initialized, call init() first".to_string(),
            ));
        }
        if self.done {
            return Ok(None);
        }

        let mut count: i32 = 0;
        while let Some(source) = self.child.next()? {
            // Rebuilt over the table's own schema; the child's may only match by type.
            let mut tuple = Tuple::new(self.table_schema.clone(), source.fields().to_vec())?;
            self.pool.insert_tuple(self.tid, self.table_id, &mut tuple)?;
            count += 1;
        }
        self.done = true;
        debug!("{} inserted {} tuples into table {}", self.tid, count, self.table_id);

        Tuple::new(self.output_schema.clone(), vec![Field::Int(count)]).map(Some)
    }

    fn output_schema(&self) -> &Arc<Schema> {
        &self.output_schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::config::BufferPoolConfig;
    use crate::executor::tests::ValuesExecutor;
    use crate::executor::{collect, SeqScanExecutor};
    use anyhow::Result;
    use tempfile::{tempdir, TempDir};

    fn setup() -> Result<(TempDir, BufferPool, TableId)> {
        let dir = tempdir()?;
        let catalog = Arc::new(Catalog::open(dir.path(), 512)?);
        let table = catalog.create_table("t", Schema::from_types(&[FieldType::Int])?)?;
        let pool = BufferPool::new(catalog, BufferPoolConfig::new(8).with_page_size(512))?;
        Ok((dir, pool, table))
    }

    fn ints(values: impl IntoIterator<Item = i32>) -> DbResult<ValuesExecutor> {
        let rows = values.into_iter().map(|v| vec![Field::Int(v)]).collect();
        ValuesExecutor::new(Schema::from_types(&[FieldType::Int])?, rows)
    }

    #[test]
    fn test_insert_reports_count() -> Result<()> {
        let (_dir, pool, table) = setup()?;
        let tid = TransactionId::new();

        let rows = ints(0..200)?;
        let mut insert = InsertExecutor::new(pool.clone(), tid, table, Box::new(rows))?;
        assert_eq!(insert.output_schema().columns()[0].name, "count");
        insert.init()?;
        let result = insert.next()?.expect("count tuple");
        assert_eq!(result.field(0), Some(&Field::Int(200)));
        assert!(insert.next()?.is_none());
        pool.transaction_complete(tid)?;

        let reader = TransactionId::new();
        let rows = collect(&mut SeqScanExecutor::new(pool.clone(), reader, table)?)?;
        assert_eq!(rows.len(), 200);
        assert!(rows.iter().all(|row| row.record_id().is_some()));
        Ok(())
    }

    #[test]
    fn test_insert_from_scan() -> Result<()> {
        let (_dir, pool, table) = setup()?;
        let tid = TransactionId::new();
        let mut seed = InsertExecutor::new(pool.clone(), tid, table, Box::new(ints(1..=3)?))?;
        collect(&mut seed)?;

        // Copy one table into another inside the same transaction.
        let copy_schema = Schema::from_types(&[FieldType::Int])?;
        let copy = pool.catalog().create_table("copy", copy_schema)?;
        let scan = SeqScanExecutor::new(pool.clone(), tid, table)?;
        let mut insert = InsertExecutor::new(pool.clone(), tid, copy, Box::new(scan))?;
        let result = collect(&mut insert)?;
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].field(0), Some(&Field::Int(3)));
        pool.transaction_complete(tid)?;
        Ok(())
    }

    #[test]
    fn test_empty_child_inserts_nothing() -> Result<()> {
        let (_dir, pool, table) = setup()?;
        let tid = TransactionId::new();
        let empty = ints(std::iter::empty())?;
        let mut insert = InsertExecutor::new(pool.clone(), tid, table, Box::new(empty))?;
        let result = collect(&mut insert)?;
        assert_eq!(result[0].field(0), Some(&Field::Int(0)));
        assert_eq!(pool.catalog().storage_file(table)?.num_pages()?, 0);
        Ok(())
    }

    #[test]
    fn test_rejects_mismatched_child() -> Result<()> {
        let (_dir, pool, table) = setup()?;
        let child = ValuesExecutor::new(Schema::from_types(&[FieldType::Str])?, vec![])?;
        assert!(matches!(
            InsertExecutor::new(pool, TransactionId::new(), table, Box::new(child)),
            Err(DbError::SchemaMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_next_before_init() -> Result<()> {
        let (_dir, pool, table) = setup()?;
        let mut insert =
            InsertExecutor::new(pool, TransactionId::new(), table, Box::new(ints(0..1)?))?;
        assert!(matches!(insert.next(), Err(DbError::Executor(_))));
        Ok(())
    }
}
