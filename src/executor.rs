//! Iterator-style operators over heap scans.
//!
//! Every operator produces tuples one at a time through `next()` after `init()` has been
//! called, so operators compose into trees: a join pulls from two children, an aggregate
//! drains one, and an insert writes whatever its child yields into a table.

use crate::access::schema::Schema;
use crate::access::tuple::Tuple;
use crate::error::DbResult;
use std::sync::Arc;

pub mod aggregate;
pub mod insert;
pub mod nested_loop_join;
pub mod seq_scan;

pub use aggregate::{AggregateExecutor, AggregateFunction};
pub use insert::InsertExecutor;
pub use nested_loop_join::{CompareOp, JoinPredicate, NestedLoopJoinExecutor};
pub use seq_scan::SeqScanExecutor;

/// Trait for all operators
pub trait Executor: Send {
    /// (Re)starts the operator. Must be called before `next()`.
    fn init(&mut self) -> DbResult<()>;

    /// Next output tuple, or `None` once the operator is exhausted.
    fn next(&mut self) -> DbResult<Option<Tuple>>;

    fn output_schema(&self) -> &Arc<Schema>;
}

/// Drains an operator into a vector after initializing it.
pub fn collect(executor: &mut dyn Executor) -> DbResult<Vec<Tuple>> {
    executor.init()?;
    let mut out = Vec::new();
    while let Some(tuple) = executor.next()? {
        out.push(tuple);
    }
    Ok(out)
}
