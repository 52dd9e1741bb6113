//! Tuple-level access to tables.
//!
//! - **Field / FieldType**: typed column values and their fixed-width encoding
//! - **Schema**: ordered, named column types of a table
//! - **Tuple / RecordId**: one row and where it lives on disk
//! - **HeapScan**: sequential scan of a table through the buffer pool

pub mod scan;
pub mod schema;
pub mod tuple;
pub mod value;

pub use scan::HeapScan;
pub use schema::{Column, Schema};
pub use tuple::{RecordId, Tuple};
pub use value::{Field, FieldType, STRING_LEN};
