//! Storage layer for heapdb.
//!
//! - **PageManager**: raw reads and writes of fixed-size blocks in one file
//! - **HeapPage**: decoded slotted page with dirty tracking and a before image
//! - **HeapFile**: a table as a sequence of heap pages, behind the `StorageFile` trait
//! - **BufferPool**: bounded page cache with page-level two-phase locking and LRU
//!   eviction of clean pages

pub mod buffer;
pub mod disk;
pub mod file;
pub mod page;

pub use buffer::{BufferPool, PageRef};
pub use disk::PageManager;
pub use file::{HeapFile, StorageFile};
pub use page::{HeapPage, PageId, PageLayout};
