//! Transaction identity.
//!
//! Transactions have no state object of their own: the buffer pool tracks which pages a
//! transaction dirtied and the lock manager tracks which locks it holds. Ending a
//! transaction is `BufferPool::transaction_complete`.

pub mod id;

pub use id::TransactionId;
