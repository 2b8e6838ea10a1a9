//! Block storage
//!
//! Defines the boundary the block writer consumes ([`BlockStore`], [`BlockDescriptor`])
//! and provides [`Ledger`], an in-memory implementation with an optional on-disk journal.

pub mod ledger;
pub mod models;

pub use ledger::Ledger;
pub use models::{Block, BlockHeader, Transaction};

use crate::error::Result;
use std::future::Future;

/// A store able to assemble and persist a new block from its pending transactions.
pub trait BlockStore: Send + Sync + 'static {
    type Block: BlockDescriptor;

    /// Create and persist the next block.
    ///
    /// Returns [`WriterError::NoTransactions`](crate::WriterError::NoTransactions)
    /// when there is nothing pending.
    fn create_block(&self) -> impl Future<Output = Result<Self::Block>> + Send;
}

/// The view of a freshly written block used for status reporting.
pub trait BlockDescriptor: Send {
    /// Hash of the parent block.
    fn prev_block(&self) -> &[u8];

    /// Content hash of this block.
    fn hash(&self) -> Result<Vec<u8>>;

    /// Number of transactions included.
    fn item_count(&self) -> usize;
}
