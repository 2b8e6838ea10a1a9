//! Block Writer - a background worker that turns pending transactions into blocks
//!
//! A [`BlockWriter`] owns a recurring timer and a single background task. On every
//! tick it asks a [`BlockStore`] to assemble and persist a new block, reporting
//! each step to an [`EventSink`]. Shutdown stops the timer, signals the task and
//! waits for any in-flight write to finish.
//!
//! The crate ships [`Ledger`], an in-memory mempool and chain with an optional
//! JSON-lines journal, so the worker can run end to end.
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use block_writer::{BlockWriter, Ledger, TracingSink};
//!
//! #[tokio::main]
//! async fn main() {
//!     let ledger = Arc::new(Ledger::new(1000));
//!     let writer = BlockWriter::new(ledger, Duration::from_secs(5), TracingSink);
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     writer.shutdown().await;
//! }
//! ```

pub mod error;
pub mod store;
pub mod worker;

pub use error::{Result, WriterError};
pub use store::{Block, BlockDescriptor, BlockHeader, BlockStore, Ledger, Transaction};
pub use worker::{BlockWriter, EventSink, TracingSink, WriterConfig};
