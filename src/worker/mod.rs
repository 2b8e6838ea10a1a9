//! Worker module for periodically writing blocks
//!
//! This module provides:
//! - BlockWriter: Background task that creates a block on every tick
//! - EventSink: Observer receiving the writer's status lines
//! - WriterConfig: Configuration for the writer

pub mod block_writer;
pub mod config;
pub mod events;

pub use block_writer::BlockWriter;
pub use config::WriterConfig;
pub use events::{EventSink, TracingSink};
