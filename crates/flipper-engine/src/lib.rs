//! Decode engine for the Flipper graphics command processor.
//!
//! The CPU side appends encoded commands to a shared byte buffer through
//! a [`FifoProducer`]. The [`CommandProcessor`] owns the consumer end:
//! it asks the length oracle whether the next command is complete,
//! dispatches complete commands to a [`GraphicsBackend`], runs nested
//! display lists out of emulated memory, and optionally records what it
//! decoded.
//!
//! [`GpuThread`] runs a processor on its own thread; single-threaded hosts
//! call [`CommandProcessor::poll`] directly.
//!
//! [`GraphicsBackend`]: flipper_core::GraphicsBackend

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod buffer;
pub mod config;
pub(crate) mod dispatch;
pub mod display_list;
pub mod gpu_thread;
pub mod metrics;
pub mod oracle;
pub mod processor;

pub use buffer::{fifo, FifoConsumer, FifoProducer};
pub use config::{ConfigError, GpuThreadConfig, ProcessorConfig};
pub use display_list::{DisplayListCursor, SourceMode};
pub use gpu_thread::{GpuThread, GpuThreadError};
pub use metrics::ProcessorMetrics;
pub use oracle::{command_length, CommandLength, LengthOracle};
pub use processor::{CommandProcessor, DecodedCommand, Poll};
