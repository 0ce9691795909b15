//! Core types and traits for the Flipper command processor.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the opcode encoding of the command stream, the byte-cursor traits
//! shared by the primary buffer and display lists, the interfaces of
//! the external collaborators (rendering backend, emulated memory),
//! and the decoder error type.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod opcode;
pub mod stream;
pub mod traits;

pub use error::FifoError;
pub use opcode::{IndexedArray, Opcode, OpcodeClass, OpcodeTable, Primitive};
pub use stream::{PeekSource, StreamSource};
pub use traits::{EmulatedMemory, GraphicsBackend, PrimitiveSink, RegisterSink, VertexFormat};
