//! Flipper: the graphics command processor of a GameCube-style emulator.
//!
//! This is the top-level facade crate that re-exports the public API from all
//! Flipper sub-crates. For most users, adding `flipper` as a single dependency
//! is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use flipper::prelude::*;
//!
//! // A backend that only counts what it is given.
//! #[derive(Default)]
//! struct Counter {
//!     registers: usize,
//!     vertices: usize,
//! }
//!
//! impl VertexFormat for Counter {
//!     fn vertex_size(&self, _vat: u8) -> u32 { 4 }
//! }
//!
//! impl RegisterSink for Counter {
//!     fn write_cp(&mut self, _addr: u8, _value: u32) { self.registers += 1; }
//!     fn write_bp(&mut self, _addr: u8, _value: u32) { self.registers += 1; }
//!     fn write_xf(&mut self, _addr: u16, values: &[u32]) { self.registers += values.len(); }
//!     fn load_xf_indexed(&mut self, _: IndexedArray, _: u16, _: u16, _: u8) {}
//! }
//!
//! impl PrimitiveSink for Counter {
//!     fn submit_primitive(
//!         &mut self,
//!         _primitive: Primitive,
//!         vat: u8,
//!         count: u16,
//!         vertices: &mut dyn StreamSource,
//!     ) {
//!         let mut data = vec![0; count as usize * self.vertex_size(vat) as usize];
//!         vertices.pop_into(&mut data);
//!         self.vertices += count as usize;
//!     }
//! }
//!
//! struct NoMemory;
//! impl EmulatedMemory for NoMemory {
//!     fn read_byte(&self, _physical_address: u32) -> u8 { 0 }
//! }
//!
//! let (mut producer, mut cp) =
//!     CommandProcessor::with_buffer(ProcessorConfig::default(), Counter::default(), NoMemory)
//!         .unwrap();
//!
//! // LOAD_BP_REG, then a two-vertex line.
//! producer.push(&[0x61, 0x45, 0x00, 0x00, 0x01]).unwrap();
//! producer.push(&[0xA8, 0x00, 0x02, 1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
//!
//! assert_eq!(cp.run(16).unwrap(), 2);
//! assert_eq!(cp.backend().registers, 1);
//! assert_eq!(cp.backend().vertices, 2);
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `flipper-core` | Opcodes, stream traits, collaborator traits, `FifoError` |
//! | [`engine`] | `flipper-engine` | Command buffer, length oracle, processor, GPU thread |
//! | [`replay`] | `flipper-replay` | Recording, file format, playback and comparison |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types and traits (`flipper-core`).
///
/// Contains the opcode encoding, the [`types::StreamSource`] and
/// [`types::PeekSource`] cursor traits, and the collaborator traits a
/// host implements ([`types::GraphicsBackend`], [`types::EmulatedMemory`]).
pub use flipper_core as types;

/// Decode engine (`flipper-engine`).
///
/// [`engine::CommandProcessor`] for cooperative polling,
/// [`engine::GpuThread`] for a dedicated decode thread.
pub use flipper_engine as engine;

/// Command-stream recording and playback (`flipper-replay`).
///
/// Capture sessions with [`engine::CommandProcessor::start_recording`],
/// persist them with [`replay::save`], and feed them back with
/// [`replay::Player`].
pub use flipper_replay as replay;

/// Common imports for typical Flipper usage.
///
/// ```rust
/// use flipper::prelude::*;
/// ```
///
/// This imports the processor, its configuration, the buffer handles, the
/// collaborator traits a backend implements, and the recording types.
pub mod prelude {
    // Core types and traits
    pub use flipper_core::{
        EmulatedMemory, FifoError, GraphicsBackend, IndexedArray, Opcode, OpcodeClass,
        OpcodeTable, PeekSource, Primitive, PrimitiveSink, RegisterSink, StreamSource,
        VertexFormat,
    };

    // Engine
    pub use flipper_engine::{
        CommandLength, CommandProcessor, ConfigError, FifoConsumer, FifoProducer, GpuThread,
        GpuThreadConfig, Poll, ProcessorConfig, ProcessorMetrics, SourceMode,
    };

    // Replay
    pub use flipper_replay::{Player, Recording, ReplayError, ReplaySink};
}
