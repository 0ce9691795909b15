//! Command-stream recording and deterministic playback for Flipper.
//!
//! Captures the exact byte stream a command processor decodes, grouped
//! into frames and per-command elements, and replays it byte for byte.
//!
//! # Architecture
//!
//! - [`Recorder`] accumulates elements while recording is active
//! - [`encode_recording`] / [`decode_recording`] implement the file format
//! - [`save`] and [`load`] wrap the codec for files on disk
//! - [`Player`] feeds a recording into any [`ReplaySink`]
//! - [`recording_hash`] and [`compare_recordings`] check two runs agree
//!
//! # Format
//!
//! ```text
//! [Header: 8 x u32 LE] [FrameRecord x N] [ElementRecord x M] [raw bytes]
//! ```
//!
//! Loading validates the whole file before returning, so a truncated or
//! inconsistent file never yields a partial recording.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod codec;
pub mod compare;
pub mod error;
pub mod hash;
pub mod player;
pub mod reader;
pub mod recorder;
pub mod types;
pub mod writer;

pub use codec::{decode_recording, encode_recording};
pub use compare::{compare_recordings, Divergence, DivergenceKind};
pub use error::ReplayError;
pub use hash::{frame_hash, recording_hash};
pub use player::{PlayError, PlaybackStats, Player, ReplaySink};
pub use reader::load;
pub use recorder::Recorder;
pub use types::{
    Element, ElementKind, ElementRecord, FileHeader, FrameRecord, Recording, Section,
};
pub use writer::save;

/// Magic number at the start of every recording file (`"GFPL"` read as a
/// little-endian `u32`).
pub const MAGIC: u32 = 0x4C50_4647;

/// Current binary format version.
pub const FORMAT_VERSION: u32 = 1;
