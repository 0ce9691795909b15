//! Nested display-list reads from emulated memory.
//!
//! A display list is a command stream stored in main memory. While one is
//! executing, every pop comes from a [`DisplayListCursor`] instead of the
//! primary buffer. Memory is viewed big-endian, so each byte address is
//! XOR'd with 3 before the read.

use std::fmt;

use flipper_core::{EmulatedMemory, PeekSource, StreamSource};

/// Which stream the decoder is currently reading.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SourceMode {
    /// The shared command buffer.
    #[default]
    PrimaryBuffer,
    /// A display list in emulated memory.
    DisplayList {
        /// Physical start address, already masked.
        address: u32,
        /// Length in bytes.
        length: u32,
    },
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrimaryBuffer => f.write_str("primary buffer"),
            Self::DisplayList { address, length } => {
                write!(f, "display list {address:#010x}+{length}")
            }
        }
    }
}

/// Cursor over one display list.
///
/// Reads are not bounds-checked against `length`: the list length only
/// bounds the dispatch loop, and a command straddling the end reads
/// whatever memory follows.
pub struct DisplayListCursor<'m, M: EmulatedMemory + ?Sized> {
    memory: &'m M,
    address: u32,
    length: u32,
    offset: u32,
}

impl<'m, M: EmulatedMemory + ?Sized> DisplayListCursor<'m, M> {
    /// A cursor at offset 0 of the list at `address`.
    pub fn new(memory: &'m M, address: u32, length: u32) -> Self {
        Self {
            memory,
            address,
            length,
            offset: 0,
        }
    }

    /// Bytes popped so far.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Declared list length.
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Whether the dispatch loop has reached the declared length.
    pub fn is_exhausted(&self) -> bool {
        self.offset >= self.length
    }

    #[inline]
    fn read(&self, offset: u32) -> u8 {
        self.memory
            .read_byte(self.address.wrapping_add(offset) ^ 3)
    }
}

impl<M: EmulatedMemory + ?Sized> StreamSource for DisplayListCursor<'_, M> {
    fn pop_u8(&mut self) -> u8 {
        let b = self.read(self.offset);
        self.offset = self.offset.wrapping_add(1);
        b
    }

    fn position(&self) -> u64 {
        self.offset as u64
    }
}

impl<M: EmulatedMemory + ?Sized> PeekSource for DisplayListCursor<'_, M> {
    /// Unbounded: memory can always be read, so every nested command is
    /// complete as far as the length oracle is concerned.
    fn available(&self) -> usize {
        usize::MAX
    }

    fn peek_u8(&self, offset: usize) -> u8 {
        self.read(self.offset.wrapping_add(offset as u32))
    }
}
