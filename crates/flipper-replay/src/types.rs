//! Data types for command-stream recordings.
//!
//! A [`Recording`] is three flat tables: frames index into elements, and
//! elements index into one raw byte log. Every range is validated when the
//! recording is built, so accessors never fail.

use std::fmt;
use std::ops::Range;

use crate::error::ReplayError;
use crate::{FORMAT_VERSION, MAGIC};

/// Size of the little-endian `address`/`size` prefix of a memory update.
pub const MEMORY_UPDATE_HEADER_SIZE: usize = 8;

/// The file sections, in on-disk order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Section {
    /// Fixed 32-byte header.
    Header,
    /// Frame record table.
    FrameInfo,
    /// Element record table.
    ElementInfo,
    /// Raw byte log.
    RawData,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Header => "header",
            Self::FrameInfo => "frame info",
            Self::ElementInfo => "element info",
            Self::RawData => "raw data",
        };
        f.write_str(name)
    }
}

/// What an element's bytes represent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// One decoded command, replayed by pushing its bytes.
    RegisterWrite,
    /// A write to emulated memory that a later display list reads.
    MemoryUpdate,
}

impl ElementKind {
    /// On-disk tag.
    pub fn tag(self) -> u32 {
        match self {
            Self::RegisterWrite => 0,
            Self::MemoryUpdate => 1,
        }
    }

    /// Parse an on-disk tag.
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::RegisterWrite),
            1 => Some(Self::MemoryUpdate),
            _ => None,
        }
    }
}

/// One contiguous byte range of the raw log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElementRecord {
    /// Element kind.
    pub kind: ElementKind,
    /// Offset of the first byte in the raw log.
    pub offset: u32,
    /// Length in bytes.
    pub size: u32,
}

impl ElementRecord {
    /// On-disk size of one element record.
    pub const SIZE: usize = 12;

    /// Byte range in the raw log.
    pub fn range(&self) -> Range<usize> {
        let start = self.offset as usize;
        start..start + self.size as usize
    }
}

/// One frame's slice of the element table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameRecord {
    /// Index of the frame's first element.
    pub base_element: u32,
    /// Number of elements in the frame.
    pub element_count: u32,
}

impl FrameRecord {
    /// On-disk size of one frame record.
    pub const SIZE: usize = 8;

    /// Element index range.
    pub fn range(&self) -> Range<usize> {
        let start = self.base_element as usize;
        start..start + self.element_count as usize
    }
}

/// The fixed-size file header. All fields are little-endian `u32`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileHeader {
    /// Always [`MAGIC`].
    pub magic: u32,
    /// Always [`FORMAT_VERSION`] for files written by this build.
    pub version: u32,
    /// Number of frame records.
    pub frame_count: u32,
    /// Number of element records.
    pub element_count: u32,
    /// Length of the raw byte log.
    pub raw_byte_count: u32,
    /// File offset of the frame table.
    pub frame_info_offset: u32,
    /// File offset of the element table.
    pub element_info_offset: u32,
    /// File offset of the raw byte log.
    pub raw_data_offset: u32,
}

impl FileHeader {
    /// On-disk size of the header.
    pub const SIZE: usize = 32;

    /// Header for a packed file with the given table sizes.
    pub fn for_counts(frame_count: u32, element_count: u32, raw_byte_count: u32) -> Self {
        let frame_info_offset = Self::SIZE as u32;
        let element_info_offset = frame_info_offset
            .saturating_add(frame_count.saturating_mul(FrameRecord::SIZE as u32));
        let raw_data_offset = element_info_offset
            .saturating_add(element_count.saturating_mul(ElementRecord::SIZE as u32));
        Self {
            magic: MAGIC,
            version: FORMAT_VERSION,
            frame_count,
            element_count,
            raw_byte_count,
            frame_info_offset,
            element_info_offset,
            raw_data_offset,
        }
    }
}

/// A decoded view of one element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Element<'a> {
    /// Bytes of one command.
    RegisterWrite(&'a [u8]),
    /// A memory write of `data` at `address`.
    MemoryUpdate {
        /// Physical address of the first byte.
        address: u32,
        /// Bytes to write.
        data: &'a [u8],
    },
}

/// A complete, validated recording.
///
/// Produced by [`Recorder::end`](crate::Recorder::end) or by loading a file.
///
/// # Examples
///
/// ```
/// use flipper_replay::{ElementKind, ElementRecord, FrameRecord, Recording};
///
/// let recording = Recording::from_parts(
///     vec![FrameRecord { base_element: 0, element_count: 1 }],
///     vec![ElementRecord { kind: ElementKind::RegisterWrite, offset: 0, size: 1 }],
///     vec![0x00],
/// )
/// .unwrap();
///
/// assert_eq!(recording.frame_count(), 1);
/// assert_eq!(recording.header().raw_data_offset, 32 + 8 + 12);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Recording {
    frames: Vec<FrameRecord>,
    elements: Vec<ElementRecord>,
    raw: Vec<u8>,
}

impl Recording {
    /// Build a recording from its three tables, validating every range.
    ///
    /// Frames must reference in-bounds, non-overlapping element ranges in
    /// order. Elements must reference in-bounds, non-overlapping byte
    /// ranges in order. Memory updates must carry a consistent size prefix.
    pub fn from_parts(
        frames: Vec<FrameRecord>,
        elements: Vec<ElementRecord>,
        raw: Vec<u8>,
    ) -> Result<Self, ReplayError> {
        let table_bytes = FileHeader::SIZE as u64
            + frames.len() as u64 * FrameRecord::SIZE as u64
            + elements.len() as u64 * ElementRecord::SIZE as u64;
        if table_bytes > u32::MAX as u64 || raw.len() as u64 > u32::MAX as u64 {
            return Err(ReplayError::malformed("recording exceeds u32 limits"));
        }

        let mut next_element = 0u64;
        for (i, frame) in frames.iter().enumerate() {
            let base = frame.base_element as u64;
            let end = base + frame.element_count as u64;
            if base < next_element {
                return Err(ReplayError::malformed(format!(
                    "frame {i} starts at element {base}, overlapping the previous frame"
                )));
            }
            if end > elements.len() as u64 {
                return Err(ReplayError::malformed(format!(
                    "frame {i} references elements {base}..{end} of {}",
                    elements.len()
                )));
            }
            next_element = end;
        }

        let mut next_byte = 0u64;
        for (i, element) in elements.iter().enumerate() {
            let start = element.offset as u64;
            let end = start + element.size as u64;
            if start < next_byte {
                return Err(ReplayError::malformed(format!(
                    "element {i} at offset {start} overlaps the previous element"
                )));
            }
            if end > raw.len() as u64 {
                return Err(ReplayError::malformed(format!(
                    "element {i} references bytes {start}..{end} of {}",
                    raw.len()
                )));
            }
            if element.kind == ElementKind::MemoryUpdate {
                check_memory_update(i, &raw[element.range()])?;
            }
            next_byte = end;
        }

        Ok(Self {
            frames,
            elements,
            raw,
        })
    }

    /// Assemble a recording whose ranges are correct by construction.
    pub(crate) fn from_recorded(
        frames: Vec<FrameRecord>,
        elements: Vec<ElementRecord>,
        raw: Vec<u8>,
    ) -> Self {
        Self {
            frames,
            elements,
            raw,
        }
    }

    /// Header describing this recording as a packed file.
    pub fn header(&self) -> FileHeader {
        FileHeader::for_counts(
            self.frames.len() as u32,
            self.elements.len() as u32,
            self.raw.len() as u32,
        )
    }

    /// All frame records.
    pub fn frames(&self) -> &[FrameRecord] {
        &self.frames
    }

    /// All element records.
    pub fn elements(&self) -> &[ElementRecord] {
        &self.elements
    }

    /// The raw byte log.
    pub fn raw_data(&self) -> &[u8] {
        &self.raw
    }

    /// Number of frames.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Number of elements across all frames.
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Whether the recording has no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Element records of frame `index`, or `None` if out of range.
    pub fn frame_elements(&self, index: usize) -> Option<&[ElementRecord]> {
        let frame = self.frames.get(index)?;
        self.elements.get(frame.range())
    }

    /// Bytes covered by `element`. Empty for a record not from this recording.
    pub fn element_bytes(&self, element: &ElementRecord) -> &[u8] {
        self.raw.get(element.range()).unwrap_or(&[])
    }

    /// Decode `element` into its typed view.
    pub fn element(&self, element: &ElementRecord) -> Element<'_> {
        let bytes = self.element_bytes(element);
        match element.kind {
            ElementKind::RegisterWrite => Element::RegisterWrite(bytes),
            ElementKind::MemoryUpdate => {
                let (address, data) = split_memory_update(bytes);
                Element::MemoryUpdate { address, data }
            }
        }
    }
}

fn check_memory_update(index: usize, bytes: &[u8]) -> Result<(), ReplayError> {
    if bytes.len() < MEMORY_UPDATE_HEADER_SIZE {
        return Err(ReplayError::malformed(format!(
            "memory update {index} is {} bytes, shorter than its header",
            bytes.len()
        )));
    }
    let declared = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    let actual = bytes.len() - MEMORY_UPDATE_HEADER_SIZE;
    if declared != actual {
        return Err(ReplayError::malformed(format!(
            "memory update {index} declares {declared} bytes but carries {actual}"
        )));
    }
    Ok(())
}

fn split_memory_update(bytes: &[u8]) -> (u32, &[u8]) {
    match bytes.get(..MEMORY_UPDATE_HEADER_SIZE) {
        Some(head) => {
            let address = u32::from_le_bytes([head[0], head[1], head[2], head[3]]);
            (address, &bytes[MEMORY_UPDATE_HEADER_SIZE..])
        }
        None => (0, &[]),
    }
}
