//! Binary encode/decode for the recording format.
//!
//! All integers are little-endian `u32`. The layout is a fixed header
//! followed by the frame table, the element table and the raw byte log,
//! each at the offset the header names.

use std::io::{Read, Write};

use crate::error::ReplayError;
use crate::types::*;
use crate::{FORMAT_VERSION, MAGIC};

// ── Primitive writers ───────────────────────────────────────────

/// Write a little-endian u32.
pub fn write_u32_le(w: &mut dyn Write, v: u32) -> Result<(), ReplayError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

// ── Primitive readers ───────────────────────────────────────────

/// Read a little-endian u32.
pub fn read_u32_le(r: &mut dyn Read) -> Result<u32, ReplayError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn u32_at(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Read exactly `len` bytes of `section`, reporting a short read as
/// [`ReplayError::Truncated`].
fn read_section(r: &mut dyn Read, section: Section, len: u64) -> Result<Vec<u8>, ReplayError> {
    let mut buf = Vec::new();
    r.take(len).read_to_end(&mut buf)?;
    if (buf.len() as u64) < len {
        return Err(ReplayError::Truncated {
            section,
            expected: len,
            actual: buf.len() as u64,
        });
    }
    Ok(buf)
}

// ── Header encode/decode ────────────────────────────────────────

/// Encode the fixed file header.
pub fn encode_header(w: &mut dyn Write, header: &FileHeader) -> Result<(), ReplayError> {
    write_u32_le(w, header.magic)?;
    write_u32_le(w, header.version)?;
    write_u32_le(w, header.frame_count)?;
    write_u32_le(w, header.element_count)?;
    write_u32_le(w, header.raw_byte_count)?;
    write_u32_le(w, header.frame_info_offset)?;
    write_u32_le(w, header.element_info_offset)?;
    write_u32_le(w, header.raw_data_offset)?;
    Ok(())
}

/// Decode and validate the fixed file header.
///
/// Checks the magic number, then the version, then that the section
/// offsets are ordered and leave room for the tables they precede.
pub fn decode_header(r: &mut dyn Read) -> Result<FileHeader, ReplayError> {
    let bytes = read_section(r, Section::Header, FileHeader::SIZE as u64)?;

    let magic = u32_at(&bytes, 0);
    if magic != MAGIC {
        return Err(ReplayError::InvalidMagic { found: magic });
    }
    let version = u32_at(&bytes, 4);
    if version != FORMAT_VERSION {
        return Err(ReplayError::UnsupportedVersion { found: version });
    }

    let header = FileHeader {
        magic,
        version,
        frame_count: u32_at(&bytes, 8),
        element_count: u32_at(&bytes, 12),
        raw_byte_count: u32_at(&bytes, 16),
        frame_info_offset: u32_at(&bytes, 20),
        element_info_offset: u32_at(&bytes, 24),
        raw_data_offset: u32_at(&bytes, 28),
    };
    check_layout(&header)?;
    Ok(header)
}

fn check_layout(h: &FileHeader) -> Result<(), ReplayError> {
    let frames_end =
        h.frame_info_offset as u64 + h.frame_count as u64 * FrameRecord::SIZE as u64;
    let elements_end =
        h.element_info_offset as u64 + h.element_count as u64 * ElementRecord::SIZE as u64;

    if (h.frame_info_offset as usize) < FileHeader::SIZE {
        return Err(ReplayError::malformed(format!(
            "frame info offset {} lies inside the header",
            h.frame_info_offset
        )));
    }
    if (h.element_info_offset as u64) < frames_end {
        return Err(ReplayError::malformed(format!(
            "element info offset {} overlaps the frame table ending at {frames_end}",
            h.element_info_offset
        )));
    }
    if (h.raw_data_offset as u64) < elements_end {
        return Err(ReplayError::malformed(format!(
            "raw data offset {} overlaps the element table ending at {elements_end}",
            h.raw_data_offset
        )));
    }
    Ok(())
}

// ── Table encode/decode ─────────────────────────────────────────

/// Encode one frame record.
pub fn encode_frame_record(w: &mut dyn Write, frame: &FrameRecord) -> Result<(), ReplayError> {
    write_u32_le(w, frame.base_element)?;
    write_u32_le(w, frame.element_count)?;
    Ok(())
}

/// Encode one element record.
pub fn encode_element_record(
    w: &mut dyn Write,
    element: &ElementRecord,
) -> Result<(), ReplayError> {
    write_u32_le(w, element.kind.tag())?;
    write_u32_le(w, element.offset)?;
    write_u32_le(w, element.size)?;
    Ok(())
}

fn decode_frame_table(bytes: &[u8]) -> Vec<FrameRecord> {
    bytes
        .chunks_exact(FrameRecord::SIZE)
        .map(|c| FrameRecord {
            base_element: u32_at(c, 0),
            element_count: u32_at(c, 4),
        })
        .collect()
}

fn decode_element_table(bytes: &[u8]) -> Result<Vec<ElementRecord>, ReplayError> {
    bytes
        .chunks_exact(ElementRecord::SIZE)
        .enumerate()
        .map(|(i, c)| {
            let tag = u32_at(c, 0);
            let kind = ElementKind::from_tag(tag)
                .ok_or(ReplayError::UnknownElementKind { element: i, kind: tag })?;
            Ok(ElementRecord {
                kind,
                offset: u32_at(c, 4),
                size: u32_at(c, 8),
            })
        })
        .collect()
}

/// Skip the gap between the current position and the next section.
fn skip_to(
    r: &mut dyn Read,
    section: Section,
    position: u64,
    offset: u32,
) -> Result<(), ReplayError> {
    let gap = offset as u64 - position;
    if gap > 0 {
        read_section(r, section, gap)?;
    }
    Ok(())
}

// ── Recording encode/decode ─────────────────────────────────────

/// Encode a complete recording as a packed file.
pub fn encode_recording(w: &mut dyn Write, recording: &Recording) -> Result<(), ReplayError> {
    encode_header(w, &recording.header())?;
    for frame in recording.frames() {
        encode_frame_record(w, frame)?;
    }
    for element in recording.elements() {
        encode_element_record(w, element)?;
    }
    w.write_all(recording.raw_data())?;
    Ok(())
}

/// Decode and fully validate a recording.
///
/// Every section is read to its declared length before any range is
/// checked. A short section fails with [`ReplayError::Truncated`] naming
/// it; nothing is returned until the whole file has been validated.
pub fn decode_recording(r: &mut dyn Read) -> Result<Recording, ReplayError> {
    let header = decode_header(r)?;
    let mut position = FileHeader::SIZE as u64;

    skip_to(r, Section::FrameInfo, position, header.frame_info_offset)?;
    let frame_len = header.frame_count as u64 * FrameRecord::SIZE as u64;
    let frame_bytes = read_section(r, Section::FrameInfo, frame_len)?;
    position = header.frame_info_offset as u64 + frame_len;

    skip_to(r, Section::ElementInfo, position, header.element_info_offset)?;
    let element_len = header.element_count as u64 * ElementRecord::SIZE as u64;
    let element_bytes = read_section(r, Section::ElementInfo, element_len)?;
    position = header.element_info_offset as u64 + element_len;

    skip_to(r, Section::RawData, position, header.raw_data_offset)?;
    let raw = read_section(r, Section::RawData, header.raw_byte_count as u64)?;

    let frames = decode_frame_table(&frame_bytes);
    let elements = decode_element_table(&element_bytes)?;
    Recording::from_parts(frames, elements, raw)
}
