//! Hashing utilities for recording comparison.
//!
//! Uses FNV-1a for fast, deterministic hashing. These hashes are not
//! cryptographically secure; they are used for quick equality checks
//! between two captures of the same workload.

use crate::types::{ElementRecord, Recording};

/// FNV-1a offset basis for 64-bit.
const FNV_OFFSET: u64 = 0xcbf29ce484222325;
/// FNV-1a prime for 64-bit.
const FNV_PRIME: u64 = 0x00000100000001B3;

/// Feed a single byte into an FNV-1a hash state.
#[inline]
fn fnv1a_byte(hash: u64, byte: u8) -> u64 {
    (hash ^ byte as u64).wrapping_mul(FNV_PRIME)
}

/// Feed a u32 (as 4 LE bytes) into an FNV-1a hash state.
#[inline]
fn fnv1a_u32(mut hash: u64, v: u32) -> u64 {
    for &b in &v.to_le_bytes() {
        hash = fnv1a_byte(hash, b);
    }
    hash
}

fn fold_element(mut hash: u64, recording: &Recording, element: &ElementRecord) -> u64 {
    hash = fnv1a_u32(hash, element.kind.tag());
    hash = fnv1a_u32(hash, element.size);
    for &b in recording.element_bytes(element) {
        hash = fnv1a_byte(hash, b);
    }
    hash
}

/// Hash the elements of frame `index`.
///
/// Element kinds and boundaries are folded in, so two frames with the same
/// bytes split differently hash differently. Raw offsets are not hashed.
/// Returns `None` if the frame does not exist.
pub fn frame_hash(recording: &Recording, index: usize) -> Option<u64> {
    let elements = recording.frame_elements(index)?;
    let mut hash = fnv1a_u32(FNV_OFFSET, elements.len() as u32);
    for element in elements {
        hash = fold_element(hash, recording, element);
    }
    Some(hash)
}

/// Hash a whole recording, frame by frame.
///
/// Returns `FNV_OFFSET` folded with a zero frame count for an empty
/// recording.
pub fn recording_hash(recording: &Recording) -> u64 {
    let mut hash = fnv1a_u32(FNV_OFFSET, recording.frame_count() as u32);
    for index in 0..recording.frame_count() {
        if let Some(h) = frame_hash(recording, index) {
            for &b in &h.to_le_bytes() {
                hash = fnv1a_byte(hash, b);
            }
        }
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::Recorder;

    fn record(frames: &[&[&[u8]]]) -> Recording {
        let mut rec = Recorder::new();
        rec.start();
        for (i, frame) in frames.iter().enumerate() {
            if i > 0 {
                rec.finish_frame();
            }
            for command in frame.iter() {
                rec.record_command(command);
            }
        }
        rec.end().cloned().unwrap()
    }

    #[test]
    fn same_stream_same_hash() {
        let a = record(&[&[&[0x00], &[0x48]], &[&[0x00]]]);
        let b = record(&[&[&[0x00], &[0x48]], &[&[0x00]]]);
        assert_eq!(recording_hash(&a), recording_hash(&b));
        assert_eq!(frame_hash(&a, 1), frame_hash(&b, 1));
    }

    #[test]
    fn element_boundaries_matter() {
        let a = record(&[&[&[0x00, 0x00]]]);
        let b = record(&[&[&[0x00], &[0x00]]]);
        assert_ne!(frame_hash(&a, 0), frame_hash(&b, 0));
    }

    #[test]
    fn frame_boundaries_matter() {
        let a = record(&[&[&[0x00], &[0x00]]]);
        let b = record(&[&[&[0x00]], &[&[0x00]]]);
        assert_ne!(recording_hash(&a), recording_hash(&b));
    }

    #[test]
    fn missing_frame_has_no_hash() {
        let a = record(&[&[&[0x00]]]);
        assert!(frame_hash(&a, 1).is_none());
    }

    #[test]
    fn empty_recording_hash_is_deterministic() {
        let empty = Recording::default();
        assert_eq!(recording_hash(&empty), fnv1a_u32(FNV_OFFSET, 0));
    }
}
