//! Byte-cursor traits shared by the primary buffer and display lists.
//!
//! Multi-byte values are big-endian on the wire. The provided methods
//! assemble them from single-byte pops so implementors only need
//! [`StreamSource::pop_u8`] and [`StreamSource::position`].

/// A consuming cursor over a command stream.
///
/// Pops have no bounds checking: callers establish that enough bytes are
/// present (the length oracle for the primary buffer, the nested length
/// for display lists) before popping.
pub trait StreamSource {
    /// Pop one byte and advance the cursor.
    fn pop_u8(&mut self) -> u8;

    /// Number of bytes popped since the cursor was created.
    ///
    /// Used to measure how many bytes a handler consumed.
    fn position(&self) -> u64;

    /// Pop a big-endian 16-bit value.
    fn pop_u16(&mut self) -> u16 {
        let hi = self.pop_u8() as u16;
        let lo = self.pop_u8() as u16;
        (hi << 8) | lo
    }

    /// Pop a big-endian 24-bit value from three byte pops.
    fn pop_u24(&mut self) -> u32 {
        let b0 = self.pop_u8() as u32;
        let b1 = self.pop_u8() as u32;
        let b2 = self.pop_u8() as u32;
        (b0 << 16) | (b1 << 8) | b2
    }

    /// Pop a big-endian 32-bit value.
    fn pop_u32(&mut self) -> u32 {
        let hi = self.pop_u16() as u32;
        let lo = self.pop_u16() as u32;
        (hi << 16) | lo
    }

    /// Pop `out.len()` bytes into `out`.
    fn pop_into(&mut self, out: &mut [u8]) {
        for b in out.iter_mut() {
            *b = self.pop_u8();
        }
    }
}

/// Non-consuming view of the bytes ahead of a cursor.
pub trait PeekSource {
    /// Number of bytes that may be peeked.
    fn available(&self) -> usize;

    /// The byte `offset` positions ahead of the cursor.
    fn peek_u8(&self, offset: usize) -> u8;

    /// Big-endian 16-bit value at `offset`.
    fn peek_u16(&self, offset: usize) -> u16 {
        ((self.peek_u8(offset) as u16) << 8) | self.peek_u8(offset + 1) as u16
    }

    /// Big-endian 32-bit value at `offset`.
    fn peek_u32(&self, offset: usize) -> u32 {
        ((self.peek_u16(offset) as u32) << 16) | self.peek_u16(offset + 2) as u32
    }

    /// Copy `len` bytes starting at the cursor.
    fn peek_vec(&self, len: usize) -> Vec<u8> {
        (0..len).map(|i| self.peek_u8(i)).collect()
    }
}

/// A cursor over an in-memory byte slice.
///
/// Used for decoding recorded elements and in tests.
impl StreamSource for &[u8] {
    fn pop_u8(&mut self) -> u8 {
        let first = self[0];
        *self = &self[1..];
        first
    }

    fn position(&self) -> u64 {
        // Slices only shrink; callers compare differences, so count down
        // from the maximum.
        u64::MAX - self.len() as u64
    }
}

impl PeekSource for &[u8] {
    fn available(&self) -> usize {
        self.len()
    }

    fn peek_u8(&self, offset: usize) -> u8 {
        self[offset]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_endian_pops() {
        let bytes = [0x12u8, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0, 0x01];
        let mut src: &[u8] = &bytes;
        assert_eq!(src.pop_u16(), 0x1234);
        assert_eq!(src.pop_u24(), 0x56789A);
        assert_eq!(src.pop_u32(), 0xBCDEF001);
        assert_eq!(src.available(), 0);
    }

    #[test]
    fn position_tracks_consumption() {
        let bytes = [0u8; 8];
        let mut src: &[u8] = &bytes;
        let start = src.position();
        src.pop_u32();
        src.pop_u8();
        assert_eq!(src.position() - start, 5);
    }

    #[test]
    fn peeks_do_not_consume() {
        let bytes = [0x10u8, 0x00, 0x01, 0x00, 0x20];
        let src: &[u8] = &bytes;
        assert_eq!(src.peek_u8(0), 0x10);
        assert_eq!(src.peek_u32(1), 0x0001_0020);
        assert_eq!(src.peek_u16(3), 0x0020);
        assert_eq!(src.peek_vec(2), vec![0x10, 0x00]);
        assert_eq!(src.available(), 5);
    }
}
