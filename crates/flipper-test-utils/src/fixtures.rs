//! Encoded command builders.
//!
//! [`CommandStream`] appends commands in wire order (big-endian operands)
//! so tests can state a stream as a sequence of calls instead of raw
//! bytes.

use flipper_core::{IndexedArray, Opcode, Primitive};

/// Opcode byte for an indexed load through `array`.
pub fn indexed_opcode(array: IndexedArray) -> Opcode {
    match array {
        IndexedArray::A => Opcode::LOAD_INDX_A,
        IndexedArray::B => Opcode::LOAD_INDX_B,
        IndexedArray::C => Opcode::LOAD_INDX_C,
        IndexedArray::D => Opcode::LOAD_INDX_D,
    }
}

/// Builder for an encoded command stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandStream {
    bytes: Vec<u8>,
}

impl CommandStream {
    pub fn new() -> Self {
        Self::default()
    }

    fn op(mut self, opcode: Opcode) -> Self {
        self.bytes.push(opcode.0);
        self
    }

    fn u16(mut self, v: u16) -> Self {
        self.bytes.extend_from_slice(&v.to_be_bytes());
        self
    }

    fn u32(mut self, v: u32) -> Self {
        self.bytes.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn nop(self) -> Self {
        self.op(Opcode::NOP)
    }

    pub fn load_cp(mut self, addr: u8, value: u32) -> Self {
        self = self.op(Opcode::LOAD_CP_REG);
        self.bytes.push(addr);
        self.u32(value)
    }

    /// Bulk transform load. `values` must not be empty.
    pub fn load_xf(self, addr: u16, values: &[u32]) -> Self {
        assert!(!values.is_empty(), "xf load needs at least one value");
        let ctrl = ((values.len() as u32 - 1) << 16) | addr as u32;
        values
            .iter()
            .fold(self.op(Opcode::LOAD_XF_REG).u32(ctrl), |s, &v| s.u32(v))
    }

    /// Indexed load of `length` (1..=16) words.
    pub fn load_indexed(self, array: IndexedArray, index: u16, addr: u16, length: u8) -> Self {
        let ctrl = (((length as u16 - 1) & 0xF) << 12) | (addr & 0xFFF);
        self.op(indexed_opcode(array)).u16(index).u16(ctrl)
    }

    pub fn call_display_list(self, address: u32, length: u32) -> Self {
        self.op(Opcode::CALL_DISPLAYLIST).u32(address).u32(length)
    }

    pub fn invalidate_vertex_cache(self) -> Self {
        self.op(Opcode::INVALIDATE_VERTEX_CACHE)
    }

    /// Blending-processor write; `value` is truncated to 24 bits.
    pub fn load_bp(self, addr: u8, value: u32) -> Self {
        self.op(Opcode::LOAD_BP_REG)
            .u32(((addr as u32) << 24) | (value & 0x00FF_FFFF))
    }

    /// Draw with raw vertex bytes appended after the count.
    pub fn draw(mut self, primitive: Primitive, vat: u8, count: u16, vertices: &[u8]) -> Self {
        self = self.op(primitive.opcode().with_vat(vat)).u16(count);
        self.bytes.extend_from_slice(vertices);
        self
    }

    /// Arbitrary bytes, e.g. an unknown opcode.
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
