//! Test utilities and mock types for Flipper development.
//!
//! Provides mock implementations of the collaborator traits
//! ([`GraphicsBackend`] via [`MockBackend`], [`EmulatedMemory`] via
//! [`MockMemory`]) and byte builders for encoded commands in
//! [`fixtures`].
//!
//! [`GraphicsBackend`]: flipper_core::GraphicsBackend

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use flipper_core::{
    EmulatedMemory, IndexedArray, Primitive, PrimitiveSink, RegisterSink, StreamSource,
    VertexFormat,
};

/// One call observed by [`MockBackend`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendCall {
    Cp(u8, u32),
    Bp(u8, u32),
    Xf(u16, Vec<u32>),
    XfIndexed(IndexedArray, u16, u16, u8),
    InvalidateVertexCache,
    /// Primitive, VAT, vertex count, and the vertex bytes popped.
    Draw(Primitive, u8, u16, Vec<u8>),
}

/// Backend that logs every call.
///
/// Every VAT starts with the same vertex size; change one with
/// [`set_vertex_size`](MockBackend::set_vertex_size).
#[derive(Clone, Debug, Default)]
pub struct MockBackend {
    pub calls: Vec<BackendCall>,
    /// Bytes left unread by each draw, to provoke desyncs.
    pub short_read: usize,
    vertex_sizes: [u32; 8],
}

impl MockBackend {
    pub fn new(vertex_size: u32) -> Self {
        Self {
            calls: Vec::new(),
            short_read: 0,
            vertex_sizes: [vertex_size; 8],
        }
    }

    pub fn set_vertex_size(&mut self, vat: u8, size: u32) {
        self.vertex_sizes[(vat & 7) as usize] = size;
    }

    /// Number of draws seen so far.
    pub fn draw_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, BackendCall::Draw(..)))
            .count()
    }
}

impl VertexFormat for MockBackend {
    fn vertex_size(&self, vat: u8) -> u32 {
        self.vertex_sizes[(vat & 7) as usize]
    }
}

impl RegisterSink for MockBackend {
    fn write_cp(&mut self, addr: u8, value: u32) {
        self.calls.push(BackendCall::Cp(addr, value));
    }

    fn write_bp(&mut self, addr: u8, value: u32) {
        self.calls.push(BackendCall::Bp(addr, value));
    }

    fn write_xf(&mut self, addr: u16, values: &[u32]) {
        self.calls.push(BackendCall::Xf(addr, values.to_vec()));
    }

    fn load_xf_indexed(&mut self, array: IndexedArray, index: u16, addr: u16, length: u8) {
        self.calls
            .push(BackendCall::XfIndexed(array, index, addr, length));
    }

    fn invalidate_vertex_cache(&mut self) {
        self.calls.push(BackendCall::InvalidateVertexCache);
    }
}

impl PrimitiveSink for MockBackend {
    fn submit_primitive(
        &mut self,
        primitive: Primitive,
        vat: u8,
        vertex_count: u16,
        vertices: &mut dyn StreamSource,
    ) {
        let total = vertex_count as usize * self.vertex_size(vat) as usize;
        let mut bytes = vec![0; total.saturating_sub(self.short_read)];
        vertices.pop_into(&mut bytes);
        self.calls
            .push(BackendCall::Draw(primitive, vat, vertex_count, bytes));
    }
}

/// Flat emulated memory. Reads past the end return zero.
#[derive(Clone, Debug, Default)]
pub struct MockMemory {
    bytes: Vec<u8>,
}

impl MockMemory {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
        }
    }

    /// Store `data` so that a display list at `address` reads it back in
    /// order, i.e. byte `i` lands at `(address + i) ^ 3`.
    pub fn write(&mut self, address: u32, data: &[u8]) {
        for (i, &b) in data.iter().enumerate() {
            let physical = (address.wrapping_add(i as u32) ^ 3) as usize;
            if physical >= self.bytes.len() {
                self.bytes.resize(physical + 1, 0);
            }
            self.bytes[physical] = b;
        }
    }
}

impl EmulatedMemory for MockMemory {
    fn read_byte(&self, physical_address: u32) -> u8 {
        self.bytes
            .get(physical_address as usize)
            .copied()
            .unwrap_or(0)
    }
}
