//! Interfaces of the collaborators the command processor drives.
//!
//! The decoder owns none of the rendering state. It forwards fully
//! parsed operands through these traits and treats their side effects
//! as opaque.

use crate::opcode::{IndexedArray, Primitive};
use crate::stream::StreamSource;

/// Vertex layout information owned by the vertex subsystem.
pub trait VertexFormat {
    /// Size in bytes of one vertex described by attribute table `vat`.
    ///
    /// Consulted by the length oracle before a draw is decoded, so it
    /// must reflect every register write already dispatched.
    fn vertex_size(&self, vat: u8) -> u32;
}

/// Sinks for register writes decoded from the stream.
pub trait RegisterSink {
    /// Command-processor register write.
    fn write_cp(&mut self, addr: u8, value: u32);

    /// Blending-processor register write. `value` is 24 bits wide.
    fn write_bp(&mut self, addr: u8, value: u32);

    /// Transform-unit register run starting at `addr`.
    fn write_xf(&mut self, addr: u16, values: &[u32]);

    /// Indexed transform load of `length` words into `addr`, fetched from
    /// entry `index` of `array`.
    fn load_xf_indexed(&mut self, array: IndexedArray, index: u16, addr: u16, length: u8);

    /// Vertex cache invalidation. Most backends have nothing to do.
    fn invalidate_vertex_cache(&mut self) {}
}

/// Receiver of primitive draws.
pub trait PrimitiveSink {
    /// Submit a primitive of `vertex_count` vertices using table `vat`.
    ///
    /// The vertex data follows in `vertices`; the implementation must pop
    /// exactly `vertex_count * vertex_size(vat)` bytes from it. Any other
    /// amount desynchronizes the stream and is reported as a fatal error.
    fn submit_primitive(
        &mut self,
        primitive: Primitive,
        vat: u8,
        vertex_count: u16,
        vertices: &mut dyn StreamSource,
    );
}

/// Read access to emulated main memory, used by display lists.
pub trait EmulatedMemory {
    /// Read the byte stored at `physical_address`.
    fn read_byte(&self, physical_address: u32) -> u8;
}

/// Everything the dispatcher needs from the rendering side.
///
/// Blanket-implemented for any type providing the three parts.
pub trait GraphicsBackend: VertexFormat + RegisterSink + PrimitiveSink {}

impl<T: VertexFormat + RegisterSink + PrimitiveSink> GraphicsBackend for T {}

impl<M: EmulatedMemory + ?Sized> EmulatedMemory for &M {
    fn read_byte(&self, physical_address: u32) -> u8 {
        (**self).read_byte(physical_address)
    }
}

impl<M: EmulatedMemory + ?Sized> EmulatedMemory for std::sync::Arc<M> {
    fn read_byte(&self, physical_address: u32) -> u8 {
        (**self).read_byte(physical_address)
    }
}
