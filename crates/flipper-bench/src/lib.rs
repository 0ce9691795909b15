//! Benchmark workloads for the Flipper command processor.
//!
//! Provides deterministic command streams shaped like a game frame:
//!
//! - [`reference_frame`]: register setup followed by a run of small draws
//! - [`display_list_frame`]: the same draws stored in memory and called
//!   through one display list
//! - [`reference_config`]: a buffer large enough for either

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use flipper_core::{IndexedArray, Primitive};
use flipper_engine::ProcessorConfig;
use flipper_test_utils::fixtures::CommandStream;
use flipper_test_utils::MockMemory;

/// Vertex size every benchmark backend reports, in bytes.
pub const VERTEX_SIZE: u32 = 12;

/// Address the display-list workload stores its list at.
pub const DISPLAY_LIST_ADDRESS: u32 = 0x0010_0000;

/// Processor configuration used by the benchmarks: a 4 MiB buffer that
/// rewinds once 3 MiB have been consumed.
pub fn reference_config() -> ProcessorConfig {
    ProcessorConfig {
        fifo_capacity: 4 << 20,
        tail_end: 3 << 20,
        ..ProcessorConfig::default()
    }
}

fn draws(mut stream: CommandStream, count: usize) -> CommandStream {
    let vertices = [0x5Au8; 3 * VERTEX_SIZE as usize];
    for i in 0..count {
        stream = stream
            .load_indexed(IndexedArray::A, i as u16, 0, 12)
            .load_bp(0x28, i as u32)
            .draw(Primitive::Triangles, (i % 8) as u8, 3, &vertices);
    }
    stream
}

fn setup() -> CommandStream {
    let matrix: Vec<u32> = (0..12).map(|i| 0x3F80_0000 + i).collect();
    (0..8u8)
        .fold(CommandStream::new(), |s, vat| {
            s.load_cp(0x70 + vat, 0x4000_0000 | vat as u32)
        })
        .load_xf(0x0000, &matrix)
        .invalidate_vertex_cache()
}

/// One frame issuing `draws_per_frame` triangles straight from the buffer.
pub fn reference_frame(draws_per_frame: usize) -> Vec<u8> {
    draws(setup(), draws_per_frame).into_bytes()
}

/// One frame issuing `draws_per_frame` triangles through a display list.
///
/// Returns the primary-buffer bytes and the memory holding the list.
pub fn display_list_frame(draws_per_frame: usize) -> (Vec<u8>, MockMemory) {
    let list = draws(CommandStream::new(), draws_per_frame);
    let mut memory = MockMemory::new(DISPLAY_LIST_ADDRESS as usize + list.len() + 4);
    memory.write(DISPLAY_LIST_ADDRESS, list.as_bytes());
    let stream = setup().call_display_list(DISPLAY_LIST_ADDRESS, list.len() as u32);
    (stream.into_bytes(), memory)
}
