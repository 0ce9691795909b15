//! Opcode dispatch.
//!
//! [`Dispatcher`] pops one command from a stream, classifies it through
//! the [`OpcodeTable`] and forwards its operands to the backend. Display
//! list calls switch the source to a [`DisplayListCursor`] and run the
//! same dispatcher over the nested stream.
//!
//! Every command's consumption is measured against the length the oracle
//! computed for it. A mismatch means the stream is out of step and every
//! later byte would be misread, so it is reported as a fatal
//! [`FifoError::Desync`].

use flipper_core::{
    EmulatedMemory, FifoError, GraphicsBackend, Opcode, OpcodeClass, OpcodeTable, PeekSource,
    StreamSource,
};
use flipper_replay::Recorder;
use smallvec::SmallVec;
use tracing::{debug, error, trace, warn};

use crate::display_list::{DisplayListCursor, SourceMode};
use crate::metrics::ProcessorMetrics;
use crate::oracle::{command_length, CommandLength};

/// Borrowed view of the processor state a dispatch needs.
pub(crate) struct Dispatcher<'a, B: ?Sized, M: ?Sized> {
    pub backend: &'a mut B,
    pub memory: &'a M,
    pub table: &'a OpcodeTable,
    pub recorder: &'a mut Recorder,
    pub metrics: &'a mut ProcessorMetrics,
    pub mode: &'a mut SourceMode,
    pub memory_mask: u32,
}

impl<B, M> Dispatcher<'_, B, M>
where
    B: GraphicsBackend + ?Sized,
    M: EmulatedMemory + ?Sized,
{
    /// Execute the command at the front of `source`, whose total length
    /// is `expected`.
    ///
    /// The caller has established that `expected` bytes are present.
    /// `nested` is set for commands read from a display list.
    pub fn dispatch<S: StreamSource>(
        &mut self,
        source: &mut S,
        expected: usize,
        nested: bool,
    ) -> Result<OpcodeClass, FifoError> {
        let start = source.position();
        let opcode = Opcode(source.pop_u8());
        let class = self.table.classify(opcode);

        match class {
            OpcodeClass::Nop => trace!("nop"),
            OpcodeClass::LoadCpReg => {
                let addr = source.pop_u8();
                let value = source.pop_u32();
                debug!(addr, value, "load cp register");
                self.backend.write_cp(addr, value);
            }
            OpcodeClass::LoadXfReg => {
                let ctrl = source.pop_u32();
                let count = (ctrl >> 16) as usize + 1;
                let addr = (ctrl & 0xFFFF) as u16;
                let values: SmallVec<[u32; 16]> = (0..count).map(|_| source.pop_u32()).collect();
                debug!(addr, count, "load xf registers");
                self.backend.write_xf(addr, &values);
            }
            OpcodeClass::LoadIndexed(array) => {
                let index = source.pop_u16();
                let ctrl = source.pop_u16();
                let addr = ctrl & 0xFFF;
                let length = ((ctrl >> 12) + 1) as u8;
                debug!(?array, index, addr, length, "indexed xf load");
                self.backend.load_xf_indexed(array, index, addr, length);
            }
            OpcodeClass::CallDisplayList => {
                let address = source.pop_u32() & self.memory_mask;
                let length = source.pop_u32();
                if nested {
                    error!(address, length, "display list called from a display list");
                    return Err(FifoError::NestedDisplayList { address });
                }
                self.call_display_list(address, length)?;
            }
            OpcodeClass::InvalidateVertexCache => {
                trace!("invalidate vertex cache");
                self.backend.invalidate_vertex_cache();
            }
            OpcodeClass::LoadBpReg => {
                let word = source.pop_u32();
                let addr = (word >> 24) as u8;
                let value = word & 0x00FF_FFFF;
                debug!(addr, value, "load bp register");
                self.backend.write_bp(addr, value);
            }
            OpcodeClass::Draw(primitive) => {
                let count = source.pop_u16();
                let vat = opcode.vat();
                debug!(%primitive, vat, count, "draw");
                self.metrics.primitives += 1;
                self.metrics.vertices += count as u64;
                self.backend.submit_primitive(primitive, vat, count, source);
            }
            OpcodeClass::Unknown => {
                warn!(%opcode, nested, "no handler for opcode; dropping one byte");
                self.metrics.unknown_opcodes += 1;
            }
        }

        let consumed = (source.position() - start) as usize;
        if consumed != expected {
            self.metrics.desyncs += 1;
            error!(%opcode, expected, consumed, nested, "command stream desync");
            return Err(FifoError::Desync {
                opcode,
                expected,
                consumed,
            });
        }
        Ok(class)
    }

    /// Switch to display-list mode, run the list, and switch back.
    ///
    /// The primary mode is restored even when the list fails.
    fn call_display_list(&mut self, address: u32, length: u32) -> Result<(), FifoError> {
        *self.mode = SourceMode::DisplayList { address, length };
        self.metrics.display_lists += 1;
        debug!(address, length, "display list start");
        let result = self.run_display_list(address, length);
        *self.mode = SourceMode::PrimaryBuffer;
        debug!(address, ok = result.is_ok(), "display list end");
        result
    }

    fn run_display_list(&mut self, address: u32, length: u32) -> Result<(), FifoError> {
        let memory = self.memory;
        let mut cursor = DisplayListCursor::new(memory, address, length);
        while !cursor.is_exhausted() {
            let expected = match command_length(&cursor, self.table, &*self.backend) {
                CommandLength::Ready(len) => len,
                // Nested reads are unbounded, so only unknown classes reach here.
                _ => 1,
            };
            let opcode = Opcode(cursor.peek_u8(0));
            let bytes = (self.recorder.is_recording()
                && self.table.classify(opcode) != OpcodeClass::CallDisplayList)
                .then(|| cursor.peek_vec(expected));

            self.dispatch(&mut cursor, expected, true)?;

            if let Some(bytes) = bytes {
                self.recorder.record_command(&bytes);
            }
            self.metrics.nested_commands += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flipper_core::{IndexedArray, Primitive};
    use flipper_test_utils::{BackendCall, MockBackend, MockMemory};

    struct Harness {
        backend: MockBackend,
        memory: MockMemory,
        table: OpcodeTable,
        recorder: Recorder,
        metrics: ProcessorMetrics,
        mode: SourceMode,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                backend: MockBackend::new(4),
                memory: MockMemory::new(0x4000),
                table: OpcodeTable::new(),
                recorder: Recorder::new(),
                metrics: ProcessorMetrics::default(),
                mode: SourceMode::PrimaryBuffer,
            }
        }

        fn run(&mut self, bytes: &[u8]) -> Result<OpcodeClass, FifoError> {
            let mut src: &[u8] = bytes;
            let expected = match command_length(&src, &self.table, &self.backend) {
                CommandLength::Ready(n) => n,
                CommandLength::Unknown => 1,
                other => panic!("command not ready: {other:?}"),
            };
            let mut d = Dispatcher {
                backend: &mut self.backend,
                memory: &self.memory,
                table: &self.table,
                recorder: &mut self.recorder,
                metrics: &mut self.metrics,
                mode: &mut self.mode,
                memory_mask: 0x01FF_FFFF,
            };
            d.dispatch(&mut src, expected, false)
        }
    }

    #[test]
    fn load_cp_forwards_operands() {
        let mut h = Harness::new();
        h.run(&[0x08, 0x50, 0x12, 0x34, 0x56, 0x78]).unwrap();
        assert_eq!(h.backend.calls, vec![BackendCall::Cp(0x50, 0x1234_5678)]);
    }

    #[test]
    fn load_xf_pops_count_words() {
        let mut h = Harness::new();
        h.run(&[
            0x10, 0x00, 0x01, 0x10, 0x20, //
            0, 0, 0, 1, //
            0, 0, 0, 2,
        ])
        .unwrap();
        assert_eq!(h.backend.calls, vec![BackendCall::Xf(0x1020, vec![1, 2])]);
    }

    #[test]
    fn indexed_load_splits_control() {
        let mut h = Harness::new();
        h.run(&[0x30, 0x00, 0x07, 0xB0, 0x24]).unwrap();
        assert_eq!(
            h.backend.calls,
            vec![BackendCall::XfIndexed(IndexedArray::C, 7, 0x024, 12)]
        );
    }

    #[test]
    fn load_bp_splits_word() {
        let mut h = Harness::new();
        h.run(&[0x61, 0x45, 0x00, 0x00, 0x02]).unwrap();
        assert_eq!(h.backend.calls, vec![BackendCall::Bp(0x45, 0x000002)]);
    }

    #[test]
    fn draw_hands_vertices_to_backend() {
        let mut h = Harness::new();
        let mut bytes = vec![0x9B, 0x00, 0x02];
        bytes.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        h.run(&bytes).unwrap();
        assert_eq!(
            h.backend.calls,
            vec![BackendCall::Draw(
                Primitive::TriangleStrip,
                3,
                2,
                vec![1, 2, 3, 4, 5, 6, 7, 8]
            )]
        );
        assert_eq!(h.metrics.primitives, 1);
        assert_eq!(h.metrics.vertices, 2);
    }

    #[test]
    fn backend_under_consumption_is_desync() {
        let mut h = Harness::new();
        h.backend.short_read = 1;
        let err = h.run(&[0x80, 0x00, 0x01, 9, 9, 9, 9]).unwrap_err();
        assert_eq!(
            err,
            FifoError::Desync {
                opcode: Opcode(0x80),
                expected: 7,
                consumed: 6
            }
        );
        assert_eq!(h.metrics.desyncs, 1);
    }

    #[test]
    fn unknown_opcode_drops_one_byte() {
        let mut h = Harness::new();
        assert_eq!(h.run(&[0x18, 0xFF]).unwrap(), OpcodeClass::Unknown);
        assert_eq!(h.metrics.unknown_opcodes, 1);
        assert!(h.backend.calls.is_empty());
    }

    #[test]
    fn display_list_runs_nested_commands() {
        let mut h = Harness::new();
        h.memory.write(0x1000, &[0x00, 0x48]);
        h.recorder.start();
        h.run(&[0x40, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x02])
            .unwrap();
        assert_eq!(h.backend.calls, vec![BackendCall::InvalidateVertexCache]);
        assert_eq!(h.mode, SourceMode::PrimaryBuffer);
        assert_eq!(h.metrics.display_lists, 1);
        assert_eq!(h.metrics.nested_commands, 2);
        // Sub-commands are recorded individually.
        assert_eq!(h.recorder.end().unwrap().raw_data(), &[0x00, 0x48]);
    }

    #[test]
    fn display_list_address_is_masked() {
        let mut h = Harness::new();
        h.memory.write(0x2000, &[0x61, 0x45, 0x00, 0x00, 0x03]);
        // 0x8000_2000 & 0x01FF_FFFF = 0x2000
        h.run(&[0x40, 0x80, 0x00, 0x20, 0x00, 0x00, 0x00, 0x00, 0x05])
            .unwrap();
        assert_eq!(h.backend.calls, vec![BackendCall::Bp(0x45, 3)]);
    }

    #[test]
    fn nested_call_rejected_and_mode_restored() {
        let mut h = Harness::new();
        h.memory
            .write(0x1000, &[0x40, 0x00, 0x00, 0x20, 0x00, 0x00, 0x00, 0x00, 0x01]);
        let err = h
            .run(&[0x40, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x09])
            .unwrap_err();
        assert_eq!(err, FifoError::NestedDisplayList { address: 0x2000 });
        assert_eq!(h.mode, SourceMode::PrimaryBuffer);
    }

    #[test]
    fn nested_desync_propagates() {
        let mut h = Harness::new();
        h.backend.short_read = 2;
        h.memory.write(0x1000, &[0x80, 0x00, 0x01, 1, 2, 3, 4]);
        let err = h
            .run(&[0x40, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x07])
            .unwrap_err();
        assert!(matches!(
            err,
            FifoError::Desync {
                expected: 7,
                consumed: 5,
                ..
            }
        ));
        assert_eq!(h.mode, SourceMode::PrimaryBuffer);
    }
}
