//! The command processor: consumer-side owner of all decode state.
//!
//! [`CommandProcessor`] holds the consumer end of the command buffer, the
//! opcode table, the length oracle, the recorder, and the collaborators.
//! Hosts drive it cooperatively with [`poll`](CommandProcessor::poll) or
//! [`run`](CommandProcessor::run); neither blocks.

use flipper_core::{
    EmulatedMemory, FifoError, GraphicsBackend, Opcode, OpcodeClass, OpcodeTable, PeekSource,
};
use flipper_replay::{Recorder, Recording};
use tracing::{error, info, trace, warn};

use crate::buffer::{fifo, FifoConsumer, FifoProducer};
use crate::config::{ConfigError, ProcessorConfig};
use crate::dispatch::Dispatcher;
use crate::display_list::SourceMode;
use crate::metrics::ProcessorMetrics;
use crate::oracle::{CommandLength, LengthOracle};

/// Outcome of one [`CommandProcessor::poll`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Poll {
    /// The buffer is empty.
    Idle,
    /// A command is partially present; at least `required` bytes are needed.
    Pending {
        /// Bytes needed before the command can be decoded.
        required: usize,
    },
    /// One command was decoded and dispatched.
    Decoded {
        /// Its opcode byte.
        opcode: Opcode,
        /// Its length in the primary buffer.
        length: usize,
    },
    /// An opcode with no handler was dropped.
    Dropped {
        /// The dropped byte.
        opcode: Opcode,
    },
}

/// A command decoded by [`CommandProcessor::decode_next`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodedCommand {
    /// Opcode byte.
    pub opcode: Opcode,
    /// Class it was dispatched as. [`OpcodeClass::Unknown`] for drops.
    pub class: OpcodeClass,
    /// Bytes consumed from the primary buffer.
    pub length: usize,
}

/// Consumer-side command decoder.
///
/// Generic over the graphics backend `B` and the emulated memory `M` that
/// display lists read from.
///
/// # Examples
///
/// ```
/// use flipper_engine::{CommandProcessor, Poll, ProcessorConfig};
/// use flipper_test_utils::{BackendCall, MockBackend, MockMemory};
///
/// let (mut producer, mut cp) = CommandProcessor::with_buffer(
///     ProcessorConfig::default(),
///     MockBackend::new(0),
///     MockMemory::new(0x100),
/// )
/// .unwrap();
///
/// producer.push(&[0x08, 0x50, 0x00, 0x00]).unwrap();
/// assert_eq!(cp.poll().unwrap(), Poll::Pending { required: 6 });
///
/// producer.push(&[0x00, 0x2A]).unwrap();
/// assert!(matches!(cp.poll().unwrap(), Poll::Decoded { length: 6, .. }));
/// assert_eq!(cp.backend().calls, vec![BackendCall::Cp(0x50, 0x2A)]);
/// ```
pub struct CommandProcessor<B, M> {
    consumer: FifoConsumer,
    backend: B,
    memory: M,
    table: OpcodeTable,
    oracle: LengthOracle,
    recorder: Recorder,
    metrics: ProcessorMetrics,
    mode: SourceMode,
    memory_mask: u32,
    halted: Option<FifoError>,
}

impl<B: GraphicsBackend, M: EmulatedMemory> CommandProcessor<B, M> {
    /// Build a processor around an existing consumer handle.
    pub fn new(config: &ProcessorConfig, consumer: FifoConsumer, backend: B, memory: M) -> Self {
        Self {
            consumer,
            backend,
            memory,
            table: OpcodeTable::new(),
            oracle: LengthOracle::new(),
            recorder: Recorder::new(),
            metrics: ProcessorMetrics::default(),
            mode: SourceMode::PrimaryBuffer,
            memory_mask: config.memory_mask,
            halted: None,
        }
    }

    /// Validate `config`, allocate the command buffer, and return its
    /// producer handle together with the processor.
    pub fn with_buffer(
        config: ProcessorConfig,
        backend: B,
        memory: M,
    ) -> Result<(FifoProducer, Self), ConfigError> {
        config.validate()?;
        let (producer, consumer) = fifo(config.fifo_capacity, config.tail_end);
        Ok((producer, Self::new(&config, consumer, backend, memory)))
    }

    /// Replace the opcode table. Classes left unknown are dropped byte by
    /// byte.
    pub fn with_table(mut self, table: OpcodeTable) -> Self {
        self.table = table;
        self
    }

    // ── Decoding ────────────────────────────────────────────────

    /// Readiness of the next command, consulting the cached requirement.
    pub fn next_command_ready(&mut self) -> CommandLength {
        self.oracle
            .check(&self.consumer, &self.table, &self.backend)
    }

    /// Run one cooperative step: decode at most one command.
    pub fn poll(&mut self) -> Result<Poll, FifoError> {
        self.check_halted()?;
        match self.next_command_ready() {
            CommandLength::Empty => Ok(Poll::Idle),
            CommandLength::Incomplete(required) => {
                self.metrics.pending_polls += 1;
                if required > self.consumer.capacity() {
                    let opcode = Opcode(self.consumer.peek_u8(0));
                    error!(%opcode, required, "command can never fit in the buffer");
                    return Err(self.halt(FifoError::CommandTooLarge {
                        opcode,
                        required,
                        capacity: self.consumer.capacity(),
                    }));
                }
                trace!(required, "command pending");
                Ok(Poll::Pending { required })
            }
            CommandLength::Unknown => {
                let decoded = self.decode(1)?;
                Ok(Poll::Dropped {
                    opcode: decoded.opcode,
                })
            }
            CommandLength::Ready(length) => {
                let decoded = self.decode(length)?;
                Ok(Poll::Decoded {
                    opcode: decoded.opcode,
                    length,
                })
            }
        }
    }

    /// Decode the next command, which must already be complete.
    ///
    /// Fails with [`FifoError::NotReady`] when the oracle does not report
    /// the command as complete.
    pub fn decode_next(&mut self) -> Result<DecodedCommand, FifoError> {
        self.check_halted()?;
        match self.next_command_ready() {
            CommandLength::Ready(length) => self.decode(length),
            CommandLength::Unknown => self.decode(1),
            CommandLength::Incomplete(required) => Err(FifoError::NotReady {
                required,
                available: self.consumer.bytes_available(),
            }),
            CommandLength::Empty => Err(FifoError::NotReady {
                required: 1,
                available: 0,
            }),
        }
    }

    /// Poll until the buffer is idle or pending, or `max_commands`
    /// commands (including drops) have been processed. Returns the number
    /// processed.
    pub fn run(&mut self, max_commands: usize) -> Result<usize, FifoError> {
        let mut processed = 0;
        while processed < max_commands {
            match self.poll()? {
                Poll::Idle | Poll::Pending { .. } => break,
                Poll::Decoded { .. } | Poll::Dropped { .. } => processed += 1,
            }
        }
        Ok(processed)
    }

    fn decode(&mut self, length: usize) -> Result<DecodedCommand, FifoError> {
        let opcode = Opcode(self.consumer.peek_u8(0));
        let class = self.table.classify(opcode);
        let bytes = (self.recorder.is_recording() && class != OpcodeClass::CallDisplayList)
            .then(|| self.consumer.peek_vec(length));

        let mut dispatcher = Dispatcher {
            backend: &mut self.backend,
            memory: &self.memory,
            table: &self.table,
            recorder: &mut self.recorder,
            metrics: &mut self.metrics,
            mode: &mut self.mode,
            memory_mask: self.memory_mask,
        };
        let result = dispatcher.dispatch(&mut self.consumer, length, false);
        self.consumer.commit();
        self.oracle.invalidate();

        match result {
            Ok(class) => {
                if let Some(bytes) = bytes {
                    self.recorder.record_command(&bytes);
                }
                self.metrics.commands += 1;
                self.metrics.bytes += length as u64;
                Ok(DecodedCommand {
                    opcode,
                    class,
                    length,
                })
            }
            Err(e) => {
                if e.is_fatal() {
                    return Err(self.halt(e));
                }
                Err(e)
            }
        }
    }

    // ── Fatal state ─────────────────────────────────────────────

    fn check_halted(&self) -> Result<(), FifoError> {
        match self.halted {
            Some(_) => Err(FifoError::Halted),
            None => Ok(()),
        }
    }

    fn halt(&mut self, e: FifoError) -> FifoError {
        error!(error = %e, "command processor halted");
        self.halted = Some(e.clone());
        e
    }

    /// The fatal error that halted the processor, if any.
    pub fn halt_reason(&self) -> Option<&FifoError> {
        self.halted.as_ref()
    }

    /// Whether a fatal error has stopped decoding.
    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    /// Discard every pending byte, clear the cached length, and resume.
    ///
    /// Returns the number of bytes discarded.
    pub fn recover(&mut self) -> usize {
        let discarded = self.consumer.discard_pending();
        self.oracle.invalidate();
        self.mode = SourceMode::PrimaryBuffer;
        if let Some(reason) = self.halted.take() {
            warn!(%reason, discarded, "command processor recovered");
        }
        discarded
    }

    // ── Frames and recording ────────────────────────────────────

    /// Mark a frame boundary: close the recording frame and reset the
    /// buffer if it is drained past the tail end. Returns whether the
    /// buffer was reset.
    pub fn finish_frame(&mut self) -> bool {
        self.metrics.frames += 1;
        if self.recorder.is_recording() {
            self.recorder.finish_frame();
        }
        let reset = self.consumer.try_reset();
        if reset {
            self.oracle.invalidate();
            self.metrics.resets += 1;
        }
        reset
    }

    /// Start a new recording session, discarding any previous one.
    pub fn start_recording(&mut self) {
        self.recorder.start();
    }

    /// Finalize the recording. A second call returns the same recording.
    pub fn end_recording(&mut self) -> Option<&Recording> {
        self.recorder.end()
    }

    /// Take the finalized recording out of the processor.
    pub fn take_recording(&mut self) -> Option<Recording> {
        self.recorder.take()
    }

    /// Log a memory write that later display lists may read.
    pub fn record_memory_update(&mut self, address: u32, bytes: &[u8]) {
        if self.recorder.is_recording() {
            self.recorder.record_memory_update(address, bytes);
        }
    }

    /// Whether a recording session is open.
    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    // ── Accessors ───────────────────────────────────────────────

    /// Which stream is being read.
    pub fn source_mode(&self) -> SourceMode {
        self.mode
    }

    /// Cumulative counters.
    pub fn metrics(&self) -> &ProcessorMetrics {
        &self.metrics
    }

    /// Bytes waiting in the command buffer.
    pub fn bytes_available(&self) -> usize {
        self.consumer.bytes_available()
    }

    /// Total primary-buffer bytes consumed since creation. Comparable
    /// with [`FifoProducer::pushed`].
    pub fn consumed(&self) -> u64 {
        self.consumer.consumed()
    }

    /// The cached pending requirement, if any.
    pub fn pending_length(&self) -> Option<usize> {
        self.oracle.pending()
    }

    /// The opcode table in use.
    pub fn table(&self) -> &OpcodeTable {
        &self.table
    }

    /// The graphics backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable access to the graphics backend.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// The emulated memory.
    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Mutable access to the emulated memory.
    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.memory
    }

    /// Consume the processor, returning its consumer handle and
    /// collaborators.
    pub fn into_parts(self) -> (FifoConsumer, B, M) {
        info!(commands = self.metrics.commands, "command processor dismantled");
        (self.consumer, self.backend, self.memory)
    }
}
