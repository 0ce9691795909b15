//! Dedicated decode thread.
//!
//! [`GpuThread`] moves a [`CommandProcessor`] onto its own thread and
//! polls it continuously. The handle keeps the [`FifoProducer`]; bytes go
//! through the buffer while frame boundaries and recording control travel
//! over a bounded crossbeam channel.
//!
//! Every control message is stamped with the producer's byte total at the
//! moment it is sent. The thread applies it exactly when the consumer has
//! decoded that many bytes, so a boundary lands between the same two
//! commands it was issued between, however late the thread wakes.
//!
//! ```text
//! CPU thread                        GPU thread
//!     |                                 |
//!     |--push()------------------------>| processor.poll() up to the next stamp
//!     |                                 | sleep(idle_sleep) when idle
//!     |--finish_frame() [at = pushed]-->| consumed == at: finish_frame()
//!     |   [control: bounded(N)]         |
//!     |--end_recording() [at]---------->| consumed == at: end_recording()
//!     |<--recording via reply-----------|
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use flipper_core::{EmulatedMemory, FifoError, GraphicsBackend};
use flipper_replay::{Recording, ReplaySink};
use tracing::{debug, error, info, trace};

use crate::buffer::FifoProducer;
use crate::config::{ConfigError, GpuThreadConfig};
use crate::processor::{CommandProcessor, Poll};

// ── Error types ──────────────────────────────────────────────────

/// Error talking to or stopping the decode thread.
#[derive(Debug, PartialEq, Eq)]
pub enum GpuThreadError {
    /// The thread has already exited.
    Disconnected,
    /// The thread panicked; the processor is lost.
    Panicked,
}

impl fmt::Display for GpuThreadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "gpu thread has exited"),
            Self::Panicked => write!(f, "gpu thread panicked"),
        }
    }
}

impl std::error::Error for GpuThreadError {}

// ── Control channel ──────────────────────────────────────────────

enum Control {
    FinishFrame,
    StartRecording,
    EndRecording(Sender<Option<Recording>>),
    Shutdown,
}

/// A control message and the producer byte total it was sent at.
struct Stamped {
    at: u64,
    control: Control,
}

struct Stop;

struct GpuThreadState<B, M> {
    processor: CommandProcessor<B, M>,
    control_rx: Receiver<Stamped>,
    queued: VecDeque<Stamped>,
    halted: Arc<AtomicBool>,
    config: GpuThreadConfig,
}

impl<B: GraphicsBackend, M: EmulatedMemory> GpuThreadState<B, M> {
    fn run(mut self) -> CommandProcessor<B, M> {
        loop {
            // Bytes visible now were pushed after every message sent before
            // them, so the receive below sees all stamps inside this window.
            let limit = self.processor.consumed() + self.processor.bytes_available() as u64;
            if let Err(Stop) = self.receive() {
                break;
            }
            if !self.step(limit) {
                thread::sleep(self.config.idle_sleep);
            }
        }
        info!(
            commands = self.processor.metrics().commands,
            "gpu thread stopped"
        );
        self.processor
    }

    /// Move every pending message into the local queue.
    fn receive(&mut self) -> Result<(), Stop> {
        loop {
            match self.control_rx.try_recv() {
                Ok(Stamped {
                    control: Control::Shutdown,
                    ..
                })
                | Err(TryRecvError::Disconnected) => return Err(Stop),
                Ok(msg) => self.queued.push_back(msg),
                Err(TryRecvError::Empty) => return Ok(()),
            }
        }
    }

    /// Decode up to `limit` bytes, applying queued messages as their
    /// stamps are reached. Returns whether anything happened.
    fn step(&mut self, limit: u64) -> bool {
        let mut progressed = false;
        let mut processed = 0;
        loop {
            let consumed = self.processor.consumed();
            if self.queued.front().is_some_and(|m| m.at <= consumed) {
                self.apply_front();
                progressed = true;
                continue;
            }
            if consumed >= limit || processed >= self.config.batch_limit {
                break;
            }
            match self.processor.poll() {
                Ok(Poll::Decoded { .. } | Poll::Dropped { .. }) => {
                    processed += 1;
                    progressed = true;
                }
                Ok(Poll::Idle | Poll::Pending { .. }) => {
                    // The bytes before the next stamp end mid-command.
                    // Waiting would hold the message forever.
                    if self.queued.is_empty() {
                        break;
                    }
                    trace!(consumed, "boundary inside an incomplete command");
                    self.apply_front();
                    progressed = true;
                }
                Err(e) => {
                    if !self.halted.swap(true, Ordering::AcqRel) {
                        error!(error = %e, "gpu thread halted; waiting for shutdown");
                    }
                    // Decoding is over; messages still get answered.
                    while !self.queued.is_empty() {
                        self.apply_front();
                        progressed = true;
                    }
                    break;
                }
            }
        }
        progressed
    }

    fn apply_front(&mut self) {
        let Some(Stamped { at, control }) = self.queued.pop_front() else {
            return;
        };
        match control {
            Control::FinishFrame => {
                debug!(at, "frame boundary");
                self.processor.finish_frame();
            }
            Control::StartRecording => self.processor.start_recording(),
            Control::EndRecording(reply) => {
                let recording = self.processor.end_recording().cloned();
                // The caller may have given up waiting.
                let _ = reply.send(recording);
            }
            Control::Shutdown => {}
        }
    }
}

// ── GpuThread ────────────────────────────────────────────────────

/// Handle to a command processor running on its own thread.
///
/// Owns the producer end of the command buffer. Dropping the handle stops
/// the thread and discards the processor; use [`GpuThread::shutdown`] to
/// get it back.
pub struct GpuThread<B, M> {
    producer: FifoProducer,
    control_tx: Option<Sender<Stamped>>,
    handle: Option<JoinHandle<CommandProcessor<B, M>>>,
    halted: Arc<AtomicBool>,
}

impl<B, M> GpuThread<B, M>
where
    B: GraphicsBackend + Send + 'static,
    M: EmulatedMemory + Send + 'static,
{
    /// Move `processor` onto a new thread and start decoding. `producer`
    /// must be the other end of the processor's buffer.
    pub fn spawn(
        producer: FifoProducer,
        processor: CommandProcessor<B, M>,
        config: GpuThreadConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (control_tx, control_rx) = crossbeam_channel::bounded(config.control_capacity);
        let halted = Arc::new(AtomicBool::new(processor.is_halted()));
        let state = GpuThreadState {
            processor,
            control_rx,
            queued: VecDeque::new(),
            halted: Arc::clone(&halted),
            config,
        };
        let handle = thread::Builder::new()
            .name("flipper-gpu".into())
            .spawn(move || state.run())
            .map_err(|e| ConfigError::ThreadSpawnFailed {
                reason: e.to_string(),
            })?;
        info!("gpu thread started");
        Ok(Self {
            producer,
            control_tx: Some(control_tx),
            handle: Some(handle),
            halted,
        })
    }

    fn send(&self, control: Control) -> Result<(), GpuThreadError> {
        let msg = Stamped {
            at: self.producer.pushed(),
            control,
        };
        self.control_tx
            .as_ref()
            .ok_or(GpuThreadError::Disconnected)?
            .send(msg)
            .map_err(|_| GpuThreadError::Disconnected)
    }

    /// Append encoded commands to the buffer.
    pub fn push(&mut self, bytes: &[u8]) -> Result<(), FifoError> {
        self.producer.push(bytes)
    }

    /// The buffer's producer handle.
    pub fn producer(&self) -> &FifoProducer {
        &self.producer
    }

    /// Mutable access to the producer, for the `push_*` helpers.
    pub fn producer_mut(&mut self) -> &mut FifoProducer {
        &mut self.producer
    }

    /// Signal a frame boundary after every byte pushed so far.
    pub fn finish_frame(&self) -> Result<(), GpuThreadError> {
        self.send(Control::FinishFrame)
    }

    /// Start a recording session at the current point of the stream.
    pub fn start_recording(&self) -> Result<(), GpuThreadError> {
        self.send(Control::StartRecording)
    }

    /// Finalize the recording once every byte pushed so far is decoded.
    /// Blocks until the decode thread replies.
    pub fn end_recording(&self) -> Result<Option<Recording>, GpuThreadError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.send(Control::EndRecording(reply_tx))?;
        reply_rx.recv().map_err(|_| GpuThreadError::Disconnected)
    }

    /// Whether the processor has stopped on a fatal error.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Stop the thread and recover the processor. Bytes not yet decoded
    /// stay in the buffer.
    pub fn shutdown(mut self) -> Result<CommandProcessor<B, M>, GpuThreadError> {
        if let Some(tx) = self.control_tx.take() {
            // A full queue or exited thread both end in the join below.
            let _ = tx.try_send(Stamped {
                at: self.producer.pushed(),
                control: Control::Shutdown,
            });
        }
        let handle = self.handle.take().ok_or(GpuThreadError::Disconnected)?;
        debug!("joining gpu thread");
        handle.join().map_err(|_| GpuThreadError::Panicked)
    }
}

impl<B, M> ReplaySink for GpuThread<B, M>
where
    B: GraphicsBackend + Send + 'static,
    M: EmulatedMemory + Send + 'static,
{
    type Error = FifoError;

    fn push(&mut self, byte: u8) -> Result<(), FifoError> {
        self.producer.push_u8(byte)
    }

    fn push_slice(&mut self, bytes: &[u8]) -> Result<(), FifoError> {
        self.producer.push(bytes)
    }
}

impl<B, M> Drop for GpuThread<B, M> {
    fn drop(&mut self) {
        // Dropping the sender disconnects the channel, which the loop
        // treats as shutdown.
        self.control_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessorConfig;
    use flipper_replay::{compare_recordings, Player};
    use flipper_test_utils::{BackendCall, MockBackend, MockMemory};
    use std::time::Duration;

    fn spawn_with(idle_sleep: Duration) -> GpuThread<MockBackend, MockMemory> {
        let (producer, cp) = CommandProcessor::with_buffer(
            ProcessorConfig::default(),
            MockBackend::new(4),
            MockMemory::new(0x1000),
        )
        .unwrap();
        let config = GpuThreadConfig {
            idle_sleep,
            ..GpuThreadConfig::default()
        };
        GpuThread::spawn(producer, cp, config).unwrap()
    }

    fn spawn() -> GpuThread<MockBackend, MockMemory> {
        spawn_with(Duration::from_micros(50))
    }

    #[test]
    fn shutdown_returns_processor_with_decoded_work() {
        let mut gpu = spawn();
        gpu.push(&[0x61, 0x45, 0x00, 0x00, 0x07]).unwrap();
        gpu.finish_frame().unwrap();
        // end_recording waits for the stream to reach it, so it doubles as
        // a barrier here.
        assert_eq!(gpu.end_recording().unwrap(), None);
        let cp = gpu.shutdown().unwrap();
        assert_eq!(cp.backend().calls, vec![BackendCall::Bp(0x45, 7)]);
        assert_eq!(cp.metrics().frames, 1);
    }

    #[test]
    fn recording_across_threads() {
        let mut gpu = spawn();
        gpu.start_recording().unwrap();
        gpu.push(&[0x00, 0x48]).unwrap();
        gpu.finish_frame().unwrap();
        gpu.push(&[0x00]).unwrap();
        let recording = gpu.end_recording().unwrap().unwrap();
        assert_eq!(recording.frame_count(), 2);
        assert_eq!(recording.frame_elements(0).unwrap().len(), 2);
        assert_eq!(recording.raw_data(), &[0x00, 0x48, 0x00]);
        gpu.shutdown().unwrap();
    }

    #[test]
    fn frame_boundary_holds_when_thread_wakes_late() {
        // Everything below is queued before the thread's first wake-up.
        let mut gpu = spawn_with(Duration::from_millis(20));
        gpu.start_recording().unwrap();
        gpu.push(&[0x00]).unwrap();
        gpu.finish_frame().unwrap();
        gpu.push(&[0x48]).unwrap();
        let recording = gpu.end_recording().unwrap().unwrap();
        assert_eq!(recording.frame_count(), 2);
        assert_eq!(recording.frame_elements(0).unwrap().len(), 1);
        assert_eq!(recording.frame_elements(1).unwrap().len(), 1);
        gpu.shutdown().unwrap();
    }

    #[test]
    fn bytes_before_start_are_not_recorded() {
        let mut gpu = spawn_with(Duration::from_millis(20));
        gpu.push(&[0x00, 0x00]).unwrap();
        gpu.start_recording().unwrap();
        gpu.push(&[0x48]).unwrap();
        let recording = gpu.end_recording().unwrap().unwrap();
        assert_eq!(recording.raw_data(), &[0x48]);
        gpu.shutdown().unwrap();
    }

    #[test]
    fn replay_through_thread_matches_capture() {
        let mut gpu = spawn_with(Duration::from_millis(5));
        gpu.start_recording().unwrap();
        gpu.push(&[0x08, 0x50, 0, 0, 0, 1, 0x00]).unwrap();
        gpu.finish_frame().unwrap();
        gpu.push(&[0x61, 0x45, 0, 0, 2, 0x48]).unwrap();
        gpu.finish_frame().unwrap();
        gpu.push(&[0x80, 0x00, 0x01, 1, 2, 3, 4]).unwrap();
        let captured = gpu.end_recording().unwrap().unwrap();
        assert_eq!(captured.frame_count(), 3);
        gpu.shutdown().unwrap();

        let mut replay = spawn_with(Duration::from_millis(5));
        replay.start_recording().unwrap();
        let player = Player::new(&captured);
        for frame in 0..captured.frame_count() {
            player.play_frame(frame, &mut replay).unwrap();
            replay.finish_frame().unwrap();
        }
        let replayed = replay.end_recording().unwrap().unwrap();
        assert_eq!(compare_recordings(&captured, &replayed), None);
        replay.shutdown().unwrap();
    }

    #[test]
    fn fatal_error_sets_halted_flag() {
        let (producer, mut cp) = CommandProcessor::with_buffer(
            ProcessorConfig::default(),
            MockBackend::new(4),
            MockMemory::new(0x4000),
        )
        .unwrap();
        cp.backend_mut().short_read = 1;
        let mut gpu = GpuThread::spawn(producer, cp, GpuThreadConfig::default()).unwrap();
        gpu.push(&[0x80, 0x00, 0x01, 1, 2, 3, 4]).unwrap();
        // Answered even though the decoder stopped short of the stamp.
        gpu.end_recording().unwrap();
        assert!(gpu.is_halted());
        let cp = gpu.shutdown().unwrap();
        assert!(matches!(cp.halt_reason(), Some(FifoError::Desync { .. })));
    }

    #[test]
    fn boundary_inside_partial_command_is_not_held() {
        let mut gpu = spawn();
        gpu.start_recording().unwrap();
        gpu.push(&[0x00, 0x08, 0x50]).unwrap();
        let recording = gpu.end_recording().unwrap().unwrap();
        assert_eq!(recording.raw_data(), &[0x00]);
        gpu.shutdown().unwrap();
    }

    #[test]
    fn invalid_config_rejected() {
        let (producer, cp) = CommandProcessor::with_buffer(
            ProcessorConfig::default(),
            MockBackend::new(4),
            MockMemory::new(0x10),
        )
        .unwrap();
        let config = GpuThreadConfig {
            batch_limit: 0,
            ..GpuThreadConfig::default()
        };
        assert!(matches!(
            GpuThread::spawn(producer, cp, config),
            Err(ConfigError::BatchLimitZero)
        ));
    }
}
