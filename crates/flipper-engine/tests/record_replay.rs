//! Record a session, replay it into a fresh processor, and check that
//! the second run decodes the same stream.

use flipper_core::{FifoError, Primitive};
use flipper_engine::{CommandProcessor, FifoProducer, ProcessorConfig};
use flipper_replay::{
    compare_recordings, decode_recording, encode_recording, recording_hash, Player, ReplaySink,
};
use flipper_test_utils::fixtures::CommandStream;
use flipper_test_utils::{MockBackend, MockMemory};

type Processor = CommandProcessor<MockBackend, MockMemory>;

fn processor() -> (FifoProducer, Processor) {
    CommandProcessor::with_buffer(
        ProcessorConfig::default(),
        MockBackend::new(3),
        MockMemory::new(0x8000),
    )
    .unwrap()
}

/// Pushes command bytes into a buffer and holds memory updates until the
/// frame is decoded.
struct Target<'a> {
    producer: &'a mut FifoProducer,
    updates: Vec<(u32, Vec<u8>)>,
}

impl ReplaySink for Target<'_> {
    type Error = FifoError;

    fn push(&mut self, byte: u8) -> Result<(), FifoError> {
        self.producer.push_u8(byte)
    }

    fn push_slice(&mut self, bytes: &[u8]) -> Result<(), FifoError> {
        self.producer.push(bytes)
    }

    fn memory_update(&mut self, address: u32, bytes: &[u8]) -> Result<(), FifoError> {
        self.updates.push((address, bytes.to_vec()));
        Ok(())
    }
}

fn captured_session() -> Processor {
    let (mut tx, mut cp) = processor();
    cp.start_recording();

    // Frame 0: register state and a draw.
    let frame0 = CommandStream::new()
        .load_cp(0x50, 0x0000_0011)
        .load_xf(0x1008, &[1, 2, 3, 4])
        .draw(Primitive::TriangleFan, 2, 2, &[9; 6]);
    tx.push(frame0.as_bytes()).unwrap();
    cp.run(usize::MAX).unwrap();
    cp.finish_frame();

    // Frame 1: the CPU writes a display list, then calls it.
    let list = CommandStream::new()
        .load_bp(0x66, 0x12)
        .draw(Primitive::Points, 0, 1, &[7, 7, 7]);
    cp.memory_mut().write(0x4000, list.as_bytes());
    cp.record_memory_update(0x4000, list.as_bytes());
    let frame1 = CommandStream::new()
        .call_display_list(0x4000, list.len() as u32)
        .invalidate_vertex_cache();
    tx.push(frame1.as_bytes()).unwrap();
    cp.run(usize::MAX).unwrap();
    cp.finish_frame();

    assert!(cp.end_recording().is_some());
    cp
}

#[test]
fn replay_reproduces_the_stream() {
    let mut first = captured_session();
    let recording = first.take_recording().unwrap();
    assert_eq!(recording.frame_count(), 2);
    // The memory update, the call's two sub-commands and the trailing
    // invalidate. The call itself is not recorded.
    assert_eq!(recording.frame_elements(1).unwrap().len(), 4);

    let (mut tx, mut second) = processor();
    second.start_recording();
    let player = Player::new(&recording);
    for frame in 0..recording.frame_count() {
        let mut target = Target {
            producer: &mut tx,
            updates: Vec::new(),
        };
        player.play_frame(frame, &mut target).unwrap();
        for (address, bytes) in target.updates {
            second.memory_mut().write(address, &bytes);
            second.record_memory_update(address, &bytes);
        }
        second.run(usize::MAX).unwrap();
        second.finish_frame();
    }
    let replayed = second.end_recording().unwrap().clone();

    assert_eq!(compare_recordings(&recording, &replayed), None);
    assert_eq!(recording_hash(&recording), recording_hash(&replayed));
    assert_eq!(first.backend().calls, second.backend().calls);
}

#[test]
fn recording_survives_the_codec() {
    let mut cp = captured_session();
    let recording = cp.take_recording().unwrap();
    let mut bytes = Vec::new();
    encode_recording(&mut bytes, &recording).unwrap();
    let decoded = decode_recording(&mut bytes.as_slice()).unwrap();
    assert_eq!(decoded, recording);
}

#[test]
fn divergent_replay_is_reported() {
    let mut cp = captured_session();
    let recording = cp.take_recording().unwrap();

    let (mut tx, mut other) = processor();
    other.start_recording();
    tx.push(CommandStream::new().load_cp(0x50, 0x0000_0012).as_bytes())
        .unwrap();
    other.run(usize::MAX).unwrap();
    let other = other.end_recording().unwrap();

    let divergence = compare_recordings(&recording, other).unwrap();
    assert_eq!(divergence.frame, 0);
}
