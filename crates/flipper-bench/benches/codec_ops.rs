//! Criterion micro-benchmarks for the recording codec and hashing.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use flipper_bench::{reference_config, reference_frame, VERTEX_SIZE};
use flipper_engine::CommandProcessor;
use flipper_replay::{
    compare_recordings, decode_recording, encode_recording, recording_hash, Player, Recording,
};
use flipper_test_utils::{MockBackend, MockMemory};

/// Record `frames` frames of 64 draws each.
fn make_recording(frames: usize) -> Recording {
    let frame = reference_frame(64);
    let (mut tx, mut cp) = CommandProcessor::with_buffer(
        reference_config(),
        MockBackend::new(VERTEX_SIZE),
        MockMemory::new(0),
    )
    .unwrap();
    cp.start_recording();
    for _ in 0..frames {
        tx.push(&frame).unwrap();
        cp.run(usize::MAX).unwrap();
        cp.finish_frame();
        cp.backend_mut().calls.clear();
    }
    cp.end_recording();
    cp.take_recording().unwrap()
}

/// Benchmark: encode a 60-frame recording.
fn bench_encode_recording(c: &mut Criterion) {
    let recording = make_recording(60);

    c.bench_function("codec_encode_recording_60", |b| {
        b.iter(|| {
            let mut buf = Vec::with_capacity(1 << 20);
            encode_recording(&mut buf, &recording).unwrap();
            black_box(&buf);
        });
    });
}

/// Benchmark: decode and validate a 60-frame recording.
fn bench_decode_recording(c: &mut Criterion) {
    let recording = make_recording(60);
    let mut buf = Vec::new();
    encode_recording(&mut buf, &recording).unwrap();

    c.bench_function("codec_decode_recording_60", |b| {
        b.iter(|| {
            let decoded = decode_recording(&mut buf.as_slice()).unwrap();
            black_box(&decoded);
        });
    });
}

/// Benchmark: hash and compare two identical recordings.
fn bench_hash_and_compare(c: &mut Criterion) {
    let left = make_recording(60);
    let right = left.clone();

    c.bench_function("recording_hash_60", |b| {
        b.iter(|| black_box(recording_hash(&left)));
    });
    c.bench_function("compare_recordings_60", |b| {
        b.iter(|| black_box(compare_recordings(&left, &right)));
    });
}

/// Benchmark: play a recording into a byte sink.
fn bench_playback(c: &mut Criterion) {
    let recording = make_recording(60);
    let player = Player::new(&recording);

    c.bench_function("player_play_60", |b| {
        b.iter(|| {
            let mut sink: Vec<u8> = Vec::with_capacity(recording.raw_data().len());
            let stats = player.play(&mut sink).unwrap();
            black_box(stats);
        });
    });
}

criterion_group!(
    benches,
    bench_encode_recording,
    bench_decode_recording,
    bench_hash_and_compare,
    bench_playback,
);
criterion_main!(benches);
