//! Deterministic playback of a recording.
//!
//! [`Player`] walks frames, then elements, then bytes, in recorded order.
//! Command bytes go to [`ReplaySink::push`]; memory updates go to
//! [`ReplaySink::memory_update`] so the host can apply them before the
//! display lists that read them are decoded.

use std::convert::Infallible;
use std::fmt;
use std::ops::Range;

use crate::types::{Element, Recording};

/// Destination of replayed bytes.
pub trait ReplaySink {
    /// Error returned when the sink cannot accept more data.
    type Error;

    /// Push one command byte.
    fn push(&mut self, byte: u8) -> Result<(), Self::Error>;

    /// Push the bytes of one element. Defaults to byte-wise pushes.
    fn push_slice(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        for &b in bytes {
            self.push(b)?;
        }
        Ok(())
    }

    /// Apply a recorded memory update. Ignored by default.
    fn memory_update(&mut self, _address: u32, _bytes: &[u8]) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ReplaySink for Vec<u8> {
    type Error = Infallible;

    fn push(&mut self, byte: u8) -> Result<(), Infallible> {
        Vec::push(self, byte);
        Ok(())
    }

    fn push_slice(&mut self, bytes: &[u8]) -> Result<(), Infallible> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

/// Totals for a playback pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    /// Frames replayed.
    pub frames: usize,
    /// Register-write elements replayed.
    pub commands: usize,
    /// Memory-update elements replayed.
    pub memory_updates: usize,
    /// Command bytes pushed.
    pub bytes: usize,
}

impl PlaybackStats {
    fn absorb(&mut self, other: PlaybackStats) {
        self.frames += other.frames;
        self.commands += other.commands;
        self.memory_updates += other.memory_updates;
        self.bytes += other.bytes;
    }
}

/// Errors from [`Player::play_frame`] and [`Player::play_range`].
#[derive(Debug, PartialEq, Eq)]
pub enum PlayError<E> {
    /// The requested frame does not exist.
    FrameOutOfRange {
        /// Requested index.
        index: usize,
        /// Frames in the recording.
        frame_count: usize,
    },
    /// The sink rejected data.
    Sink(E),
}

impl<E: fmt::Display> fmt::Display for PlayError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FrameOutOfRange { index, frame_count } => {
                write!(f, "frame {index} out of range ({frame_count} frames)")
            }
            Self::Sink(e) => write!(f, "replay sink rejected data: {e}"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for PlayError<E> {}

/// Replays a borrowed [`Recording`].
///
/// # Examples
///
/// ```
/// use flipper_replay::{Player, Recorder};
///
/// let mut recorder = Recorder::new();
/// recorder.start();
/// recorder.record_command(&[0x08, 0x30, 0x00, 0x00, 0x00, 0x01]);
/// let recording = recorder.end().unwrap();
///
/// let mut out = Vec::new();
/// let stats = Player::new(recording).play(&mut out).unwrap();
/// assert_eq!(out, [0x08, 0x30, 0x00, 0x00, 0x00, 0x01]);
/// assert_eq!(stats.bytes, 6);
/// ```
pub struct Player<'a> {
    recording: &'a Recording,
}

impl<'a> Player<'a> {
    /// A player over `recording`.
    pub fn new(recording: &'a Recording) -> Self {
        Self { recording }
    }

    /// The recording being replayed.
    pub fn recording(&self) -> &'a Recording {
        self.recording
    }

    /// Replay every frame in order.
    pub fn play<S: ReplaySink>(&self, sink: &mut S) -> Result<PlaybackStats, S::Error> {
        let mut stats = PlaybackStats::default();
        for index in 0..self.recording.frame_count() {
            stats.absorb(self.replay(index, sink)?);
        }
        Ok(stats)
    }

    /// Replay one frame, so the host can run the consumer between frames.
    pub fn play_frame<S: ReplaySink>(
        &self,
        index: usize,
        sink: &mut S,
    ) -> Result<PlaybackStats, PlayError<S::Error>> {
        let frame_count = self.recording.frame_count();
        if index >= frame_count {
            return Err(PlayError::FrameOutOfRange { index, frame_count });
        }
        self.play_range(index..index + 1, sink)
    }

    /// Replay a contiguous range of frames.
    pub fn play_range<S: ReplaySink>(
        &self,
        frames: Range<usize>,
        sink: &mut S,
    ) -> Result<PlaybackStats, PlayError<S::Error>> {
        let frame_count = self.recording.frame_count();
        if frames.end > frame_count {
            return Err(PlayError::FrameOutOfRange {
                index: frames.end - 1,
                frame_count,
            });
        }
        let mut stats = PlaybackStats::default();
        for index in frames {
            stats.absorb(self.replay(index, sink).map_err(PlayError::Sink)?);
        }
        Ok(stats)
    }

    fn replay<S: ReplaySink>(&self, index: usize, sink: &mut S) -> Result<PlaybackStats, S::Error> {
        let mut stats = PlaybackStats {
            frames: 1,
            ..PlaybackStats::default()
        };
        let Some(elements) = self.recording.frame_elements(index) else {
            return Ok(PlaybackStats::default());
        };
        for record in elements {
            match self.recording.element(record) {
                Element::RegisterWrite(bytes) => {
                    sink.push_slice(bytes)?;
                    stats.commands += 1;
                    stats.bytes += bytes.len();
                }
                Element::MemoryUpdate { address, data } => {
                    sink.memory_update(address, data)?;
                    stats.memory_updates += 1;
                }
            }
        }
        Ok(stats)
    }
}
