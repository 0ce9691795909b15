//! Frame-structured capture of decoded commands.
//!
//! The [`Recorder`] is owned by the consumer side of the command
//! processor. It is idle until [`Recorder::start`]; while recording, every
//! decoded command becomes one element of the current frame.

use tracing::{info, warn};

use crate::types::{ElementKind, ElementRecord, FrameRecord, Recording};

enum State {
    Idle,
    Recording {
        frames: Vec<FrameRecord>,
        elements: Vec<ElementRecord>,
        raw: Vec<u8>,
        frame_base: usize,
    },
    Finished(Recording),
}

/// Accumulates frames and elements while recording is active.
///
/// # Examples
///
/// ```
/// use flipper_replay::Recorder;
///
/// let mut recorder = Recorder::new();
/// recorder.start();
/// recorder.record_command(&[0x00]);
/// recorder.finish_frame();
/// recorder.record_command(&[0x48]);
///
/// let recording = recorder.end().unwrap();
/// assert_eq!(recording.frame_count(), 2);
/// assert_eq!(recording.raw_data(), &[0x00, 0x48]);
/// ```
pub struct Recorder {
    state: State,
}

impl Recorder {
    /// An idle recorder.
    pub fn new() -> Self {
        Self { state: State::Idle }
    }

    /// Whether a recording session is open.
    pub fn is_recording(&self) -> bool {
        matches!(self.state, State::Recording { .. })
    }

    /// Discard any previous state and open frame 0.
    pub fn start(&mut self) {
        self.state = State::Recording {
            frames: Vec::new(),
            elements: Vec::new(),
            raw: Vec::new(),
            frame_base: 0,
        };
        info!("command stream recording started");
    }

    /// Append one decoded command to the current frame.
    pub fn record_command(&mut self, bytes: &[u8]) {
        self.append(ElementKind::RegisterWrite, &[], bytes);
    }

    /// Append a memory update: a little-endian `address`/`size` prefix
    /// followed by `bytes`.
    pub fn record_memory_update(&mut self, address: u32, bytes: &[u8]) {
        let Ok(size) = u32::try_from(bytes.len()) else {
            warn!(len = bytes.len(), "memory update too large to record");
            return;
        };
        let mut prefix = [0u8; 8];
        prefix[..4].copy_from_slice(&address.to_le_bytes());
        prefix[4..].copy_from_slice(&size.to_le_bytes());
        self.append(ElementKind::MemoryUpdate, &prefix, bytes);
    }

    fn append(&mut self, kind: ElementKind, prefix: &[u8], bytes: &[u8]) {
        let State::Recording { elements, raw, .. } = &mut self.state else {
            warn!(?kind, "element recorded while not recording; ignored");
            return;
        };
        let total = prefix.len() + bytes.len();
        let (Ok(offset), Ok(size)) = (u32::try_from(raw.len()), u32::try_from(total)) else {
            warn!(?kind, "recording raw log full; element dropped");
            return;
        };
        if offset.checked_add(size).is_none() {
            warn!(?kind, "recording raw log full; element dropped");
            return;
        }
        elements.push(ElementRecord { kind, offset, size });
        raw.extend_from_slice(prefix);
        raw.extend_from_slice(bytes);
    }

    /// Close the current frame and open the next one.
    pub fn finish_frame(&mut self) {
        match &mut self.state {
            State::Recording {
                frames,
                elements,
                frame_base,
                ..
            } => {
                frames.push(FrameRecord {
                    base_element: *frame_base as u32,
                    element_count: (elements.len() - *frame_base) as u32,
                });
                *frame_base = elements.len();
            }
            _ => warn!("frame finished while not recording; ignored"),
        }
    }

    /// Close the trailing frame, trim trailing empty frames and finalize.
    ///
    /// Calling `end` again returns the same recording. Returns `None` when
    /// no session was started.
    pub fn end(&mut self) -> Option<&Recording> {
        if self.is_recording() {
            self.finish_frame();
            let state = std::mem::replace(&mut self.state, State::Idle);
            if let State::Recording {
                mut frames,
                elements,
                raw,
                ..
            } = state
            {
                while frames.last().is_some_and(|f| f.element_count == 0) {
                    frames.pop();
                }
                info!(
                    frames = frames.len(),
                    elements = elements.len(),
                    bytes = raw.len(),
                    "command stream recording ended"
                );
                self.state = State::Finished(Recording::from_recorded(frames, elements, raw));
            }
        }
        match &self.state {
            State::Finished(recording) => Some(recording),
            State::Idle => {
                warn!("recording ended while idle; ignored");
                None
            }
            State::Recording { .. } => None,
        }
    }

    /// Take the finished recording, leaving the recorder idle.
    pub fn take(&mut self) -> Option<Recording> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Finished(recording) => Some(recording),
            other => {
                self.state = other;
                None
            }
        }
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}
