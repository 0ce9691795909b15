//! Recording comparison.
//!
//! Hash-first comparison with an element-by-element fallback that
//! reports where two captures first disagree.

use std::fmt;

use crate::hash::{frame_hash, recording_hash};
use crate::types::Recording;

/// How two recordings differ at the first divergence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DivergenceKind {
    /// One recording has more frames.
    FrameCount {
        /// Frames in the left recording.
        left: usize,
        /// Frames in the right recording.
        right: usize,
    },
    /// The frame holds a different number of elements.
    ElementCount {
        /// Elements in the left frame.
        left: usize,
        /// Elements in the right frame.
        right: usize,
    },
    /// The element kinds differ.
    Kind,
    /// The element sizes differ.
    Size {
        /// Size of the left element.
        left: u32,
        /// Size of the right element.
        right: u32,
    },
    /// The element bytes differ starting at `offset` within the element.
    Bytes {
        /// First differing byte offset within the element.
        offset: usize,
    },
}

/// The first point at which two recordings disagree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Divergence {
    /// Frame index.
    pub frame: usize,
    /// Element index within the frame, when the frame itself lines up.
    pub element: Option<usize>,
    /// What differs.
    pub kind: DivergenceKind,
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame {}", self.frame)?;
        if let Some(element) = self.element {
            write!(f, " element {element}")?;
        }
        match &self.kind {
            DivergenceKind::FrameCount { left, right } => {
                write!(f, ": frame count {left} vs {right}")
            }
            DivergenceKind::ElementCount { left, right } => {
                write!(f, ": element count {left} vs {right}")
            }
            DivergenceKind::Kind => write!(f, ": element kind differs"),
            DivergenceKind::Size { left, right } => write!(f, ": size {left} vs {right}"),
            DivergenceKind::Bytes { offset } => write!(f, ": bytes differ at offset {offset}"),
        }
    }
}

/// Compare two recordings, returning the first divergence.
///
/// Fast path: identical recording hashes are taken as equal. Otherwise
/// frames are compared in order, skipping frames whose hashes match, and
/// the first differing element is reported.
pub fn compare_recordings(left: &Recording, right: &Recording) -> Option<Divergence> {
    if left.frame_count() == right.frame_count() && recording_hash(left) == recording_hash(right)
    {
        return None;
    }

    let shared = left.frame_count().min(right.frame_count());
    for frame in 0..shared {
        if frame_hash(left, frame) == frame_hash(right, frame) {
            continue;
        }
        if let Some(d) = compare_frame(left, right, frame) {
            return Some(d);
        }
    }

    if left.frame_count() != right.frame_count() {
        return Some(Divergence {
            frame: shared,
            element: None,
            kind: DivergenceKind::FrameCount {
                left: left.frame_count(),
                right: right.frame_count(),
            },
        });
    }
    None
}

fn compare_frame(left: &Recording, right: &Recording, frame: usize) -> Option<Divergence> {
    let l = left.frame_elements(frame).unwrap_or(&[]);
    let r = right.frame_elements(frame).unwrap_or(&[]);
    let at = |element: Option<usize>, kind| {
        Some(Divergence {
            frame,
            element,
            kind,
        })
    };

    for (i, (le, re)) in l.iter().zip(r).enumerate() {
        if le.kind != re.kind {
            return at(Some(i), DivergenceKind::Kind);
        }
        let lb = left.element_bytes(le);
        let rb = right.element_bytes(re);
        if let Some(offset) = lb.iter().zip(rb).position(|(a, b)| a != b) {
            return at(Some(i), DivergenceKind::Bytes { offset });
        }
        if le.size != re.size {
            return at(
                Some(i),
                DivergenceKind::Size {
                    left: le.size,
                    right: re.size,
                },
            );
        }
    }
    if l.len() != r.len() {
        return at(
            None,
            DivergenceKind::ElementCount {
                left: l.len(),
                right: r.len(),
            },
        );
    }
    None
}
