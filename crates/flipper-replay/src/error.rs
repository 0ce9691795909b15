//! Error types for the replay system.

use std::fmt;
use std::io;

use crate::types::Section;

/// Errors that can occur while loading, saving, or validating a recording.
#[derive(Debug)]
pub enum ReplayError {
    /// An I/O error occurred during read or write.
    Io(io::Error),
    /// The file does not start with the expected magic number.
    InvalidMagic {
        /// The value found in the magic field.
        found: u32,
    },
    /// The format version is not supported by this build.
    UnsupportedVersion {
        /// The version found in the file.
        found: u32,
    },
    /// A section ended before its declared size.
    Truncated {
        /// The section being read.
        section: Section,
        /// Bytes the header declared for the section.
        expected: u64,
        /// Bytes actually present.
        actual: u64,
    },
    /// Offsets or ranges in the file are inconsistent.
    Malformed {
        /// Human-readable description of what went wrong.
        detail: String,
    },
    /// An element record carries a kind tag this build does not know.
    UnknownElementKind {
        /// Index of the offending element.
        element: usize,
        /// The unrecognized kind tag.
        kind: u32,
    },
}

impl ReplayError {
    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        Self::Malformed {
            detail: detail.into(),
        }
    }
}

impl fmt::Display for ReplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::InvalidMagic { found } => {
                write!(
                    f,
                    "invalid magic {found:#010x} (expected {:#010x})",
                    crate::MAGIC
                )
            }
            Self::UnsupportedVersion { found } => {
                write!(f, "unsupported format version {found}")
            }
            Self::Truncated {
                section,
                expected,
                actual,
            } => write!(
                f,
                "truncated {section}: expected {expected} bytes, found {actual}"
            ),
            Self::Malformed { detail } => write!(f, "malformed recording: {detail}"),
            Self::UnknownElementKind { element, kind } => {
                write!(f, "element {element} has unknown kind {kind}")
            }
        }
    }
}

impl std::error::Error for ReplayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ReplayError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
