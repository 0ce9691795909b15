//! Error type for the command-stream decoder.

use std::error::Error;
use std::fmt;

use crate::opcode::Opcode;

/// Errors raised by the command buffer and the decoder.
///
/// `Overflow` is returned to the producer; the others are returned by
/// the consumer loop. `Desync`, `CommandTooLarge` and `NestedDisplayList`
/// are fatal: the processor halts until explicitly recovered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FifoError {
    /// A push would exceed the buffer capacity. Nothing was written.
    Overflow {
        /// Bytes the producer tried to push.
        requested: usize,
        /// Bytes of free space at the time of the push.
        free: usize,
    },
    /// A handler consumed a different number of bytes than the command
    /// length computed for it.
    Desync {
        /// The command's opcode byte.
        opcode: Opcode,
        /// Length computed before dispatch.
        expected: usize,
        /// Bytes actually consumed by the handler.
        consumed: usize,
    },
    /// A command needs more bytes than the buffer can ever hold.
    CommandTooLarge {
        /// The command's opcode byte.
        opcode: Opcode,
        /// Total length the command requires.
        required: usize,
        /// Buffer capacity.
        capacity: usize,
    },
    /// A display list tried to call another display list.
    NestedDisplayList {
        /// Target address of the rejected inner call.
        address: u32,
    },
    /// `decode_next` was called without a complete command present.
    NotReady {
        /// Bytes required before the command can be decoded.
        required: usize,
        /// Bytes currently available.
        available: usize,
    },
    /// The processor stopped after a fatal error and must be recovered.
    Halted,
}

impl FifoError {
    /// Whether this error leaves the stream in an unusable state.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Desync { .. } | Self::CommandTooLarge { .. } | Self::NestedDisplayList { .. }
        )
    }
}

impl fmt::Display for FifoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overflow { requested, free } => {
                write!(
                    f,
                    "command buffer overflow: pushed {requested} bytes with {free} free"
                )
            }
            Self::Desync {
                opcode,
                expected,
                consumed,
            } => write!(
                f,
                "stream desync on opcode {opcode}: expected {expected} bytes, consumed {consumed}"
            ),
            Self::CommandTooLarge {
                opcode,
                required,
                capacity,
            } => write!(
                f,
                "command {opcode} needs {required} bytes, more than the {capacity}-byte buffer"
            ),
            Self::NestedDisplayList { address } => {
                write!(f, "display list called another display list at {address:#010x}")
            }
            Self::NotReady {
                required,
                available,
            } => write!(
                f,
                "command not ready: {required} bytes required, {available} available"
            ),
            Self::Halted => write!(f, "command processor halted after a fatal error"),
        }
    }
}

impl Error for FifoError {}
