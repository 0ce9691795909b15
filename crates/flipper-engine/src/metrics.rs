//! Cumulative counters for the command processor.
//!
//! [`ProcessorMetrics`] is owned by the consumer and updated as commands
//! are decoded. Hosts read a copy through
//! [`CommandProcessor::metrics`](crate::CommandProcessor::metrics).

/// Counters accumulated since the processor was created.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessorMetrics {
    /// Commands decoded from the primary buffer, including display-list calls.
    pub commands: u64,
    /// Bytes consumed from the primary buffer by decoded commands.
    pub bytes: u64,
    /// Display lists executed.
    pub display_lists: u64,
    /// Commands decoded from inside display lists.
    pub nested_commands: u64,
    /// Opcode bytes dropped because their class has no handler.
    pub unknown_opcodes: u64,
    /// Polls that found an incomplete command.
    pub pending_polls: u64,
    /// Primitives submitted.
    pub primitives: u64,
    /// Vertices submitted across all primitives.
    pub vertices: u64,
    /// Frames finished.
    pub frames: u64,
    /// Buffer resets performed.
    pub resets: u64,
    /// Commands whose consumption disagreed with their computed length.
    pub desyncs: u64,
}
