//! Processor and consumer-thread configuration, validation, and errors.
//!
//! Both config structs follow the same pattern: construct with
//! `Default`, override fields, then [`validate`](ProcessorConfig::validate)
//! before use.

use std::error::Error;
use std::fmt;
use std::time::Duration;

// ── ProcessorConfig ───────────────────────────────────────────────

/// Configuration for [`CommandProcessor`](crate::CommandProcessor) and its
/// command buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessorConfig {
    /// Command buffer capacity in bytes. Power of two. Default: 1 MiB.
    pub fifo_capacity: usize,
    /// Write position above which a drained buffer is reset at frame end.
    /// Must be below `fifo_capacity`. Default: 768 KiB.
    pub tail_end: usize,
    /// Mask applied to display-list addresses to form a physical address.
    /// Default: `0x01FF_FFFF` (32 MiB of main memory).
    pub memory_mask: u32,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            fifo_capacity: 1 << 20,
            tail_end: 3 << 18,
            memory_mask: 0x01FF_FFFF,
        }
    }
}

impl ProcessorConfig {
    /// Smallest accepted buffer capacity.
    pub const MIN_CAPACITY: usize = 16;
    /// Largest accepted buffer capacity.
    pub const MAX_CAPACITY: usize = 1 << 31;

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.fifo_capacity.is_power_of_two()
            || !(Self::MIN_CAPACITY..=Self::MAX_CAPACITY).contains(&self.fifo_capacity)
        {
            return Err(ConfigError::InvalidCapacity {
                configured: self.fifo_capacity,
            });
        }
        if self.tail_end >= self.fifo_capacity {
            return Err(ConfigError::TailEndOutOfRange {
                tail_end: self.tail_end,
                capacity: self.fifo_capacity,
            });
        }
        if self.memory_mask == 0 {
            return Err(ConfigError::ZeroMemoryMask);
        }
        Ok(())
    }
}

// ── GpuThreadConfig ───────────────────────────────────────────────

/// Configuration for [`GpuThread`](crate::GpuThread).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GpuThreadConfig {
    /// How long the thread sleeps when a poll finds nothing to do.
    /// Default: 100 µs.
    pub idle_sleep: Duration,
    /// Capacity of the bounded control channel. Default: 16.
    pub control_capacity: usize,
    /// Maximum commands decoded between control-channel checks.
    /// Default: 4096.
    pub batch_limit: usize,
}

impl Default for GpuThreadConfig {
    fn default() -> Self {
        Self {
            idle_sleep: Duration::from_micros(100),
            control_capacity: 16,
            batch_limit: 4096,
        }
    }
}

impl GpuThreadConfig {
    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.control_capacity == 0 {
            return Err(ConfigError::ControlQueueZero);
        }
        if self.batch_limit == 0 {
            return Err(ConfigError::BatchLimitZero);
        }
        Ok(())
    }
}

// ── ConfigError ───────────────────────────────────────────────────

/// Errors detected during configuration validation or thread startup.
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Buffer capacity is not a power of two in the accepted range.
    InvalidCapacity {
        /// The configured capacity.
        configured: usize,
    },
    /// `tail_end` is not below the capacity.
    TailEndOutOfRange {
        /// The configured tail end.
        tail_end: usize,
        /// The configured capacity.
        capacity: usize,
    },
    /// `memory_mask` is zero, so every display list would read address 0.
    ZeroMemoryMask,
    /// Control channel capacity is zero.
    ControlQueueZero,
    /// Batch limit is zero, so the thread would never decode.
    BatchLimitZero,
    /// The consumer thread could not be spawned.
    ThreadSpawnFailed {
        /// Description of the failure.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCapacity { configured } => write!(
                f,
                "fifo_capacity {configured} must be a power of two in {}..={}",
                ProcessorConfig::MIN_CAPACITY,
                ProcessorConfig::MAX_CAPACITY
            ),
            Self::TailEndOutOfRange { tail_end, capacity } => {
                write!(f, "tail_end {tail_end} must be below fifo_capacity {capacity}")
            }
            Self::ZeroMemoryMask => write!(f, "memory_mask must be non-zero"),
            Self::ControlQueueZero => write!(f, "control_capacity must be at least 1"),
            Self::BatchLimitZero => write!(f, "batch_limit must be at least 1"),
            Self::ThreadSpawnFailed { reason } => {
                write!(f, "failed to spawn consumer thread: {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert_eq!(ProcessorConfig::default().validate(), Ok(()));
        assert_eq!(GpuThreadConfig::default().validate(), Ok(()));
    }

    #[test]
    fn capacity_must_be_power_of_two() {
        let cfg = ProcessorConfig {
            fifo_capacity: 1000,
            tail_end: 10,
            ..ProcessorConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::InvalidCapacity { configured: 1000 })
        );
    }

    #[test]
    fn capacity_lower_bound() {
        let cfg = ProcessorConfig {
            fifo_capacity: 8,
            tail_end: 4,
            ..ProcessorConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidCapacity { configured: 8 })
        ));
    }

    #[test]
    fn tail_end_must_fit() {
        let cfg = ProcessorConfig {
            fifo_capacity: 64,
            tail_end: 64,
            ..ProcessorConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::TailEndOutOfRange {
                tail_end: 64,
                capacity: 64
            })
        );
    }

    #[test]
    fn zero_mask_rejected() {
        let cfg = ProcessorConfig {
            memory_mask: 0,
            ..ProcessorConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroMemoryMask));
    }

    #[test]
    fn thread_config_invariants() {
        let cfg = GpuThreadConfig {
            control_capacity: 0,
            ..GpuThreadConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ControlQueueZero));
        let cfg = GpuThreadConfig {
            batch_limit: 0,
            ..GpuThreadConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::BatchLimitZero));
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            ConfigError::TailEndOutOfRange {
                tail_end: 9,
                capacity: 8
            }
            .to_string(),
            "tail_end 9 must be below fifo_capacity 8"
        );
    }
}
