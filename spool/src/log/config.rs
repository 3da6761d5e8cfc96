use std::path::PathBuf;
use std::time::Duration;

use crate::ring::MAX_CAPACITY_LOG2;

use super::LogError;

pub const DEFAULT_DEST_FILE: &str = "log.txt";
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(1000);
/// 64 KiB per thread.
pub const DEFAULT_BUFFER_CAPACITY_LOG2: u32 = 16;

/// Configuration for a [`super::LogPipeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// File the flush thread appends to. Created if missing.
    pub dest_file: PathBuf,
    /// Longest time bytes sit in a thread buffer before a flush pass.
    pub flush_interval: Duration,
    /// Each thread buffer holds `2^buffer_capacity_log2` bytes. A single write
    /// can never be larger than that.
    pub buffer_capacity_log2: u32,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dest_file: PathBuf::from(DEFAULT_DEST_FILE),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            buffer_capacity_log2: DEFAULT_BUFFER_CAPACITY_LOG2,
        }
    }
}

impl LogConfig {
    /// Default settings writing to `dest_file`.
    pub fn new(dest_file: impl Into<PathBuf>) -> Self {
        Self {
            dest_file: dest_file.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    #[must_use]
    pub fn with_buffer_capacity_log2(mut self, capacity_log2: u32) -> Self {
        self.buffer_capacity_log2 = capacity_log2;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), LogError> {
        if self.buffer_capacity_log2 > MAX_CAPACITY_LOG2 {
            return Err(LogError::CapacityOutOfRange(self.buffer_capacity_log2));
        }
        Ok(())
    }
}
