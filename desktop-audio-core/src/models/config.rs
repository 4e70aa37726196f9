use std::time::Duration;

use super::record::OutputFormat;

/// Default total number of amplitude values per record, across both channels.
pub const DEFAULT_SAMPLE_BUDGET: u32 = 64;

/// Default sleep between polls when no packet is pending.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 15;

/// Configuration for a capture loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfiguration {
    /// Upper bound on emitted values per record, split evenly between
    /// left and right (default: 64).
    pub sample_budget: u32,

    /// Milliseconds to sleep when the stream has nothing pending (default: 15).
    pub poll_interval_ms: u64,

    /// Run each channel through the spectral compressor before emitting.
    pub compression: bool,

    /// Shape of each emitted JSON line.
    pub output_format: OutputFormat,
}

impl FeedConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_budget == 0 {
            return Err("sample budget must be positive".into());
        }
        if self.poll_interval_ms == 0 {
            return Err("poll interval must be positive".into());
        }
        Ok(())
    }

    /// Frames taken from each packet at most.
    pub fn frames_per_record(&self) -> usize {
        self.sample_budget as usize / 2
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for FeedConfiguration {
    fn default() -> Self {
        Self {
            sample_budget: DEFAULT_SAMPLE_BUDGET,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            compression: false,
            output_format: OutputFormat::Channels,
        }
    }
}
