use super::error::FeedError;

/// Capture loop state machine.
///
/// State transitions:
/// ```text
/// idle → running → stopped
///           ↓
///         failed
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopped,
    Failed(FeedError),
}

impl LoopState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed(_))
    }
}

/// Counters collected while the loop runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopDiagnostics {
    pub polls: u64,
    pub packets: u64,
    pub empty_packets: u64,
    pub frames_captured: u64,
    pub records_emitted: u64,
    pub packets_skipped: u64,
    pub transient_errors: u64,
    pub discontinuities: u64,
}
