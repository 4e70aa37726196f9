use crate::models::error::FeedError;
use crate::models::state::LoopState;

/// Event delegate for capture loop notifications.
///
/// All methods are called from the loop thread. Keep them short; the loop
/// does not poll while a callback runs.
pub trait LoopDelegate: Send + Sync {
    /// Called when the loop state changes.
    fn on_state_changed(&self, state: &LoopState);

    /// Called for every error the loop handles, fatal or not.
    fn on_error(&self, error: &FeedError);
}
