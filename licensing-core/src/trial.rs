//! Read-only view of the trial period.

use crate::store::ConfigStore;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Trial progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialState {
    /// Days the app has been used.
    pub days_of_use: u32,
    /// `days_of_use` clamped to the trial length, for display.
    pub days_of_use_ui: u32,
    /// Length of the trial in days.
    pub trial_days: u32,
    /// True while the trial still grants access.
    pub trial_is_active: bool,
}

impl TrialState {
    /// Computes the trial state.
    #[must_use]
    pub fn new(days_of_use: u32, trial_days: u32) -> Self {
        Self {
            days_of_use,
            days_of_use_ui: days_of_use.min(trial_days),
            trial_days,
            trial_is_active: days_of_use <= trial_days,
        }
    }

    /// Reads the days-of-use counter from `store` (stored as decimal text).
    /// A missing or unreadable counter counts as zero days.
    pub fn load(store: &dyn ConfigStore, entry: &str, trial_days: u32) -> Self {
        let days_of_use = store
            .get(entry)
            .and_then(|bytes| {
                let parsed = std::str::from_utf8(&bytes).ok().and_then(|s| s.trim().parse().ok());
                if parsed.is_none() {
                    warn!("Ignoring unreadable days-of-use counter");
                }
                parsed
            })
            .unwrap_or(0);
        Self::new(days_of_use, trial_days)
    }

    /// Days left in the trial.
    #[must_use]
    pub fn days_remaining(&self) -> u32 {
        self.trial_days.saturating_sub(self.days_of_use)
    }
}
