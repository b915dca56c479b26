//! Background reconciliation sweeper.
//!
//! Clients drive reconciliation by polling the check endpoint, but a user
//! who closes the app would otherwise leave jobs `processing` forever. The
//! sweeper re-runs the same reconciliation pass on a fixed interval so rows
//! settle (and stuck rows expire and refund) without any client involved.

use std::sync::Arc;
use std::time::Duration;

use crate::reconcile;
use crate::state::AppState;

/// Periodic background task reconciling all pending generations.
pub struct Sweeper {
    state: Arc<AppState>,
    interval: Duration,
}

impl Sweeper {
    /// Create a sweeper over the shared application state.
    #[must_use]
    pub fn new(state: Arc<AppState>) -> Self {
        let interval = Duration::from_secs(state.config.sweep_interval_seconds);
        Self { state, interval }
    }

    /// Run the sweep loop until the task is cancelled.
    pub async fn run(self) {
        tracing::info!(
            interval_seconds = self.interval.as_secs(),
            pending_timeout_minutes = self.state.config.pending_timeout_minutes,
            "Reconciliation sweeper starting"
        );

        let mut ticker = tokio::time::interval(self.interval);
        // The first tick fires immediately; skip it so startup isn't
        // dominated by a full sweep before the server is listening.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let stats = reconcile::sweep(&self.state).await;
            if stats.checked > 0 || stats.expired > 0 {
                tracing::info!(
                    checked = stats.checked,
                    completed = stats.completed,
                    failed = stats.failed,
                    expired = stats.expired,
                    check_failed = stats.check_failed,
                    "Sweep finished"
                );
            }
        }
    }
}
