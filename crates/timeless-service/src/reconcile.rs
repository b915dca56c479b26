//! Generation reconciliation.
//!
//! One entry point, [`reconcile_generation`], drives the per-row state
//! machine: `processing -> completed` | `processing -> failed` (with refund)
//! | `processing -> processing`. The check endpoint runs it over the
//! caller's pending rows; the sweeper runs it over everyone's.
//!
//! A provider error during a check never mutates the row; the row is
//! reported as `check_failed` and retried on the next pass.

use chrono::Utc;

use timeless_core::{lookup_tool_by_name, Generation, GenerationStatus, JobOutcome};
use timeless_store::Store;

use crate::state::AppState;

/// Result of reconciling one generation row.
#[derive(Debug)]
pub struct CheckOutcome {
    /// The row after reconciliation.
    pub generation: Generation,
    /// Whether this check transitioned the row.
    pub changed: bool,
    /// Credits returned to the owner by this check.
    pub credits_refunded: i64,
    /// The provider query failed; the row was left untouched.
    pub check_failed: bool,
}

impl CheckOutcome {
    fn unchanged(generation: Generation) -> Self {
        Self {
            generation,
            changed: false,
            credits_refunded: 0,
            check_failed: false,
        }
    }

    fn failed_check(generation: Generation) -> Self {
        Self {
            generation,
            changed: false,
            credits_refunded: 0,
            check_failed: true,
        }
    }
}

/// Poll the provider for one row and apply the resulting transition.
pub async fn reconcile_generation(state: &AppState, generation: Generation) -> CheckOutcome {
    // Terminal rows never change again; re-checking one is a no-op.
    if generation.status.is_terminal() {
        return CheckOutcome::unchanged(generation);
    }

    let Some(tool) = lookup_tool_by_name(&generation.tool) else {
        tracing::warn!(
            generation_id = %generation.id,
            tool = %generation.tool,
            "Pending generation references a tool missing from the catalog"
        );
        return CheckOutcome::failed_check(generation);
    };

    // Sync dispatches are born terminal, so a pending row without a task id
    // is corrupt; leave it to the timeout sweep rather than guessing.
    let Some(task_id) = generation.task_id.clone() else {
        tracing::warn!(
            generation_id = %generation.id,
            tool = %generation.tool,
            "Pending generation has no task id to poll"
        );
        return CheckOutcome::failed_check(generation);
    };

    let adapter = state.providers.adapter(tool.provider);
    let outcome = match adapter.poll(tool, &task_id).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!(
                generation_id = %generation.id,
                tool = %generation.tool,
                error = %e,
                "Provider status check failed"
            );
            return CheckOutcome::failed_check(generation);
        }
    };

    match outcome {
        JobOutcome::Pending => CheckOutcome::unchanged(generation),
        JobOutcome::Succeeded {
            output_url,
            thumbnail_url,
        } => {
            match state
                .store
                .complete_generation(&generation.id, &output_url, thumbnail_url.as_deref())
            {
                Ok(transition) => {
                    if transition.changed {
                        tracing::info!(
                            generation_id = %transition.generation.id,
                            tool = %transition.generation.tool,
                            "Generation completed"
                        );
                    }
                    CheckOutcome {
                        generation: transition.generation,
                        changed: transition.changed,
                        credits_refunded: 0,
                        check_failed: false,
                    }
                }
                Err(e) => {
                    tracing::warn!(generation_id = %generation.id, error = %e, "Failed to record completion");
                    CheckOutcome::failed_check(generation)
                }
            }
        }
        JobOutcome::Failed { reason } => match state.store.fail_generation(&generation.id, &reason) {
            Ok(transition) => {
                if transition.changed {
                    tracing::info!(
                        generation_id = %transition.generation.id,
                        tool = %transition.generation.tool,
                        reason = %reason,
                        credits_refunded = %transition.credits_refunded,
                        "Generation failed"
                    );
                }
                CheckOutcome {
                    generation: transition.generation,
                    changed: transition.changed,
                    credits_refunded: transition.credits_refunded,
                    check_failed: false,
                }
            }
            Err(e) => {
                tracing::warn!(generation_id = %generation.id, error = %e, "Failed to record failure");
                CheckOutcome::failed_check(generation)
            }
        },
    }
}

/// Counters from one background sweep.
#[derive(Debug, Default)]
pub struct SweepStats {
    /// Rows polled against their provider.
    pub checked: usize,
    /// Rows transitioned to `completed`.
    pub completed: usize,
    /// Rows transitioned to `failed` by the provider's verdict.
    pub failed: usize,
    /// Rows failed for exceeding the pending timeout.
    pub expired: usize,
    /// Rows whose provider query failed this sweep.
    pub check_failed: usize,
}

/// Reconcile every pending row in the store, expiring rows stuck in
/// `processing` past the configured timeout.
pub async fn sweep(state: &AppState) -> SweepStats {
    let mut stats = SweepStats::default();

    let pending = match state.store.list_pending_generations() {
        Ok(pending) => pending,
        Err(e) => {
            tracing::error!(error = %e, "Failed to list pending generations");
            return stats;
        }
    };

    let cutoff = Utc::now() - chrono::Duration::minutes(state.config.pending_timeout_minutes);

    for generation in pending {
        if generation.created_at < cutoff {
            match state
                .store
                .fail_generation(&generation.id, "generation timed out")
            {
                Ok(transition) if transition.changed => {
                    tracing::info!(
                        generation_id = %transition.generation.id,
                        tool = %transition.generation.tool,
                        credits_refunded = %transition.credits_refunded,
                        "Expired stuck generation"
                    );
                    stats.expired += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(generation_id = %generation.id, error = %e, "Failed to expire generation");
                }
            }
            continue;
        }

        let outcome = reconcile_generation(state, generation).await;
        stats.checked += 1;

        if outcome.check_failed {
            stats.check_failed += 1;
        } else if outcome.changed {
            match outcome.generation.status {
                GenerationStatus::Completed => stats.completed += 1,
                GenerationStatus::Failed => stats.failed += 1,
                GenerationStatus::Processing => {}
            }
        }
    }

    stats
}
