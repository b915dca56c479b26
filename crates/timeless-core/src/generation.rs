//! Generation records and job outcomes.
//!
//! A [`Generation`] is the persisted record of one tool invocation. Rows are
//! created in either a terminal `completed` state (synchronous tools) or in
//! `processing` (queued and task-based tools), and `processing` rows are moved
//! to a terminal state exactly once by reconciliation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BatchId, GenerationId, UserId};

/// What kind of media a generation produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    /// Still image output.
    Image,
    /// Video output (the cinema family also produces video).
    Video,
    /// Audio output.
    Music,
}

/// Lifecycle state of a generation row.
///
/// `Processing` is the only non-terminal state. Transitions are
/// `processing -> completed` and `processing -> failed`; terminal rows are
/// never mutated again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    /// Submitted to the provider, outcome unknown.
    Processing,
    /// Output delivered. Terminal.
    Completed,
    /// Provider reported failure or the job timed out. Terminal.
    Failed,
}

impl GenerationStatus {
    /// Whether this state permits no further transitions.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A persisted record of one tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    /// Generation ID, a ULID so rows sort by creation time.
    pub id: GenerationId,

    /// The owning user.
    pub user_id: UserId,

    /// Output media kind.
    pub kind: GenerationKind,

    /// The tool identifier that was dispatched (e.g. `upscale`, `lip-sync`).
    pub tool: String,

    /// The prompt, for tools that take one.
    pub prompt: Option<String>,

    /// Lifecycle state.
    pub status: GenerationStatus,

    /// URL of the finished output. Set on completion.
    pub output_url: Option<String>,

    /// URL of a preview thumbnail, when the provider supplies one.
    pub thumbnail_url: Option<String>,

    /// Opaque provider job ID, present for asynchronous dispatches.
    pub task_id: Option<String>,

    /// The provider endpoint or model the job was submitted to.
    pub provider_endpoint: Option<String>,

    /// Credits actually debited at dispatch. Zero for subscribed users.
    /// This exact amount is refunded if the generation fails.
    pub credits_used: i64,

    /// Fan-out linkage: all scenes of one story share a batch.
    pub batch_id: Option<BatchId>,

    /// Why the generation failed, for terminal `failed` rows.
    pub failure_reason: Option<String>,

    /// When the row was created (dispatch time).
    pub created_at: DateTime<Utc>,

    /// When the row was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Generation {
    /// Create a `processing` row for an asynchronous dispatch.
    #[must_use]
    pub fn pending(
        user_id: UserId,
        kind: GenerationKind,
        tool: &str,
        credits_used: i64,
        task_id: String,
        provider_endpoint: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: GenerationId::generate(),
            user_id,
            kind,
            tool: tool.to_owned(),
            prompt: None,
            status: GenerationStatus::Processing,
            output_url: None,
            thumbnail_url: None,
            task_id: Some(task_id),
            provider_endpoint: Some(provider_endpoint.to_owned()),
            credits_used,
            batch_id: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a `completed` row for a synchronous dispatch.
    #[must_use]
    pub fn completed(
        user_id: UserId,
        kind: GenerationKind,
        tool: &str,
        credits_used: i64,
        output_url: String,
        provider_endpoint: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: GenerationId::generate(),
            user_id,
            kind,
            tool: tool.to_owned(),
            prompt: None,
            status: GenerationStatus::Completed,
            output_url: Some(output_url),
            thumbnail_url: None,
            task_id: None,
            provider_endpoint: Some(provider_endpoint.to_owned()),
            credits_used,
            batch_id: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach the prompt text.
    #[must_use]
    pub fn with_prompt(mut self, prompt: Option<String>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Link this row into a fan-out batch.
    #[must_use]
    pub fn with_batch(mut self, batch_id: BatchId) -> Self {
        self.batch_id = Some(batch_id);
        self
    }

    /// Whether reconciliation still has work to do on this row.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self.status, GenerationStatus::Processing)
    }
}

/// Normalized outcome of one provider status check.
///
/// Provider adapters fetch raw JSON; normalization maps every vocabulary the
/// providers use (numeric flags, result URL presence, textual statuses) into
/// this one variant, and reconciliation acts on it alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// No terminal signal observed; the row stays `processing`.
    Pending,
    /// The job finished and produced output.
    Succeeded {
        /// URL of the finished output.
        output_url: String,
        /// Preview thumbnail, when the provider supplies one.
        thumbnail_url: Option<String>,
    },
    /// The job failed.
    Failed {
        /// Provider-reported reason, already safe to surface.
        reason: String,
    },
}

impl JobOutcome {
    /// Whether this outcome ends the job.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Aggregate status of a fan-out batch, derived from child rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// At least one child is still processing and none has failed.
    Processing,
    /// Every child completed.
    Completed,
    /// At least one child failed.
    Failed,
}

impl BatchStatus {
    /// Derive the aggregate from child statuses.
    ///
    /// Any failed child fails the batch; the batch completes only once every
    /// child has completed. An empty batch reports `Processing` (it cannot be
    /// produced by dispatch, which rejects empty scene lists).
    #[must_use]
    pub fn aggregate(children: &[GenerationStatus]) -> Self {
        if children
            .iter()
            .any(|s| matches!(s, GenerationStatus::Failed))
        {
            Self::Failed
        } else if !children.is_empty()
            && children
                .iter()
                .all(|s| matches!(s, GenerationStatus::Completed))
        {
            Self::Completed
        } else {
            Self::Processing
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_row_starts_processing() {
        let g = Generation::pending(
            UserId::generate(),
            GenerationKind::Video,
            "lip-sync",
            20,
            "task-abc".into(),
            "fal-ai/sync-lipsync",
        );
        assert_eq!(g.status, GenerationStatus::Processing);
        assert!(g.is_pending());
        assert_eq!(g.task_id.as_deref(), Some("task-abc"));
        assert!(g.output_url.is_none());
    }

    #[test]
    fn completed_row_is_terminal() {
        let g = Generation::completed(
            UserId::generate(),
            GenerationKind::Image,
            "upscale",
            3,
            "https://cdn.example/out.png".into(),
            "fal-ai/esrgan",
        );
        assert_eq!(g.status, GenerationStatus::Completed);
        assert!(g.status.is_terminal());
        assert!(!g.is_pending());
        assert!(g.task_id.is_none());
    }

    #[test]
    fn batch_aggregate_rules() {
        use GenerationStatus::{Completed, Failed, Processing};

        assert_eq!(
            BatchStatus::aggregate(&[Completed, Processing]),
            BatchStatus::Processing
        );
        assert_eq!(
            BatchStatus::aggregate(&[Completed, Completed]),
            BatchStatus::Completed
        );
        assert_eq!(
            BatchStatus::aggregate(&[Completed, Failed, Processing]),
            BatchStatus::Failed
        );
        assert_eq!(BatchStatus::aggregate(&[]), BatchStatus::Processing);
    }

    #[test]
    fn outcome_terminality() {
        assert!(!JobOutcome::Pending.is_terminal());
        assert!(JobOutcome::Succeeded {
            output_url: "https://x/y.mp4".into(),
            thumbnail_url: None
        }
        .is_terminal());
        assert!(JobOutcome::Failed {
            reason: "boom".into()
        }
        .is_terminal());
    }
}
