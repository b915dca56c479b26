//! Request and response types for the timeless client.

use serde::{Deserialize, Serialize};

/// Body for provisioning a profile.
#[derive(Debug, Clone, Serialize)]
pub struct CreateProfileRequest {
    /// User to provision.
    pub user_id: String,
    /// Starting balance; the server default applies when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credits: Option<i64>,
}

/// Body for a subscription update.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionUpdateRequest {
    /// User whose subscription changed.
    pub user_id: String,
    /// New state: `active`, `inactive` or `cancelled`.
    pub status: String,
}

/// Body for a credit grant.
#[derive(Debug, Clone, Serialize)]
pub struct AddCreditsRequest {
    /// User receiving the grant.
    pub user_id: String,
    /// Credits to add; must be positive.
    pub amount: i64,
    /// Ledger description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Profile as returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileResponse {
    /// Owning user.
    pub user_id: String,
    /// Current credit balance.
    pub credits: i64,
    /// Subscription state.
    pub subscription_status: String,
    /// Total credits ever debited.
    pub lifetime_credits_spent: i64,
    /// Total credits ever granted.
    pub lifetime_credits_granted: i64,
    /// Number of generations dispatched.
    pub generation_count: i64,
}

/// Response to a credit grant.
#[derive(Debug, Clone, Deserialize)]
pub struct AddCreditsResponse {
    /// User the grant applied to.
    pub user_id: String,
    /// Balance after the grant.
    pub balance: i64,
}

/// Response to a balance query.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceResponse {
    /// Current credit balance.
    pub credits: i64,
    /// Whether an active subscription bypasses per-tool debits.
    pub subscription_active: bool,
}

/// Tool dispatch request.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDispatchRequest {
    /// Tool name to invoke.
    pub tool: String,
    /// Text prompt, for prompt-driven tools.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Source image URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Source video URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    /// Source audio URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    /// Requested output duration in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    /// Storyboard scenes, for fan-out tools.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub scenes: Vec<Scene>,
}

/// One storyboard scene in a fan-out request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    /// Source image for this scene.
    pub image_url: String,
    /// Per-scene prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

/// Tool dispatch response.
///
/// The server shape varies by dispatch mode (synchronous result, queued job
/// or fan-out batch); fields absent for a given mode deserialize as `None`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResponse {
    /// Always true on a 2xx response.
    pub success: bool,
    /// Credits debited for this invocation.
    pub credits_used: i64,
    /// Output URL, for synchronous tools.
    pub output_url: Option<String>,
    /// "processing", for asynchronous tools.
    pub status: Option<String>,
    /// Provider job ID, for queued tools.
    pub task_id: Option<String>,
    /// Generation row tracking a queued job.
    pub generation_id: Option<String>,
    /// Batch ID, for fan-out tools.
    pub batch_id: Option<String>,
    /// Per-scene generation rows, for fan-out tools.
    pub generation_ids: Option<Vec<String>>,
    /// Human-readable hint.
    pub message: Option<String>,
}

/// Body for a generation check.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    /// Check only this generation instead of every pending one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_id: Option<String>,
}

/// Per-generation entry in a check response.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckResult {
    /// Generation ID.
    pub id: String,
    /// Status after the check.
    pub status: String,
    /// Whether this check moved the row to a terminal state.
    pub changed: bool,
    /// Output URL, present once completed.
    pub output_url: Option<String>,
    /// Thumbnail URL, when the provider supplied one.
    pub thumbnail_url: Option<String>,
    /// Credits returned by a failure transition in this check.
    pub credits_refunded: Option<i64>,
    /// Set when the status probe itself failed.
    pub error: Option<String>,
}

/// Response to a generation check.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckResponse {
    /// One entry per checked generation.
    pub results: Vec<CheckResult>,
    /// How many generations are still processing.
    pub pending_count: usize,
}

/// Error body returned by the API.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorResponse {
    /// Human-readable message.
    pub error: String,
    /// Stable machine-readable tag.
    pub code: String,
    /// Code-specific extra fields, e.g. `balance` and `required`.
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}
