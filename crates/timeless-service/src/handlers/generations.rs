//! Generation status handlers.
//!
//! The check endpoint is the client-driven half of reconciliation: it polls
//! the provider for every pending generation the user owns (or one specific
//! row), applies terminal transitions through the store, and reports what
//! changed. Listing endpoints are read-only views over the same rows.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use timeless_core::{BatchId, BatchStatus, Generation, GenerationId, GenerationKind, GenerationStatus};
use timeless_store::Store;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::reconcile::{self, CheckOutcome};
use crate::state::AppState;

/// Default page size for generation listings.
const DEFAULT_PAGE_SIZE: usize = 50;
/// Hard cap on page size.
const MAX_PAGE_SIZE: usize = 100;

/// Body for `POST /v1/generations/check`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    /// Check only this generation instead of every pending one.
    #[serde(default)]
    pub generation_id: Option<String>,
}

/// Per-generation entry in a check response.
#[derive(Debug, Serialize)]
pub struct CheckResult {
    /// Generation ID.
    pub id: String,
    /// Status after the check.
    pub status: String,
    /// Whether this check moved the row to a terminal state.
    pub changed: bool,
    /// Output URL, present once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    /// Thumbnail URL, when the provider supplied one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    /// Credits returned by a failure transition in this check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credits_refunded: Option<i64>,
    /// Set when the status probe itself failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response for `POST /v1/generations/check`.
#[derive(Debug, Serialize)]
pub struct CheckResponse {
    /// One entry per checked generation.
    pub results: Vec<CheckResult>,
    /// How many of the user's generations are still processing.
    pub pending_count: usize,
}

/// Query parameters for `GET /v1/generations`.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Page size, capped at [`MAX_PAGE_SIZE`].
    pub limit: Option<usize>,
    /// Return rows strictly older than this generation ID.
    pub starting_after: Option<String>,
}

/// Generation row as returned by the API.
#[derive(Debug, Serialize)]
pub struct GenerationResponse {
    /// Generation ID.
    pub id: String,
    /// Output media kind.
    #[serde(rename = "type")]
    pub kind: GenerationKind,
    /// Tool that produced it.
    pub tool: String,
    /// Lifecycle state.
    pub status: String,
    /// Credits debited at dispatch.
    pub credits_used: i64,
    /// Output URL, present once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    /// Thumbnail URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    /// Prompt text, for prompt-driven tools.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Batch this row belongs to, for fan-out scenes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    /// Failure reason, for failed rows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Dispatch time.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Last update time.
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Generation> for GenerationResponse {
    fn from(generation: &Generation) -> Self {
        Self {
            id: generation.id.to_string(),
            kind: generation.kind,
            tool: generation.tool.clone(),
            status: status_str(generation).to_string(),
            credits_used: generation.credits_used,
            output_url: generation.output_url.clone(),
            thumbnail_url: generation.thumbnail_url.clone(),
            prompt: generation.prompt.clone(),
            batch_id: generation.batch_id.map(|b| b.to_string()),
            failure_reason: generation.failure_reason.clone(),
            created_at: generation.created_at,
            updated_at: generation.updated_at,
        }
    }
}

/// Response for `GET /v1/generations`.
#[derive(Debug, Serialize)]
pub struct ListResponse {
    /// Page of rows, newest first.
    pub generations: Vec<GenerationResponse>,
    /// Whether older rows exist beyond this page.
    pub has_more: bool,
}

/// Response for `GET /v1/generations/batches/:batch_id`.
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    /// Batch ID.
    pub batch_id: String,
    /// Aggregate status derived from the child rows.
    pub status: BatchStatus,
    /// Child rows in creation order.
    pub generations: Vec<GenerationResponse>,
}

/// `POST /v1/generations/check`
///
/// Polls providers for pending generations and applies any terminal
/// transition exactly once. Safe to call repeatedly: rows that are already
/// terminal come back with `changed: false` and no provider call is made.
pub async fn check_generations(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    body: Option<Json<CheckRequest>>,
) -> Result<Json<CheckResponse>, ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();

    let targets: Vec<Generation> = match request.generation_id.as_deref() {
        Some(raw) => {
            let id = GenerationId::from_str(raw)
                .map_err(|_| ApiError::BadRequest("Invalid generation ID".into()))?;
            let generation = state
                .store
                .get_generation(&id)?
                .filter(|g| g.user_id == auth.user_id)
                .ok_or_else(|| ApiError::NotFound("Generation not found".into()))?;
            vec![generation]
        }
        None => state.store.list_pending_generations_for_user(&auth.user_id)?,
    };

    let mut results = Vec::with_capacity(targets.len());
    for generation in targets {
        // Terminal rows short-circuit inside reconcile_generation; no
        // provider call is made for them.
        let outcome = reconcile::reconcile_generation(&state, generation).await;
        results.push(check_result(&outcome));
    }

    let pending_count = state
        .store
        .list_pending_generations_for_user(&auth.user_id)?
        .len();

    Ok(Json(CheckResponse {
        results,
        pending_count,
    }))
}

fn check_result(outcome: &CheckOutcome) -> CheckResult {
    let generation = &outcome.generation;
    CheckResult {
        id: generation.id.to_string(),
        status: status_str(generation).to_string(),
        changed: outcome.changed,
        output_url: generation.output_url.clone(),
        thumbnail_url: generation.thumbnail_url.clone(),
        credits_refunded: (outcome.changed && generation.status == GenerationStatus::Failed)
            .then_some(outcome.credits_refunded),
        error: outcome.check_failed.then(|| "check_failed".to_string()),
    }
}

/// `GET /v1/generations`
pub async fn list_generations(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);

    let before = match query.starting_after.as_deref() {
        Some(raw) => Some(
            GenerationId::from_str(raw)
                .map_err(|_| ApiError::BadRequest("Invalid starting_after cursor".into()))?,
        ),
        None => None,
    };

    // Fetch one extra row to learn whether another page exists.
    let mut rows = state
        .store
        .list_generations_by_user(&auth.user_id, limit + 1, before.as_ref())?;
    let has_more = rows.len() > limit;
    rows.truncate(limit);

    Ok(Json(ListResponse {
        generations: rows.iter().map(GenerationResponse::from).collect(),
        has_more,
    }))
}

/// `GET /v1/generations/:id`
pub async fn get_generation(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<GenerationResponse>, ApiError> {
    let id = GenerationId::from_str(&id)
        .map_err(|_| ApiError::BadRequest("Invalid generation ID".into()))?;

    let generation = state
        .store
        .get_generation(&id)?
        .filter(|g| g.user_id == auth.user_id)
        .ok_or_else(|| ApiError::NotFound("Generation not found".into()))?;

    Ok(Json(GenerationResponse::from(&generation)))
}

/// `GET /v1/generations/batches/:batch_id`
pub async fn get_batch(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(batch_id): Path<String>,
) -> Result<Json<BatchResponse>, ApiError> {
    let batch_id =
        BatchId::from_str(&batch_id).map_err(|_| ApiError::BadRequest("Invalid batch ID".into()))?;

    let generations = state.store.list_batch(&batch_id)?;
    if generations.is_empty() || generations.iter().any(|g| g.user_id != auth.user_id) {
        return Err(ApiError::NotFound("Batch not found".into()));
    }

    let statuses: Vec<_> = generations.iter().map(|g| g.status).collect();

    Ok(Json(BatchResponse {
        batch_id: batch_id.to_string(),
        status: BatchStatus::aggregate(&statuses),
        generations: generations.iter().map(GenerationResponse::from).collect(),
    }))
}

fn status_str(generation: &Generation) -> &'static str {
    match generation.status {
        GenerationStatus::Processing => "processing",
        GenerationStatus::Failed => "failed",
        GenerationStatus::Completed => "completed",
    }
}
