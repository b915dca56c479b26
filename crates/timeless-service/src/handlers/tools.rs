//! Tool dispatch handlers.
//!
//! The four family endpoints share one dispatch core: resolve the tool in
//! the catalog, validate its required inputs, verify the balance, call the
//! provider, then commit the debit and the generation rows in one store
//! operation. Nothing is ever debited for a request that fails validation
//! or provider submission.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use timeless_core::{
    lookup_tool, BatchId, DispatchMode, Generation, GenerationStatus, Provider, ToolFamily,
    ToolSpec,
};
use timeless_store::Store;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::providers::Submission;
use crate::state::AppState;

/// Upper bound on scenes in a single fan-out request.
const MAX_SCENES: usize = 10;

/// Dispatch request shared by all tool families.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    /// Tool name to invoke.
    pub tool: Option<String>,
    /// Text prompt, for prompt-driven tools.
    pub prompt: Option<String>,
    /// Source image URL.
    pub image_url: Option<String>,
    /// Source video URL.
    pub video_url: Option<String>,
    /// Source audio URL.
    pub audio_url: Option<String>,
    /// Requested output duration in seconds.
    pub duration: Option<u32>,
    /// Storyboard scenes, for fan-out tools.
    #[serde(default)]
    pub scenes: Vec<SceneInput>,
}

/// One storyboard scene in a fan-out request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneInput {
    /// Source image for this scene.
    pub image_url: String,
    /// Per-scene prompt; falls back to the request prompt.
    #[serde(default)]
    pub prompt: Option<String>,
}

/// Response for a synchronous tool.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDispatchResponse {
    /// Always true.
    pub success: bool,
    /// URL of the finished output.
    pub output_url: String,
    /// Credits debited for this invocation.
    pub credits_used: i64,
}

/// Response for an asynchronous tool.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedDispatchResponse {
    /// Always true.
    pub success: bool,
    /// Always "processing".
    pub status: String,
    /// Provider job id for the submitted work.
    pub task_id: String,
    /// Generation row tracking the job.
    pub generation_id: String,
    /// Credits debited for this invocation.
    pub credits_used: i64,
    /// Human-readable hint.
    pub message: String,
}

/// Response for a fan-out tool.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanOutDispatchResponse {
    /// Always true.
    pub success: bool,
    /// Always "processing".
    pub status: String,
    /// Batch linking the per-scene rows.
    pub batch_id: String,
    /// One generation row per scene, in scene order.
    pub generation_ids: Vec<String>,
    /// Credits debited for the whole batch.
    pub credits_used: i64,
    /// Human-readable hint.
    pub message: String,
}

/// Dispatch response; the shape depends on the tool's dispatch mode.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum DispatchResponse {
    /// Synchronous result.
    Sync(SyncDispatchResponse),
    /// Queued job.
    Queued(QueuedDispatchResponse),
    /// Fan-out batch.
    FanOut(FanOutDispatchResponse),
}

/// `POST /v1/tools/image`
pub async fn image_tools(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<DispatchRequest>,
) -> Result<Json<DispatchResponse>, ApiError> {
    dispatch(&state, &auth, ToolFamily::Image, body).await
}

/// `POST /v1/tools/video`
pub async fn video_tools(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<DispatchRequest>,
) -> Result<Json<DispatchResponse>, ApiError> {
    dispatch(&state, &auth, ToolFamily::Video, body).await
}

/// `POST /v1/tools/cinema`
pub async fn cinema_tools(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<DispatchRequest>,
) -> Result<Json<DispatchResponse>, ApiError> {
    dispatch(&state, &auth, ToolFamily::Cinema, body).await
}

/// `POST /v1/tools/music`
pub async fn music_tools(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<DispatchRequest>,
) -> Result<Json<DispatchResponse>, ApiError> {
    dispatch(&state, &auth, ToolFamily::Music, body).await
}

async fn dispatch(
    state: &AppState,
    auth: &AuthUser,
    family: ToolFamily,
    body: DispatchRequest,
) -> Result<Json<DispatchResponse>, ApiError> {
    let tool_name = body
        .tool
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::BadRequest("tool is required".into()))?;

    let tool =
        lookup_tool(family, tool_name).ok_or_else(|| ApiError::UnknownTool(tool_name.into()))?;

    validate_inputs(tool, &body)?;

    let submissions = if tool.mode == DispatchMode::FanOut {
        body.scenes.len()
    } else {
        1
    };
    let required = tool
        .cost()
        .saturating_mul(i64::try_from(submissions).unwrap_or(i64::MAX));

    // Advisory balance check before money is spent at the provider; the
    // authoritative conditional debit happens in record_dispatch.
    let profile = state
        .store
        .get_profile(&auth.user_id)?
        .ok_or_else(|| ApiError::NotFound("Profile not found".into()))?;

    if !profile.has_active_subscription() && !profile.has_sufficient_credits(required) {
        return Err(ApiError::InsufficientCredits {
            balance: profile.credits,
            required,
        });
    }

    tracing::info!(
        user_id = %auth.user_id,
        tool = %tool.name,
        family = %family.as_str(),
        cost = %required,
        "Dispatching tool"
    );

    if tool.mode == DispatchMode::FanOut {
        return dispatch_fan_out(state, auth, tool, &body).await.map(Json);
    }

    let payload = provider_payload(tool, &body);
    let adapter = state.providers.adapter(tool.provider);
    let submission = adapter.submit(tool, &payload).await?;

    let mut generation = match submission {
        Submission::Completed {
            output_url,
            thumbnail_url,
        } => {
            let mut generation = Generation::completed(
                auth.user_id,
                tool.kind,
                tool.name,
                tool.cost(),
                output_url,
                tool.endpoint,
            );
            generation.thumbnail_url = thumbnail_url;
            generation
        }
        Submission::Queued { task_id } => Generation::pending(
            auth.user_id,
            tool.kind,
            tool.name,
            tool.cost(),
            task_id,
            tool.endpoint,
        ),
    };
    generation = generation.with_prompt(body.prompt.clone());

    // If the balance raced to below the cost since the advisory check, the
    // conditional debit fails here and the submitted provider job is orphaned.
    let receipt = state.store.record_dispatch(vec![generation]).map_err(|e| {
        tracing::warn!(
            user_id = %auth.user_id,
            tool = %tool.name,
            error = %e,
            "Dispatch commit failed after provider submission"
        );
        e
    })?;
    let generation = &receipt.generations[0];

    let response = if generation.status == GenerationStatus::Completed {
        DispatchResponse::Sync(SyncDispatchResponse {
            success: true,
            output_url: generation.output_url.clone().unwrap_or_default(),
            credits_used: receipt.credits_used,
        })
    } else {
        DispatchResponse::Queued(QueuedDispatchResponse {
            success: true,
            status: "processing".into(),
            task_id: generation.task_id.clone().unwrap_or_default(),
            generation_id: generation.id.to_string(),
            credits_used: receipt.credits_used,
            message: "Generation started. Poll the check endpoint for the result.".into(),
        })
    };

    Ok(Json(response))
}

/// Submit one provider job per scene, all linked under a fresh batch id.
async fn dispatch_fan_out(
    state: &AppState,
    auth: &AuthUser,
    tool: &'static ToolSpec,
    body: &DispatchRequest,
) -> Result<DispatchResponse, ApiError> {
    let adapter = state.providers.adapter(tool.provider);

    let payloads: Vec<Value> = body
        .scenes
        .iter()
        .map(|scene| scene_payload(tool, body, scene))
        .collect();

    let submissions =
        futures::future::join_all(payloads.iter().map(|payload| adapter.submit(tool, payload)))
            .await;

    let mut task_ids = Vec::with_capacity(submissions.len());
    let mut first_err: Option<ApiError> = None;
    for submission in submissions {
        match submission {
            Ok(Submission::Queued { task_id }) => task_ids.push(task_id),
            Ok(Submission::Completed { .. }) => {
                first_err.get_or_insert_with(|| {
                    ApiError::Internal("fan-out submission returned an inline result".into())
                });
            }
            Err(e) => {
                first_err.get_or_insert(ApiError::Provider(e));
            }
        }
    }

    // All-or-nothing: if any scene failed to submit, record no rows and
    // debit nothing. Jobs already accepted by the provider are abandoned.
    if let Some(err) = first_err {
        if !task_ids.is_empty() {
            tracing::warn!(
                user_id = %auth.user_id,
                tool = %tool.name,
                submitted = task_ids.len(),
                total = body.scenes.len(),
                "Abandoning partially submitted fan-out batch"
            );
        }
        return Err(err);
    }

    let batch_id = BatchId::generate();
    let generations: Vec<Generation> = task_ids
        .into_iter()
        .zip(&body.scenes)
        .map(|(task_id, scene)| {
            Generation::pending(
                auth.user_id,
                tool.kind,
                tool.name,
                tool.cost(),
                task_id,
                tool.endpoint,
            )
            .with_prompt(scene.prompt.clone().or_else(|| body.prompt.clone()))
            .with_batch(batch_id)
        })
        .collect();

    let receipt = state.store.record_dispatch(generations).map_err(|e| {
        tracing::warn!(
            user_id = %auth.user_id,
            tool = %tool.name,
            error = %e,
            "Fan-out commit failed after provider submissions"
        );
        e
    })?;

    Ok(DispatchResponse::FanOut(FanOutDispatchResponse {
        success: true,
        status: "processing".into(),
        batch_id: batch_id.to_string(),
        generation_ids: receipt.generations.iter().map(|g| g.id.to_string()).collect(),
        credits_used: receipt.credits_used,
        message: format!(
            "{} scenes submitted. Poll the check endpoint for results.",
            receipt.generations.len()
        ),
    }))
}

/// Reject requests missing any input the tool declares as required.
fn validate_inputs(tool: &ToolSpec, body: &DispatchRequest) -> Result<(), ApiError> {
    for key in tool.requires {
        let present = match *key {
            "prompt" => body.prompt.as_deref().is_some_and(|s| !s.is_empty()),
            "imageUrl" => body.image_url.as_deref().is_some_and(|s| !s.is_empty()),
            "videoUrl" => body.video_url.as_deref().is_some_and(|s| !s.is_empty()),
            "audioUrl" => body.audio_url.as_deref().is_some_and(|s| !s.is_empty()),
            "scenes" => !body.scenes.is_empty(),
            _ => false,
        };

        if !present {
            return Err(ApiError::BadRequest(format!(
                "{key} is required for {}",
                tool.name
            )));
        }
    }

    if body.scenes.len() > MAX_SCENES {
        return Err(ApiError::BadRequest(format!(
            "a story can have at most {MAX_SCENES} scenes"
        )));
    }

    Ok(())
}

/// Build the provider payload for a single submission.
fn provider_payload(tool: &ToolSpec, body: &DispatchRequest) -> Value {
    let mut payload = serde_json::Map::new();

    match tool.provider {
        // Fal models take snake_case media keys.
        Provider::Fal => {
            insert_str(&mut payload, "prompt", body.prompt.as_deref());
            insert_str(&mut payload, "image_url", body.image_url.as_deref());
            insert_str(&mut payload, "video_url", body.video_url.as_deref());
            insert_str(&mut payload, "audio_url", body.audio_url.as_deref());
        }
        // Kie task endpoints take camelCase keys.
        Provider::Kie => {
            insert_str(&mut payload, "prompt", body.prompt.as_deref());
            insert_str(&mut payload, "imageUrl", body.image_url.as_deref());
            insert_str(&mut payload, "videoUrl", body.video_url.as_deref());
            insert_str(&mut payload, "audioUrl", body.audio_url.as_deref());
        }
    }

    if let Some(duration) = body.duration {
        payload.insert("duration".into(), duration.into());
    }

    Value::Object(payload)
}

/// Payload for one scene of a fan-out request.
fn scene_payload(tool: &ToolSpec, body: &DispatchRequest, scene: &SceneInput) -> Value {
    let mut single = body.clone();
    single.image_url = Some(scene.image_url.clone());
    if scene.prompt.is_some() {
        single.prompt.clone_from(&scene.prompt);
    }
    provider_payload(tool, &single)
}

fn insert_str(payload: &mut serde_json::Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        payload.insert(key.to_string(), Value::String(value.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(tool: &str) -> DispatchRequest {
        DispatchRequest {
            tool: Some(tool.to_string()),
            prompt: None,
            image_url: None,
            video_url: None,
            audio_url: None,
            duration: None,
            scenes: Vec::new(),
        }
    }

    #[test]
    fn lip_sync_requires_audio() {
        let tool = lookup_tool(ToolFamily::Video, "lip-sync").unwrap();
        let mut body = request("lip-sync");
        body.video_url = Some("https://cdn.example/in.mp4".into());

        let err = validate_inputs(tool, &body).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("audioUrl"));
        assert!(message.contains("required"));
    }

    #[test]
    fn upscale_accepts_image_url() {
        let tool = lookup_tool(ToolFamily::Image, "upscale").unwrap();
        let mut body = request("upscale");
        body.image_url = Some("https://cdn.example/in.png".into());

        assert!(validate_inputs(tool, &body).is_ok());
    }

    #[test]
    fn story_animate_requires_scenes() {
        let tool = lookup_tool(ToolFamily::Video, "story-animate").unwrap();
        let body = request("story-animate");

        let err = validate_inputs(tool, &body).unwrap_err();
        assert!(err.to_string().contains("scenes is required"));
    }

    #[test]
    fn fal_payload_uses_snake_case_keys() {
        let tool = lookup_tool(ToolFamily::Video, "lip-sync").unwrap();
        let mut body = request("lip-sync");
        body.video_url = Some("https://cdn.example/in.mp4".into());
        body.audio_url = Some("https://cdn.example/in.mp3".into());

        let payload = provider_payload(tool, &body);
        assert_eq!(payload["video_url"], "https://cdn.example/in.mp4");
        assert_eq!(payload["audio_url"], "https://cdn.example/in.mp3");
    }

    #[test]
    fn kie_payload_uses_camel_case_keys() {
        let tool = lookup_tool(ToolFamily::Video, "image-to-video").unwrap();
        let mut body = request("image-to-video");
        body.image_url = Some("https://cdn.example/in.png".into());

        let payload = provider_payload(tool, &body);
        assert_eq!(payload["imageUrl"], "https://cdn.example/in.png");
        assert!(payload.get("image_url").is_none());
    }
}
