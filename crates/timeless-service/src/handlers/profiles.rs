//! Profile handlers.
//!
//! Profile creation and subscription updates are service-to-service calls
//! (the auth backend provisions a profile on signup, the billing backend
//! flips subscription state). Reads are user-scoped.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use timeless_core::{Profile, SubscriptionStatus, UserId};
use timeless_store::{Store, StoreError};

use crate::auth::{AuthUser, ServiceAuth};
use crate::error::ApiError;
use crate::state::AppState;

/// Body for `POST /v1/profiles`.
#[derive(Debug, Deserialize)]
pub struct CreateProfileRequest {
    /// User to provision.
    pub user_id: String,
    /// Starting balance; defaults to the configured welcome grant.
    #[serde(default)]
    pub credits: Option<i64>,
}

/// Body for `PUT /v1/profiles/me/subscription`.
#[derive(Debug, Deserialize)]
pub struct SubscriptionRequest {
    /// User whose subscription changed.
    pub user_id: String,
    /// New subscription state.
    pub status: SubscriptionStatus,
}

/// Profile as returned by the API.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    /// Owning user.
    pub user_id: String,
    /// Current credit balance.
    pub credits: i64,
    /// Subscription state.
    pub subscription_status: SubscriptionStatus,
    /// Total credits ever debited.
    pub lifetime_credits_spent: i64,
    /// Total credits ever granted.
    pub lifetime_credits_granted: i64,
    /// Number of generations dispatched.
    pub generation_count: i64,
    /// Provisioning time.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Last update time.
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Profile> for ProfileResponse {
    fn from(profile: &Profile) -> Self {
        Self {
            user_id: profile.user_id.to_string(),
            credits: profile.credits,
            subscription_status: profile.subscription_status,
            lifetime_credits_spent: profile.lifetime_credits_spent,
            lifetime_credits_granted: profile.lifetime_credits_granted,
            generation_count: profile.generation_count,
            created_at: profile.created_at,
            updated_at: profile.updated_at,
        }
    }
}

/// `POST /v1/profiles` (service auth)
pub async fn create_profile(
    State(state): State<Arc<AppState>>,
    service: ServiceAuth,
    Json(body): Json<CreateProfileRequest>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user_id = UserId::from_str(&body.user_id)
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))?;

    let credits = body.credits.unwrap_or(state.config.starting_credits);
    if credits < 0 {
        return Err(ApiError::BadRequest("credits must not be negative".into()));
    }

    let profile = Profile::new(user_id, credits);
    match state.store.create_profile(&profile) {
        Ok(()) => {}
        Err(StoreError::AlreadyExists) => {
            return Err(ApiError::Conflict("Profile already exists".into()))
        }
        Err(e) => return Err(e.into()),
    }

    tracing::info!(
        user_id = %user_id,
        credits = %credits,
        service = %service.service_name,
        "Provisioned profile"
    );

    Ok(Json(ProfileResponse::from(&profile)))
}

/// `GET /v1/profiles/me`
pub async fn get_my_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ProfileResponse>, ApiError> {
    let profile = state
        .store
        .get_profile(&auth.user_id)?
        .ok_or_else(|| ApiError::NotFound("Profile not found".into()))?;

    Ok(Json(ProfileResponse::from(&profile)))
}

/// `PUT /v1/profiles/me/subscription` (service auth)
pub async fn set_subscription(
    State(state): State<Arc<AppState>>,
    service: ServiceAuth,
    Json(body): Json<SubscriptionRequest>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user_id = UserId::from_str(&body.user_id)
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))?;

    let profile = match state.store.set_subscription_status(&user_id, body.status) {
        Ok(profile) => profile,
        Err(StoreError::NotFound) => {
            return Err(ApiError::NotFound("Profile not found".into()))
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(
        user_id = %user_id,
        status = ?body.status,
        service = %service.service_name,
        "Updated subscription status"
    );

    Ok(Json(ProfileResponse::from(&profile)))
}
