//! Route table and middleware assembly.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{credits, generations, health, profiles, tickets, tools};
use crate::state::AppState;

// ============================================================================
// Concurrency caps
// ============================================================================

/// Maximum concurrent requests for tool dispatch endpoints.
/// Each dispatch holds an upstream provider call open, so these are capped
/// well below the general API limit.
const DISPATCH_MAX_CONCURRENT_REQUESTS: usize = 25;

/// Cap on in-flight requests across the general API surface.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Assemble the full router.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Tools (user JWT auth, dispatch-limited)
/// - `POST /v1/tools/image` - Dispatch an image tool
/// - `POST /v1/tools/video` - Dispatch a video tool
/// - `POST /v1/tools/cinema` - Dispatch a cinema tool
/// - `POST /v1/tools/music` - Dispatch a music tool
///
/// ## Generations (user JWT auth)
/// - `POST /v1/generations/check` - Reconcile pending generations
/// - `GET /v1/generations` - List the user's generations
/// - `GET /v1/generations/:id` - Fetch one generation
/// - `GET /v1/generations/batches/:batch_id` - Fetch a fan-out batch
///
/// ## Profiles
/// - `POST /v1/profiles` - Provision a profile (service API key)
/// - `GET /v1/profiles/me` - Get current user's profile
/// - `PUT /v1/profiles/me/subscription` - Update subscription (service API key)
///
/// ## Credits
/// - `GET /v1/credits/balance` - Get current balance
/// - `GET /v1/credits/transactions` - List transaction history
/// - `POST /v1/credits/add` - Grant credits (service API key)
///
/// ## Tickets (user JWT auth)
/// - `POST /v1/tickets` - Open a support ticket
/// - `GET /v1/tickets` - List the user's tickets
/// - `GET /v1/tickets/:id` - Fetch one ticket
/// - `DELETE /v1/tickets/:id` - Delete a ticket
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    // Dispatch endpoints get their own, tighter concurrency limit.
    let tool_routes = Router::new()
        .route("/image", post(tools::image_tools))
        .route("/video", post(tools::video_tools))
        .route("/cinema", post(tools::cinema_tools))
        .route("/music", post(tools::music_tools))
        .layer(ConcurrencyLimitLayer::new(DISPATCH_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        // Generations
        .route("/generations/check", post(generations::check_generations))
        .route("/generations", get(generations::list_generations))
        .route("/generations/batches/:batch_id", get(generations::get_batch))
        .route("/generations/:id", get(generations::get_generation))
        // Profiles
        .route("/profiles", post(profiles::create_profile))
        .route("/profiles/me", get(profiles::get_my_profile))
        .route("/profiles/me/subscription", put(profiles::set_subscription))
        // Credits
        .route("/credits/balance", get(credits::get_balance))
        .route("/credits/transactions", get(credits::list_transactions))
        .route("/credits/add", post(credits::add_credits))
        // Tickets
        .route("/tickets", post(tickets::create_ticket))
        .route("/tickets", get(tickets::list_tickets))
        .route("/tickets/:id", get(tickets::get_ticket))
        .route("/tickets/:id", delete(tickets::delete_ticket))
        // Tool dispatch (with its own concurrency limit)
        .nest("/tools", tool_routes)
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health stays outside the versioned, concurrency-limited surface
        .route("/health", get(health::health))
        .nest("/v1", api_routes)
        // Middleware applied to everything
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// CORS layer from the configured origin list.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
