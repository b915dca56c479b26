//! Timeless HTTP API Service.
//!
//! This crate provides the HTTP API for the Timeless generation backend,
//! including:
//!
//! - Credit-gated tool dispatch to generation providers
//! - Generation status checks and background reconciliation
//! - Profile provisioning and subscription state
//! - Credit balance and transaction history
//! - Support tickets
//!
//! # Authentication
//!
//! Requests authenticate one of two ways:
//!
//! 1. **Timeless JWT tokens** - For end-user requests (the app)
//! 2. **Service API keys** - For service-to-service requests (auth backend,
//!    billing backend)

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Pedantic exceptions for handler-heavy code
#![allow(clippy::missing_errors_doc)] // every handler returns Result
#![allow(clippy::unused_async)] // axum wants handlers async either way

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod providers;
pub mod reconcile;
pub mod routes;
pub mod state;
pub mod sweeper;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use providers::{ProviderAdapter, ProviderError, Providers, Submission};
pub use routes::create_router;
pub use state::AppState;
pub use sweeper::Sweeper;
