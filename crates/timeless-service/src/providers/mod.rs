//! Provider adapters.
//!
//! Each third-party provider gets one adapter implementing [`ProviderAdapter`]:
//! it knows how to start a job and how to fetch the raw status payload for a
//! running one. Everything downstream of the adapter works with
//! [`timeless_core::JobOutcome`] only.

pub mod fal;
pub mod kie;
pub mod outcome;

use async_trait::async_trait;

use timeless_core::{JobOutcome, Provider, ToolSpec};

use crate::config::ServiceConfig;

pub use fal::FalClient;
pub use kie::KieClient;

/// Error type for provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider returned a non-success response.
    #[error("provider returned {status}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body (truncated for logging).
        body: String,
    },

    /// Provider response did not carry what the call needed.
    #[error("unexpected provider response: {0}")]
    UnexpectedResponse(String),

    /// Provider credentials are not configured.
    #[error("provider not configured: {0}")]
    Configuration(String),
}

/// Result of starting a provider job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// The provider returned the finished artifact inline.
    Completed {
        /// URL of the generated output.
        output_url: String,
        /// Optional preview URL.
        thumbnail_url: Option<String>,
    },
    /// The provider accepted the job and returned a polling handle.
    Queued {
        /// Opaque provider job id.
        task_id: String,
    },
}

/// One provider's dispatch and status surface.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Start a job for `tool` with the given input payload.
    async fn submit(
        &self,
        tool: &ToolSpec,
        input: &serde_json::Value,
    ) -> Result<Submission, ProviderError>;

    /// Poll the provider for a previously submitted job.
    async fn poll(&self, tool: &ToolSpec, task_id: &str) -> Result<JobOutcome, ProviderError>;
}

/// All configured provider adapters.
pub struct Providers {
    /// Fal.ai adapter (sync calls and queue submissions).
    pub fal: FalClient,
    /// Kie.ai adapter (task creation and status endpoints).
    pub kie: KieClient,
}

impl Providers {
    /// Build the adapter set from service configuration.
    #[must_use]
    pub fn from_config(config: &ServiceConfig) -> Self {
        if config.fal_api_key.is_none() {
            tracing::warn!("FAL_API_KEY not configured - Fal.ai tools will fail to dispatch");
        }
        if config.kie_api_key.is_none() {
            tracing::warn!("KIE_API_KEY not configured - Kie.ai tools will fail to dispatch");
        }

        Self {
            fal: FalClient::new(
                &config.fal_base_url,
                &config.fal_queue_url,
                config.fal_api_key.clone(),
            ),
            kie: KieClient::new(&config.kie_base_url, config.kie_api_key.clone()),
        }
    }

    /// Look up the adapter for a provider.
    #[must_use]
    pub fn adapter(&self, provider: Provider) -> &dyn ProviderAdapter {
        match provider {
            Provider::Fal => &self.fal,
            Provider::Kie => &self.kie,
        }
    }
}

/// Truncate a response body for error messages and logs.
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 512;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    }
}
