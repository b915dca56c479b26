//! Fal.ai provider adapter.
//!
//! Fal exposes two surfaces: `fal.run` for synchronous model calls that
//! return the result inline, and `queue.fal.run` for queued submissions
//! polled via `/requests/{id}/status` with the result fetched separately
//! once the queue reports `COMPLETED`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use timeless_core::{DispatchMode, JobOutcome, ToolSpec};

use super::outcome::{is_terminal_success, normalize};
use super::{truncate_body, ProviderAdapter, ProviderError, Submission};

/// Fal.ai API client.
#[derive(Debug, Clone)]
pub struct FalClient {
    client: Client,
    base_url: String,
    queue_url: String,
    api_key: Option<String>,
}

impl FalClient {
    /// Create a new Fal client.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built (should not happen with
    /// default settings).
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        queue_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            queue_url: queue_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Configuration("FAL_API_KEY is not set".into()))
    }

    /// POST a payload and return the parsed JSON body.
    async fn post_json(&self, url: &str, input: &Value) -> Result<Value, ProviderError> {
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Key {}", self.key()?))
            .json(input)
            .send()
            .await?;

        read_json(response).await
    }

    async fn get_json(&self, url: &str) -> Result<Value, ProviderError> {
        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Key {}", self.key()?))
            .send()
            .await?;

        read_json(response).await
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Api {
            status: status.as_u16(),
            body: truncate_body(&body),
        });
    }
    Ok(response.json().await?)
}

#[async_trait]
impl ProviderAdapter for FalClient {
    async fn submit(&self, tool: &ToolSpec, input: &Value) -> Result<Submission, ProviderError> {
        match tool.mode {
            DispatchMode::Sync => {
                let url = format!("{}/{}", self.base_url, tool.endpoint);
                let body = self.post_json(&url, input).await?;

                match normalize(&body) {
                    JobOutcome::Succeeded {
                        output_url,
                        thumbnail_url,
                    } => Ok(Submission::Completed {
                        output_url,
                        thumbnail_url,
                    }),
                    JobOutcome::Failed { reason } => Err(ProviderError::UnexpectedResponse(
                        format!("sync call reported failure: {reason}"),
                    )),
                    JobOutcome::Pending => Err(ProviderError::UnexpectedResponse(
                        "sync call returned no output url".into(),
                    )),
                }
            }
            // Queue submission; fan-out tools submit one scene at a time
            // through this same path.
            _ => {
                let url = format!("{}/{}", self.queue_url, tool.endpoint);
                let body = self.post_json(&url, input).await?;

                let task_id = body
                    .get("request_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        ProviderError::UnexpectedResponse(
                            "queue submission returned no request_id".into(),
                        )
                    })?;

                Ok(Submission::Queued {
                    task_id: task_id.to_string(),
                })
            }
        }
    }

    async fn poll(&self, tool: &ToolSpec, task_id: &str) -> Result<JobOutcome, ProviderError> {
        let status_url = format!(
            "{}/{}/requests/{}/status",
            self.queue_url, tool.endpoint, task_id
        );
        let status_body = self.get_json(&status_url).await?;

        // The status document never carries the output; once the queue
        // reports the job done, fetch the result separately.
        if is_terminal_success(&status_body) {
            let result_url = format!("{}/{}/requests/{}", self.queue_url, tool.endpoint, task_id);
            let result_body = self.get_json(&result_url).await?;
            return Ok(normalize(&result_body));
        }

        Ok(normalize(&status_body))
    }
}
