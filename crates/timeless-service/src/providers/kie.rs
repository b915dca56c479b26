//! Kie.ai provider adapter.
//!
//! Kie creates tasks via family-specific endpoints and reports status under
//! `data.successFlag` / `data.response`. The Veo family has shipped several
//! status endpoint paths over time, so polling walks an ordered fallback
//! list until one answers HTTP 200.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use timeless_core::{JobOutcome, ToolSpec};

use super::outcome::normalize;
use super::{truncate_body, ProviderAdapter, ProviderError, Submission};

/// Kie.ai API client.
#[derive(Debug, Clone)]
pub struct KieClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl KieClient {
    /// Create a new Kie client.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built (should not happen with
    /// default settings).
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Configuration("KIE_API_KEY is not set".into()))
    }
}

#[async_trait]
impl ProviderAdapter for KieClient {
    async fn submit(&self, tool: &ToolSpec, input: &Value) -> Result<Submission, ProviderError> {
        let url = format!("{}{}", self.base_url, tool.endpoint);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.key()?))
            .json(input)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let body: Value = response.json().await?;

        // The envelope's code field reports API-level failures even on HTTP 200.
        if let Some(code) = body.get("code").and_then(Value::as_i64) {
            if code != 200 {
                return Err(ProviderError::Api {
                    status: u16::try_from(code).unwrap_or(500),
                    body: truncate_body(&body.to_string()),
                });
            }
        }

        let task_id = body
            .get("data")
            .and_then(|d| d.get("taskId"))
            .or_else(|| body.get("taskId"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ProviderError::UnexpectedResponse("task creation returned no taskId".into())
            })?;

        Ok(Submission::Queued {
            task_id: task_id.to_string(),
        })
    }

    async fn poll(&self, tool: &ToolSpec, task_id: &str) -> Result<JobOutcome, ProviderError> {
        let mut last_err = ProviderError::Configuration(format!(
            "no status endpoints defined for tool {}",
            tool.name
        ));

        for path in tool.status_paths {
            let url = format!("{}{}?taskId={}", self.base_url, path, task_id);

            let response = match self
                .client
                .get(&url)
                .header("Authorization", format!("Bearer {}", self.key()?))
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    last_err = ProviderError::Http(e);
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                tracing::debug!(
                    path = %path,
                    status = %status,
                    "Status endpoint rejected, trying next fallback"
                );
                last_err = ProviderError::Api {
                    status: status.as_u16(),
                    body: truncate_body(&body),
                };
                continue;
            }

            let body: Value = response.json().await?;
            return Ok(normalize(&body));
        }

        Err(last_err)
    }
}
