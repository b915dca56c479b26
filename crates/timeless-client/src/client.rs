//! Timeless HTTP client implementation.

use reqwest::Client;
use std::time::Duration;

use timeless_core::ToolFamily;

use crate::error::ClientError;
use crate::types::{
    AddCreditsRequest, AddCreditsResponse, ApiErrorResponse, BalanceResponse, CheckRequest,
    CheckResponse, CreateProfileRequest, DispatchResponse, ProfileResponse,
    SubscriptionUpdateRequest, ToolDispatchRequest,
};

/// Timeless API client.
///
/// Service-authenticated methods (profile provisioning, credit grants,
/// subscription updates) use the API key passed at construction; the
/// user-facing methods take the signed-in user's JWT per call.
#[derive(Debug, Clone)]
pub struct TimelessClient {
    client: Client,
    base_url: String,
    api_key: String,
    service_name: String,
}

impl TimelessClient {
    /// Create a new timeless client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the timeless service (e.g., `"http://timeless:8080"`)
    /// * `api_key` - Service API key for authentication
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_options(base_url, api_key, ClientOptions::default())
    }

    /// Create a new timeless client with custom options.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built (should not happen with default settings).
    #[must_use]
    pub fn with_options(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        options: ClientOptions,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            service_name: options.service_name,
        }
    }

    /// Provision a profile for a new user.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn create_profile(
        &self,
        user_id: impl Into<String>,
        credits: Option<i64>,
    ) -> Result<ProfileResponse, ClientError> {
        let url = format!("{}/v1/profiles", self.base_url);
        let request = CreateProfileRequest {
            user_id: user_id.into(),
            credits,
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("x-service-name", &self.service_name)
            .json(&request)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Update a user's subscription state.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn set_subscription(
        &self,
        user_id: impl Into<String>,
        status: impl Into<String>,
    ) -> Result<ProfileResponse, ClientError> {
        let url = format!("{}/v1/profiles/me/subscription", self.base_url);
        let request = SubscriptionUpdateRequest {
            user_id: user_id.into(),
            status: status.into(),
        };

        let response = self
            .client
            .put(&url)
            .header("x-api-key", &self.api_key)
            .header("x-service-name", &self.service_name)
            .json(&request)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Grant credits to a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn add_credits(
        &self,
        user_id: impl Into<String>,
        amount: i64,
        description: Option<String>,
    ) -> Result<AddCreditsResponse, ClientError> {
        let url = format!("{}/v1/credits/add", self.base_url);
        let request = AddCreditsRequest {
            user_id: user_id.into(),
            amount,
            description,
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("x-service-name", &self.service_name)
            .json(&request)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Get a user's current balance (requires user JWT, not service API key).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn get_balance(&self, user_jwt: &str) -> Result<BalanceResponse, ClientError> {
        let url = format!("{}/v1/credits/balance", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("authorization", format!("Bearer {user_jwt}"))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Dispatch a tool on behalf of a signed-in user.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error,
    /// including [`ClientError::InsufficientCredits`] when the user cannot
    /// afford the tool.
    pub async fn dispatch_tool(
        &self,
        user_jwt: &str,
        family: ToolFamily,
        request: ToolDispatchRequest,
    ) -> Result<DispatchResponse, ClientError> {
        let url = format!("{}/v1/tools/{}", self.base_url, family.as_str());

        let response = self
            .client
            .post(&url)
            .header("authorization", format!("Bearer {user_jwt}"))
            .json(&request)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Check the user's pending generations, or one specific generation.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn check_generations(
        &self,
        user_jwt: &str,
        generation_id: Option<String>,
    ) -> Result<CheckResponse, ClientError> {
        let url = format!("{}/v1/generations/check", self.base_url);
        let request = CheckRequest { generation_id };

        let response = self
            .client
            .post(&url)
            .header("authorization", format!("Bearer {user_jwt}"))
            .json(&request)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        // Try to parse error response
        let error_body: Result<ApiErrorResponse, _> = response.json().await;

        match error_body {
            Ok(api_error) => match api_error.code.as_str() {
                "insufficient_credits" => {
                    let balance = api_error
                        .details
                        .get("balance")
                        .and_then(serde_json::Value::as_i64)
                        .unwrap_or(0);
                    let required = api_error
                        .details
                        .get("required")
                        .and_then(serde_json::Value::as_i64)
                        .unwrap_or(0);

                    Err(ClientError::InsufficientCredits { balance, required })
                }
                "not_found" if api_error.error.contains("Profile") => {
                    Err(ClientError::ProfileNotFound)
                }
                _ => Err(ClientError::Api {
                    code: api_error.code,
                    message: api_error.error,
                    status: status.as_u16(),
                }),
            },
            Err(_) => Err(ClientError::Api {
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            }),
        }
    }
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 30).
    pub timeout_seconds: u64,
    /// Service name to include in requests.
    pub service_name: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            service_name: "unknown".to_string(),
        }
    }
}

impl ClientOptions {
    /// Create options with a service name.
    #[must_use]
    pub fn with_service_name(name: impl Into<String>) -> Self {
        Self {
            service_name: name.into(),
            ..Self::default()
        }
    }
}
