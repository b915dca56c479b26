//! Common test utilities for timeless integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use serde_json::json;
use tempfile::TempDir;
use wiremock::MockServer;

use timeless_core::UserId;
use timeless_service::{create_router, AppState, ServiceConfig};
use timeless_store::RocksStore;

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Shared application state, for seeding rows directly.
    pub state: Arc<AppState>,
    /// Mock Fal API (both sync runs and the queue).
    pub fal: MockServer,
    /// Mock Kie API.
    pub kie: MockServer,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
    /// The service API key for service-to-service requests.
    pub service_api_key: String,
}

impl TestHarness {
    /// Create a new test harness with a fresh database and mock providers.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = RocksStore::open(temp_dir.path()).expect("Failed to open store");

        let fal = MockServer::start().await;
        let kie = MockServer::start().await;

        let service_api_key = "test-service-key".to_string();

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            auth_base_url: "http://localhost".into(),
            auth_audience: "timeless".into(),
            service_api_key: Some(service_api_key.clone()),
            fal_api_key: Some("test-fal-key".into()),
            kie_api_key: Some("test-kie-key".into()),
            fal_base_url: fal.uri(),
            fal_queue_url: fal.uri(),
            kie_base_url: kie.uri(),
            starting_credits: 10,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            sweep_interval_seconds: 3600,
            pending_timeout_minutes: 30,
        };

        let state = Arc::new(AppState::new(Arc::new(store), config));
        let router: Router = create_router(Arc::clone(&state));

        let server = TestServer::new(router).expect("Failed to create test server");
        let test_user_id = UserId::generate();

        Self {
            server,
            state,
            fal,
            kie,
            _temp_dir: temp_dir,
            test_user_id,
            service_api_key,
        }
    }

    /// Get the authorization header for user authentication.
    pub fn user_auth_header(&self) -> String {
        format!("Bearer test-token:{}", self.test_user_id)
    }

    /// Get a different user's auth header (for testing isolation).
    pub fn other_user_auth_header() -> String {
        let other_user = UserId::generate();
        format!("Bearer test-token:{other_user}")
    }

    /// Provision the test user's profile with the given starting balance.
    pub async fn create_profile(&self, credits: i64) {
        self.server
            .post("/v1/profiles")
            .add_header("x-api-key", self.service_api_key.clone())
            .json(&json!({
                "user_id": self.test_user_id.to_string(),
                "credits": credits,
            }))
            .await
            .assert_status_ok();
    }

    /// Flip the test user's subscription to active.
    pub async fn activate_subscription(&self) {
        self.server
            .put("/v1/profiles/me/subscription")
            .add_header("x-api-key", self.service_api_key.clone())
            .json(&json!({
                "user_id": self.test_user_id.to_string(),
                "status": "active",
            }))
            .await
            .assert_status_ok();
    }

    /// Current credit balance of the test user.
    pub async fn balance(&self) -> i64 {
        let response = self
            .server
            .get("/v1/credits/balance")
            .add_header("authorization", self.user_auth_header())
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        body["credits"].as_i64().expect("credits field")
    }
}
