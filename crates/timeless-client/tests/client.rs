//! Client SDK integration tests against a mocked timeless API.

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use timeless_client::{ClientError, Scene, TimelessClient, ToolDispatchRequest};
use timeless_core::ToolFamily;

#[tokio::test]
async fn dispatch_tool_sends_camel_case_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/tools/image"))
        .and(header("authorization", "Bearer user-jwt"))
        .and(body_partial_json(json!({
            "tool": "upscale",
            "imageUrl": "https://cdn.example/in.png",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "outputUrl": "https://cdn.example/out.png",
            "creditsUsed": 3,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = TimelessClient::new(server.uri(), "service-key");
    let response = client
        .dispatch_tool(
            "user-jwt",
            ToolFamily::Image,
            ToolDispatchRequest {
                tool: "upscale".to_string(),
                image_url: Some("https://cdn.example/in.png".to_string()),
                ..ToolDispatchRequest::default()
            },
        )
        .await
        .expect("dispatch");

    assert!(response.success);
    assert_eq!(response.credits_used, 3);
    assert_eq!(
        response.output_url.as_deref(),
        Some("https://cdn.example/out.png")
    );
    assert!(response.task_id.is_none());
}

#[tokio::test]
async fn dispatch_tool_parses_queued_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/tools/video"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "status": "processing",
            "taskId": "req-1",
            "generationId": "01JGN0S3E3A5M7V9Q4T6W8Y0BC",
            "creditsUsed": 20,
            "message": "Generation started. Poll the check endpoint for the result.",
        })))
        .mount(&server)
        .await;

    let client = TimelessClient::new(server.uri(), "service-key");
    let response = client
        .dispatch_tool(
            "user-jwt",
            ToolFamily::Video,
            ToolDispatchRequest {
                tool: "lip-sync".to_string(),
                video_url: Some("https://cdn.example/in.mp4".to_string()),
                audio_url: Some("https://cdn.example/in.mp3".to_string()),
                ..ToolDispatchRequest::default()
            },
        )
        .await
        .expect("dispatch");

    assert_eq!(response.status.as_deref(), Some("processing"));
    assert_eq!(response.task_id.as_deref(), Some("req-1"));
    assert_eq!(response.credits_used, 20);
}

#[tokio::test]
async fn insufficient_credits_maps_to_typed_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/tools/image"))
        .respond_with(ResponseTemplate::new(402).set_body_json(json!({
            "error": "Insufficient credits",
            "code": "insufficient_credits",
            "balance": 2,
            "required": 3,
        })))
        .mount(&server)
        .await;

    let client = TimelessClient::new(server.uri(), "service-key");
    let err = client
        .dispatch_tool(
            "user-jwt",
            ToolFamily::Image,
            ToolDispatchRequest {
                tool: "upscale".to_string(),
                image_url: Some("https://cdn.example/in.png".to_string()),
                ..ToolDispatchRequest::default()
            },
        )
        .await
        .expect_err("should fail");

    match err {
        ClientError::InsufficientCredits { balance, required } => {
            assert_eq!(balance, 2);
            assert_eq!(required, 3);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn missing_profile_maps_to_typed_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/credits/balance"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": "Profile not found",
            "code": "not_found",
        })))
        .mount(&server)
        .await;

    let client = TimelessClient::new(server.uri(), "service-key");
    let err = client.get_balance("user-jwt").await.expect_err("should fail");

    assert!(matches!(err, ClientError::ProfileNotFound));
}

#[tokio::test]
async fn create_profile_authenticates_with_service_key() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/profiles"))
        .and(header("x-api-key", "service-key"))
        .and(header("x-service-name", "auth-backend"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user_id": "3fa0a0a5-7f3f-4e5a-9c57-8c63c3c9f1b2",
            "credits": 10,
            "subscription_status": "inactive",
            "lifetime_credits_spent": 0,
            "lifetime_credits_granted": 10,
            "generation_count": 0,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = TimelessClient::with_options(
        server.uri(),
        "service-key",
        timeless_client::ClientOptions::with_service_name("auth-backend"),
    );
    let profile = client
        .create_profile("3fa0a0a5-7f3f-4e5a-9c57-8c63c3c9f1b2", None)
        .await
        .expect("create profile");

    assert_eq!(profile.credits, 10);
    assert_eq!(profile.subscription_status, "inactive");
}

#[tokio::test]
async fn check_generations_parses_results() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/generations/check"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {
                    "id": "01JGN0S3E3A5M7V9Q4T6W8Y0BC",
                    "status": "failed",
                    "changed": true,
                    "credits_refunded": 20,
                },
            ],
            "pending_count": 0,
        })))
        .mount(&server)
        .await;

    let client = TimelessClient::new(server.uri(), "service-key");
    let response = client
        .check_generations("user-jwt", None)
        .await
        .expect("check");

    assert_eq!(response.pending_count, 0);
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].status, "failed");
    assert_eq!(response.results[0].credits_refunded, Some(20));
}

#[tokio::test]
async fn fan_out_request_serializes_scenes() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/tools/video"))
        .and(body_partial_json(json!({
            "tool": "story-animate",
            "scenes": [
                { "imageUrl": "https://cdn.example/scene-1.png" },
            ],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "status": "processing",
            "batchId": "01JGN0S3E3A5M7V9Q4T6W8Y0BD",
            "generationIds": ["01JGN0S3E3A5M7V9Q4T6W8Y0BC"],
            "creditsUsed": 12,
            "message": "1 scenes submitted. Poll the check endpoint for results.",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = TimelessClient::new(server.uri(), "service-key");
    let response = client
        .dispatch_tool(
            "user-jwt",
            ToolFamily::Video,
            ToolDispatchRequest {
                tool: "story-animate".to_string(),
                scenes: vec![Scene {
                    image_url: "https://cdn.example/scene-1.png".to_string(),
                    prompt: None,
                }],
                ..ToolDispatchRequest::default()
            },
        )
        .await
        .expect("dispatch");

    assert_eq!(response.batch_id.as_deref(), Some("01JGN0S3E3A5M7V9Q4T6W8Y0BD"));
    assert_eq!(response.generation_ids.as_ref().map(Vec::len), Some(1));
}
