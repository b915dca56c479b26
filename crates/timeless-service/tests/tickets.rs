//! Support ticket integration tests.

mod common;

use common::TestHarness;
use serde_json::json;

async fn open_ticket(harness: &TestHarness, subject: &str) -> String {
    let response = harness
        .server
        .post("/v1/tickets")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({
            "subject": subject,
            "body": "My render came out sideways.",
        }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    body["id"].as_str().expect("ticket id").to_string()
}

#[tokio::test]
async fn ticket_crud_round_trip() {
    let harness = TestHarness::new().await;
    harness.create_profile(10).await;
    let id = open_ticket(&harness, "Sideways render").await;

    let response = harness
        .server
        .get(&format!("/v1/tickets/{id}"))
        .add_header("authorization", harness.user_auth_header())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["subject"], "Sideways render");
    assert_eq!(body["status"], "open");

    let response = harness
        .server
        .get("/v1/tickets")
        .add_header("authorization", harness.user_auth_header())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["tickets"].as_array().unwrap().len(), 1);

    harness
        .server
        .delete(&format!("/v1/tickets/{id}"))
        .add_header("authorization", harness.user_auth_header())
        .await
        .assert_status(axum::http::StatusCode::NO_CONTENT);

    let response = harness
        .server
        .get(&format!("/v1/tickets/{id}"))
        .add_header("authorization", harness.user_auth_header())
        .await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn ticket_requires_subject_and_body() {
    let harness = TestHarness::new().await;
    harness.create_profile(10).await;

    let response = harness
        .server
        .post("/v1/tickets")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "subject": "  ", "body": "text" }))
        .await;
    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "subject is required");

    let response = harness
        .server
        .post("/v1/tickets")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "subject": "Help", "body": "" }))
        .await;
    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "body is required");
}

#[tokio::test]
async fn tickets_are_scoped_to_their_owner() {
    let harness = TestHarness::new().await;
    harness.create_profile(10).await;
    let id = open_ticket(&harness, "Mine").await;

    let response = harness
        .server
        .get(&format!("/v1/tickets/{id}"))
        .add_header("authorization", TestHarness::other_user_auth_header())
        .await;
    response.assert_status_not_found();

    let response = harness
        .server
        .delete(&format!("/v1/tickets/{id}"))
        .add_header("authorization", TestHarness::other_user_auth_header())
        .await;
    response.assert_status_not_found();

    // Still there for the owner.
    harness
        .server
        .get(&format!("/v1/tickets/{id}"))
        .add_header("authorization", harness.user_auth_header())
        .await
        .assert_status_ok();
}
