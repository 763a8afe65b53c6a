//! API integration tests.
//!
//! These tests drive the router in-process over a pipeline manager backed by
//! the mock engine.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::TestFixture;

// =============================================================================
// Health and metrics
// =============================================================================

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/health").await;

    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "status", json!("ok"));
    assert_json_path!(response.body, "engines", json!(["mock"]));
}

#[tokio::test]
async fn test_metrics_exposition() {
    let fixture = TestFixture::new().await;
    fixture.get("/api/v1/health").await;

    let (status, body) = fixture.get_text("/api/v1/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("pipeserve_http_requests_total"));
    assert!(body.contains("pipeserve_instances"));
}

// =============================================================================
// Templates
// =============================================================================

#[tokio::test]
async fn test_list_pipelines_skips_invalid_templates() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/pipelines").await;

    assert_status!(response, StatusCode::OK);
    let names: Vec<&str> = response
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["detect", "passthrough"]);
}

#[tokio::test]
async fn test_get_pipeline() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/pipelines/detect/1").await;

    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "type", json!("mock"));
    assert_json_path!(response.body, "description", json!("Object detection"));
    assert_eq!(
        response.body["parameters"]["properties"]["threshold"]["default"],
        json!(0.5)
    );
}

#[tokio::test]
async fn test_get_unknown_pipeline() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/pipelines/detect/2").await;

    assert_status!(response, StatusCode::NOT_FOUND);
    assert!(response.body["error"].as_str().unwrap().contains("detect"));
}

// =============================================================================
// Instances
// =============================================================================

#[tokio::test]
async fn test_create_and_complete_instance() {
    let fixture = TestFixture::new().await;
    let id = fixture
        .create(
            "detect",
            json!({"source": {"type": "uri", "uri": "file:///a.mp4"}}),
        )
        .await;

    let status = fixture.wait_for_state(&id, "RUNNING").await;
    assert_eq!(status["id"], json!(id));
    assert!(status["start_time"].is_string());

    let response = fixture.get(&format!("/api/v1/instances/{}", id)).await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "name", json!("detect"));
    assert_json_path!(response.body, "type", json!("mock"));
    assert_json_path!(
        response.body,
        "launch_command",
        json!("file:///a.mp4 ! detect name=detect threshold=0.5 ! sink")
    );
    assert_eq!(
        response.body["request"]["parameters"]["model"],
        json!("person")
    );

    fixture.engine.complete(&id);
    let status = fixture.wait_for_state(&id, "COMPLETED").await;
    assert!(status.get("message").is_none());
}

#[tokio::test]
async fn test_second_instance_waits_for_slot() {
    let fixture = TestFixture::new().await;
    let body = json!({"source": {"type": "uri", "uri": "file:///a.mp4"}});
    let first = fixture.create("detect", body.clone()).await;
    fixture.wait_for_state(&first, "RUNNING").await;

    let second = fixture.create("detect", body).await;
    let response = fixture
        .get(&format!("/api/v1/instances/{}/status", second))
        .await;
    assert_json_path!(response.body, "state", json!("QUEUED"));

    let pool = fixture.get("/api/v1/pipelines/status").await;
    assert_json_path!(pool.body, "running", json!(1));
    assert_json_path!(pool.body, "queued", json!(1));

    fixture.engine.complete(&first);
    fixture.wait_for_state(&second, "RUNNING").await;

    let list = fixture.get("/api/v1/instances").await;
    let ids: Vec<&str> = list
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![first.as_str(), second.as_str()]);
}

#[tokio::test]
async fn test_invalid_parameters_rejected() {
    let fixture = TestFixture::new().await;
    let response = fixture
        .post(
            "/api/v1/pipelines/detect/1",
            json!({
                "source": {"type": "uri", "uri": "file:///a.mp4"},
                "parameters": {"threshold": 3}
            }),
        )
        .await;

    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid parameters"));

    let list = fixture.get("/api/v1/instances").await;
    assert_eq!(list.body, json!([]));
}

#[tokio::test]
async fn test_non_object_request_rejected() {
    let fixture = TestFixture::new().await;
    let response = fixture
        .post("/api/v1/pipelines/passthrough/1", json!([1, 2, 3]))
        .await;

    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_json_rejected() {
    let fixture = TestFixture::new().await;
    let response = fixture
        .post_raw("/api/v1/pipelines/passthrough/1", "{not json")
        .await;

    assert!(response.status.is_client_error());
    assert!(fixture.manager.list_all().await.is_empty());
}

#[tokio::test]
async fn test_create_unknown_pipeline() {
    let fixture = TestFixture::new().await;
    let response = fixture
        .post("/api/v1/pipelines/missing/1", json!({}))
        .await;

    assert_status!(response, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stop_instance() {
    let fixture = TestFixture::new().await;
    let id = fixture.create("passthrough", json!({})).await;
    fixture.wait_for_state(&id, "RUNNING").await;

    let response = fixture.delete(&format!("/api/v1/instances/{}", id)).await;
    assert_status!(response, StatusCode::OK);
    fixture.wait_for_state(&id, "ABORTED").await;

    // A second stop reports the same terminal state.
    let response = fixture.delete(&format!("/api/v1/instances/{}", id)).await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "state", json!("ABORTED"));
    assert_eq!(fixture.engine.stop_count(&id), 1);
}

#[tokio::test]
async fn test_unknown_instance() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/instances/nope/status").await;
    assert_status!(response, StatusCode::NOT_FOUND);

    let response = fixture.delete("/api/v1/instances/nope").await;
    assert_status!(response, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_engine_error_reported_in_status() {
    let fixture = TestFixture::new().await;
    let id = fixture.create("passthrough", json!({})).await;
    fixture.wait_for_state(&id, "RUNNING").await;

    fixture.engine.fail(&id, "decoder crashed");
    let status = fixture.wait_for_state(&id, "ERROR").await;
    assert_json_path!(status, "message", json!("decoder crashed"));
}
