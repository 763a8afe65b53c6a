//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that builds the router in-process
//! over a pipeline manager backed by the mock engine, with templates loaded
//! from a temporary pipeline directory.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use pipeserve_core::{
    testing::MockEngine, Config, ManagerConfig, MediaEngine, PipelineManager, PluginRegistry,
    TemplateRegistry,
};

/// Re-export fixtures for test convenience
pub use pipeserve_core::testing::fixtures;

/// Test fixture for API testing with a mock engine.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_create_instance() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post("/api/v1/pipelines/detect/1", json!({
///         "source": {"type": "uri", "uri": "file:///a.mp4"}
///     })).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock engine - drive instance lifecycles
    pub engine: Arc<MockEngine>,
    pub manager: Arc<PipelineManager>,
    /// Pipeline directory the templates were loaded from
    pub pipeline_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with one running slot.
    pub async fn new() -> Self {
        Self::with_max_running(1).await
    }

    pub async fn with_max_running(max_running: i64) -> Self {
        let pipeline_dir = TempDir::new().expect("Failed to create temp dir");
        write_template(pipeline_dir.path(), "detect", "1", detect_template_file());
        write_template(pipeline_dir.path(), "passthrough", "1", passthrough_template_file());
        write_template(
            pipeline_dir.path(),
            "broken",
            "1",
            json!({"type": "mock", "template": "no description"}),
        );

        let engine = Arc::new(fixtures::detect_engine());
        let report = TemplateRegistry::load(pipeline_dir.path(), &[fixtures::MOCK_ENGINE])
            .expect("Failed to load templates");

        let mut config = Config::default();
        config.manager = ManagerConfig::default()
            .with_pipeline_dir(pipeline_dir.path())
            .with_max_running(max_running);

        let manager = PipelineManager::new(
            config.manager.clone(),
            Arc::new(report.registry),
            vec![Arc::clone(&engine) as Arc<dyn MediaEngine>],
            Arc::new(PluginRegistry::with_builtins()),
            None,
        );

        let state = Arc::new(pipeserve_server::state::AppState::new(
            config,
            Arc::clone(&manager),
        ));
        let router = pipeserve_server::api::create_router(state);

        Self {
            router,
            engine,
            manager,
            pipeline_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Send a GET request and return the raw body text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Create an instance and return its id.
    pub async fn create(&self, name: &str, body: Value) -> String {
        let response = self.post(&format!("/api/v1/pipelines/{}/1", name), body).await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body["id"]
            .as_str()
            .expect("missing id")
            .to_string()
    }

    /// Poll the status endpoint until `state` is reported.
    pub async fn wait_for_state(&self, id: &str, state: &str) -> Value {
        let path = format!("/api/v1/instances/{}/status", id);
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                let response = self.get(&path).await;
                if response.body["state"] == state {
                    return response.body;
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("instance {} never reached {}", id, state))
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

fn write_template(root: &Path, name: &str, version: &str, file: Value) {
    let dir = root.join(name).join(version);
    std::fs::create_dir_all(&dir).expect("Failed to create template dir");
    std::fs::write(
        dir.join("pipeline.json"),
        serde_json::to_vec_pretty(&file).unwrap(),
    )
    .expect("Failed to write template");
}

/// Template file equivalent of `fixtures::detect_template`.
fn detect_template_file() -> Value {
    json!({
        "type": "mock",
        "description": "Object detection",
        "template": [
            "{source[uri]} ! ",
            "detect name=detect threshold={parameters[threshold]} ! sink"
        ],
        "parameters": {
            "type": "object",
            "properties": {
                "model": {
                    "type": "string",
                    "default": "person",
                    "element": {"name": "detect", "property": "model-instance-id"}
                },
                "threshold": {
                    "type": "number",
                    "minimum": 0,
                    "maximum": 1,
                    "default": 0.5,
                    "element": "detect"
                }
            }
        }
    })
}

fn passthrough_template_file() -> Value {
    json!({
        "type": "mock",
        "description": "Frames in, frames out",
        "template": "passthrough"
    })
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
