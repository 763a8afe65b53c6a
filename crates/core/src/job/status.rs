//! Status and parameter views of an instance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::state::JobState;

/// Point-in-time status of one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: String,
    pub state: JobState,
    pub avg_fps: f64,
    pub start_time: Option<DateTime<Utc>>,
    /// Seconds; `None` until the instance started.
    pub elapsed_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_pipeline_latency: Option<f64>,
    /// Error detail for `ERROR`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// What an instance was created from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobParameters {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub engine_type: String,
    /// The defaulted request the instance runs with.
    pub request: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_command: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_omits_empty_optionals() {
        let status = JobStatus {
            id: "abc".to_string(),
            state: JobState::Queued,
            avg_fps: 0.0,
            start_time: None,
            elapsed_time: None,
            avg_pipeline_latency: None,
            message: None,
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["state"], "QUEUED");
        assert!(value.get("avg_pipeline_latency").is_none());
        assert!(value.get("message").is_none());
        assert_eq!(value["elapsed_time"], Value::Null);
    }

    #[test]
    fn test_parameters_type_field() {
        let params = JobParameters {
            id: "abc".to_string(),
            name: "detect".to_string(),
            version: "1".to_string(),
            engine_type: "FFmpeg".to_string(),
            request: json!({"source": {"type": "uri"}}),
            launch_command: None,
        };
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["type"], "FFmpeg");
        assert!(value.get("launch_command").is_none());
    }
}
