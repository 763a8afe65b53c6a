//! The request payload submitted with a pipeline instance.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::RequestError;

/// A request: `source`, `destination`, `parameters` and `tags` sections
/// plus any extra keys the client sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineRequest(Map<String, Value>);

impl PipelineRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> Result<Self, RequestError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            _ => Err(RequestError::NotAnObject),
        }
    }

    pub fn section(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn section_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.0.get_mut(name)
    }

    pub fn set_section(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn remove_section(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn source(&self) -> Option<&Value> {
        self.section("source")
    }

    pub fn destination(&self) -> Option<&Value> {
        self.section("destination")
    }

    pub fn parameters(&self) -> Option<&Value> {
        self.section("parameters")
    }

    pub fn tags(&self) -> Option<&Value> {
        self.section("tags")
    }

    /// `type` of the source section.
    pub fn source_type(&self) -> Option<&str> {
        self.source()?.get("type")?.as_str()
    }

    /// One sub-destination (`metadata`, `frame`).
    pub fn sub_destination(&self, kind: &str) -> Option<&Value> {
        self.destination()?.get(kind)
    }

    pub fn with_source(mut self, source: Value) -> Self {
        self.set_section("source", source);
        self
    }

    pub fn with_destination(mut self, destination: Value) -> Self {
        self.set_section("destination", destination);
        self
    }

    pub fn with_tags(mut self, tags: Value) -> Self {
        self.set_section("tags", tags);
        self
    }

    /// Sets one parameter, creating the section if needed.
    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        let params = self
            .0
            .entry("parameters")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = params {
            map.insert(key.into(), value);
        }
        self
    }

    /// The request as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}
