//! Writes request values onto engine element properties.

use serde_json::Value;
use tracing::{debug, warn};

use crate::engine::ElementProperties;
use crate::request::PipelineRequest;
use crate::template::{BindingSection, Template};

/// Property whose value names a shared resource.
pub const SHARED_IDENTITY_PROPERTY: &str = "model-instance-id";

/// One request value destined for an element property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyWrite {
    pub element: String,
    pub property: String,
    pub value: Value,
}

impl PropertyWrite {
    /// Shared resource identity `<element>_<value>`, for identity properties.
    pub fn shared_identity(&self) -> Option<String> {
        if self.property != SHARED_IDENTITY_PROPERTY {
            return None;
        }
        let value = match &self.value {
            Value::String(s) if s.is_empty() => return None,
            Value::String(s) => s.clone(),
            Value::Null => return None,
            other => other.to_string(),
        };
        Some(format!("{}_{}", self.element, value))
    }
}

/// Resolves every template binding against the request's values.
///
/// Source and destination bindings apply only when the request section has
/// the schema's type.
pub fn resolve_bindings(template: &Template, request: &PipelineRequest) -> Vec<PropertyWrite> {
    let mut writes = Vec::new();
    for binding in template.bindings() {
        let section = match &binding.section {
            BindingSection::Parameters => request.parameters(),
            BindingSection::Source(source_type) => request
                .source()
                .filter(|s| s.get("type").and_then(Value::as_str) == Some(source_type.as_str())),
            BindingSection::Destination(kind, destination_type) => {
                request.sub_destination(kind).filter(|d| {
                    d.get("type").and_then(Value::as_str) == Some(destination_type.as_str())
                })
            }
        };
        let Some(value) = section.and_then(|s| s.get(&binding.key)) else {
            continue;
        };
        for target in &binding.targets {
            let value = if target.is_json() {
                Value::String(value.to_string())
            } else {
                value.clone()
            };
            writes.push(PropertyWrite {
                element: target.element.clone(),
                property: target.property_for(&binding.key).to_string(),
                value,
            });
        }
    }
    writes
}

/// Distinct shared resource identities named by `writes`, sorted.
pub fn shared_identities(writes: &[PropertyWrite]) -> Vec<String> {
    let mut identities: Vec<String> = writes.iter().filter_map(PropertyWrite::shared_identity).collect();
    identities.sort();
    identities.dedup();
    identities
}

/// Applies `writes`. Missing elements and read-only properties are skipped.
pub fn apply_properties<P: ElementProperties + ?Sized>(
    target: &P,
    writes: &[PropertyWrite],
    instance_id: &str,
) {
    for write in writes {
        let Some(writable) = target.list_writable_properties(&write.element) else {
            debug!(
                "Instance {}: element '{}' not in pipeline, skipping {}",
                instance_id, write.element, write.property
            );
            continue;
        };
        if !writable.iter().any(|p| p == &write.property) {
            debug!(
                "Instance {}: {}.{} is not writable, skipping",
                instance_id, write.element, write.property
            );
            continue;
        }
        if let Err(e) = target.set_property(&write.element, &write.property, &write.value) {
            warn!(
                "Instance {}: failed to set {}.{}: {}",
                instance_id, write.element, write.property, e
            );
        }
    }
}
