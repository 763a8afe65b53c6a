//! Schema default filling.

use serde_json::{json, Map, Value};

use super::types::PipelineRequest;
use crate::template::Template;

/// Inserts schema defaults for every absent key of every request section.
///
/// Values already present are never touched. A legacy single destination
/// (`destination.type` set) is first moved under `destination.metadata`.
pub fn apply_defaults(request: &mut PipelineRequest, template: &Template) {
    let legacy = request
        .destination()
        .is_some_and(|destination| destination.get("type").is_some());
    if legacy {
        if let Some(destination) = request.remove_section("destination") {
            request.set_section("destination", json!({ "metadata": destination }));
        }
    }

    if let Some(Value::Object(destinations)) = request.section_mut("destination") {
        for (kind, destination) in destinations.iter_mut() {
            let Some(destination_type) = section_type(destination) else {
                continue;
            };
            if let Some(schema) = template.destination_schema(kind, &destination_type) {
                fill_defaults(destination, schema);
            }
        }
    }

    if let Some(source) = request.section_mut("source") {
        if let Some(source_type) = section_type(source) {
            if let Some(schema) = template.source_schema(&source_type) {
                fill_defaults(source, schema);
            }
        }
    }

    default_optional_section(request, "parameters", &template.parameters);
    default_optional_section(request, "tags", &template.tags);
}

fn section_type(section: &Value) -> Option<String> {
    section.get("type")?.as_str().map(str::to_string)
}

/// Fills a section that may be absent; it is only kept if something was filled in.
fn default_optional_section(request: &mut PipelineRequest, name: &str, schema: &Value) {
    let mut section = request
        .remove_section(name)
        .unwrap_or_else(|| Value::Object(Map::new()));
    fill_defaults(&mut section, schema);
    let empty = section.as_object().is_some_and(Map::is_empty);
    if !empty {
        request.set_section(name, section);
    }
}

fn fill_defaults(section: &mut Value, schema: &Value) {
    let (Some(object), Some(properties)) = (
        section.as_object_mut(),
        schema.get("properties").and_then(Value::as_object),
    ) else {
        return;
    };
    for (key, property) in properties {
        if object.contains_key(key) {
            continue;
        }
        if let Some(default) = property.get("default") {
            object.insert(key.clone(), default.clone());
        }
    }
}
