//! Request validation against a template's section schemas.

use serde_json::Value;

use super::defaults::apply_defaults;
use super::error::RequestError;
use super::schema::validate;
use super::types::PipelineRequest;
use crate::template::Template;

/// Validates every section present in the request.
///
/// Sections are checked in order: parameters, destination, source, tags.
pub fn validate_request(request: &PipelineRequest, template: &Template) -> Result<(), RequestError> {
    if let Some(parameters) = request.parameters() {
        validate(parameters, &template.parameters, &template.parameters)
            .map_err(RequestError::InvalidParameters)?;
    }

    if let Some(destination) = request.destination() {
        let destinations = destination.as_object().ok_or_else(|| {
            RequestError::InvalidDestination("destination must be an object".to_string())
        })?;
        for (kind, sub) in destinations {
            let schema = typed_schema(sub, |t| template.destination_schema(kind, t))
                .map_err(|e| RequestError::InvalidDestination(format!("{}: {}", kind, e)))?;
            validate(sub, schema, &template.destination)
                .map_err(|e| RequestError::InvalidDestination(format!("{}: {}", kind, e)))?;
        }
    }

    if let Some(source) = request.source() {
        let schema = typed_schema(source, |t| template.source_schema(t))
            .map_err(RequestError::InvalidSource)?;
        validate(source, schema, &template.source).map_err(RequestError::InvalidSource)?;
    }

    if let Some(tags) = request.tags() {
        validate(tags, &template.tags, &template.tags).map_err(RequestError::InvalidTags)?;
    }

    Ok(())
}

/// Looks up the schema selected by a section's `type`.
fn typed_schema<'a, F>(section: &Value, lookup: F) -> Result<&'a Value, String>
where
    F: FnOnce(&str) -> Option<&'a Value>,
{
    let section_type = section
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| "'type' is a required property".to_string())?;
    lookup(section_type).ok_or_else(|| format!("unsupported type '{}'", section_type))
}

/// Copies, defaults and validates a request for admission.
pub fn prepare_request(
    template: &Template,
    request: &PipelineRequest,
) -> Result<PipelineRequest, RequestError> {
    let mut prepared = request.clone();
    apply_defaults(&mut prepared, template);
    validate_request(&prepared, template)?;
    Ok(prepared)
}
