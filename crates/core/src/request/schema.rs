//! A small JSON-schema subset used by template section schemas.
//!
//! Supported keywords: `type`, `enum`, `required`, `properties`, `items`,
//! `minimum`, `maximum`, `oneOf` (with `$ref: "#/<key>"`) and
//! `format: uri`. Any other keyword is ignored.

use serde_json::Value;

/// Validates `value` against `schema`. `root` resolves `$ref`s.
pub fn validate(value: &Value, schema: &Value, root: &Value) -> Result<(), String> {
    check(value, schema, root, "")
}

fn check(value: &Value, schema: &Value, root: &Value, path: &str) -> Result<(), String> {
    let schema = resolve(schema, root)?;
    let Some(rules) = schema.as_object() else {
        return Ok(());
    };
    let at = |msg: String| {
        if path.is_empty() {
            msg
        } else {
            format!("{}: {}", path, msg)
        }
    };

    if let Some(expected) = rules.get("type") {
        let allowed: Vec<&str> = match expected {
            Value::String(t) => vec![t.as_str()],
            Value::Array(types) => types.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        if !allowed.is_empty() && !allowed.iter().any(|t| type_matches(value, t)) {
            return Err(at(format!(
                "expected {}, got {}",
                allowed.join(" or "),
                type_name(value)
            )));
        }
    }

    if let Some(Value::Array(options)) = rules.get("enum") {
        if !options.contains(value) {
            return Err(at(format!("{} is not one of {}", value, Value::Array(options.clone()))));
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = rules.get("minimum").and_then(Value::as_f64) {
            if n < min {
                return Err(at(format!("{} is less than the minimum of {}", value, min)));
            }
        }
        if let Some(max) = rules.get("maximum").and_then(Value::as_f64) {
            if n > max {
                return Err(at(format!("{} is greater than the maximum of {}", value, max)));
            }
        }
    }

    if rules.get("format").and_then(Value::as_str) == Some("uri") {
        if let Some(s) = value.as_str() {
            if !looks_like_uri(s) {
                return Err(at(format!("'{}' is not a valid uri", s)));
            }
        }
    }

    if let Some(object) = value.as_object() {
        if let Some(Value::Array(required)) = rules.get("required") {
            for key in required.iter().filter_map(Value::as_str) {
                if !object.contains_key(key) {
                    return Err(at(format!("'{}' is a required property", key)));
                }
            }
        }
        if let Some(Value::Object(properties)) = rules.get("properties") {
            for (key, item) in object {
                if let Some(property_schema) = properties.get(key) {
                    check(item, property_schema, root, &join(path, key))?;
                }
            }
        }
    }

    if let (Some(items), Some(item_schema)) = (value.as_array(), rules.get("items")) {
        for (i, item) in items.iter().enumerate() {
            check(item, item_schema, root, &join(path, &i.to_string()))?;
        }
    }

    if let Some(Value::Array(options)) = rules.get("oneOf") {
        let matching = options
            .iter()
            .filter(|option| check(value, option, root, path).is_ok())
            .count();
        if matching != 1 {
            return Err(at(format!(
                "matched {} of the oneOf alternatives, expected exactly 1",
                matching
            )));
        }
    }

    Ok(())
}

fn resolve<'a>(schema: &'a Value, root: &'a Value) -> Result<&'a Value, String> {
    match schema.get("$ref").and_then(Value::as_str) {
        Some(reference) => {
            let pointer = reference
                .strip_prefix('#')
                .ok_or_else(|| format!("unsupported reference '{}'", reference))?;
            root.pointer(pointer)
                .ok_or_else(|| format!("unresolved reference '{}'", reference))
        }
        None => Ok(schema),
    }
}

fn type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => {
            value.is_i64() || value.is_u64() || value.as_f64().is_some_and(|f| f.fract() == 0.0)
        }
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn looks_like_uri(s: &str) -> bool {
    match s.split_once(':') {
        Some((scheme, _)) => {
            !scheme.is_empty()
                && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}
