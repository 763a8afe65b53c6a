//! Section schemas used when a template does not declare its own.

use serde_json::{json, Value};

/// Source schemas keyed by source `type`.
pub fn default_source_schema() -> Value {
    json!({
        "uri": {
            "type": "object",
            "properties": {
                "type": {"type": "string", "enum": ["uri"]},
                "uri": {"type": "string", "format": "uri"}
            },
            "required": ["type", "uri"]
        },
        "device": {
            "type": "object",
            "properties": {
                "type": {"type": "string", "enum": ["device"]},
                "path": {"type": "string"}
            },
            "required": ["type", "path"]
        },
        "webcam": {
            "type": "object",
            "properties": {
                "type": {"type": "string", "enum": ["webcam"]},
                "device": {
                    "type": "string",
                    "element": {"name": "source", "property": "device"}
                },
                "capsfilter": {"type": "string", "default": "image/jpeg"}
            },
            "required": ["type", "device"]
        },
        "gst": {
            "type": "object",
            "properties": {
                "type": {"type": "string", "enum": ["gst"]},
                "element": {"type": "string"},
                "properties": {"type": "object"},
                "capsfilter": {"type": "string"}
            },
            "required": ["type", "element"]
        },
        "application": {
            "type": "object",
            "properties": {
                "type": {"type": "string", "enum": ["application"]},
                "class": {"type": "string"},
                "input": {"type": "string"},
                "mode": {"type": "string", "enum": ["push", "pull"], "default": "push"}
            },
            "required": ["type", "class"]
        }
    })
}

/// Destination schemas keyed by sub-destination kind, then `type`.
pub fn default_destination_schema() -> Value {
    json!({
        "metadata": {
            "file": {
                "type": "object",
                "properties": {
                    "type": {"type": "string", "enum": ["file"]},
                    "path": {"type": "string"},
                    "format": {
                        "type": "string",
                        "enum": ["json", "json-lines"],
                        "default": "json"
                    }
                },
                "required": ["type", "path"]
            },
            "mqtt": {
                "type": "object",
                "properties": {
                    "type": {
                        "type": "string",
                        "enum": ["mqtt"],
                        "element": {"name": "destination", "property": "method"}
                    },
                    "host": {
                        "type": "string",
                        "element": {"name": "destination", "property": "address"}
                    },
                    "topic": {"type": "string", "element": "destination"},
                    "mqtt-client-id": {"type": "string", "element": "destination"},
                    "timeout": {"type": "integer", "minimum": 0, "element": "destination"}
                },
                "required": ["type", "host", "topic"]
            },
            "kafka": {
                "type": "object",
                "properties": {
                    "type": {
                        "type": "string",
                        "enum": ["kafka"],
                        "element": {"name": "destination", "property": "method"}
                    },
                    "host": {
                        "type": "string",
                        "description": "host:port of a bootstrap server",
                        "element": {"name": "destination", "property": "address"}
                    },
                    "topic": {"type": "string", "element": "destination"}
                },
                "required": ["type", "host", "topic"]
            },
            "application": {
                "type": "object",
                "properties": {
                    "type": {"type": "string", "enum": ["application"]},
                    "class": {"type": "string"},
                    "output": {"type": "string"},
                    "mode": {
                        "type": "string",
                        "enum": ["frames", "messages"],
                        "default": "frames"
                    }
                },
                "required": ["type", "class"]
            }
        },
        "frame": {
            "rtsp": {
                "type": "object",
                "properties": {
                    "type": {"type": "string", "enum": ["rtsp"]},
                    "path": {"type": "string"},
                    "cache-length": {"type": "integer", "minimum": 0, "default": 30},
                    "sync-with-source": {"type": "boolean", "default": true},
                    "sync-with-destination": {"type": "boolean", "default": true},
                    "encode-quality": {
                        "type": "integer",
                        "minimum": 0,
                        "maximum": 100,
                        "default": 85
                    }
                },
                "required": ["type", "path"]
            },
            "webrtc": {
                "type": "object",
                "properties": {
                    "type": {"type": "string", "enum": ["webrtc"]},
                    "peer-id": {"type": "string"},
                    "cache-length": {"type": "integer", "minimum": 0, "default": 30},
                    "sync-with-source": {"type": "boolean", "default": true},
                    "sync-with-destination": {"type": "boolean", "default": true},
                    "encode-quality": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": 51,
                        "default": 10
                    }
                },
                "required": ["type", "peer-id"]
            },
            "application": {
                "type": "object",
                "properties": {
                    "type": {"type": "string", "enum": ["application"]},
                    "class": {"type": "string"},
                    "output": {"type": "string"}
                },
                "required": ["type", "class"]
            }
        }
    })
}

pub fn default_tags_schema() -> Value {
    json!({"type": "object"})
}

pub fn default_parameters_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

/// Overlays template-declared entries on top of `defaults`, one level deep.
pub fn merge_keyed(defaults: Value, overrides: Option<Value>) -> Value {
    match (defaults, overrides) {
        (Value::Object(mut base), Some(Value::Object(extra))) => {
            for (key, value) in extra {
                let nested = matches!(
                    base.get(&key),
                    Some(Value::Object(existing))
                        if existing.get("type").is_none()
                            && existing.values().all(Value::is_object)
                );
                match (nested, value) {
                    (true, Value::Object(inner)) => {
                        if let Some(Value::Object(existing)) = base.get_mut(&key) {
                            existing.extend(inner);
                        }
                    }
                    (_, value) => {
                        base.insert(key, value);
                    }
                }
            }
            Value::Object(base)
        }
        (_, Some(overrides)) => overrides,
        (defaults, None) => defaults,
    }
}
