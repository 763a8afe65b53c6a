//! Template types.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::schemas::{
    default_destination_schema, default_parameters_schema, default_source_schema,
    default_tags_schema, merge_keyed,
};

/// A named, versioned pipeline definition. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub name: String,
    pub version: String,
    /// Engine type that runs this template.
    pub engine_type: String,
    pub description: String,
    /// Launch string with `{section[key]}` placeholders.
    pub launch: String,
    /// Schema for the request's `parameters` section.
    pub parameters: Value,
    /// Source schemas keyed by source type.
    pub source: Value,
    /// Destination schemas keyed by kind (`metadata`, `frame`) then type.
    pub destination: Value,
    /// Schema for the request's `tags` section.
    pub tags: Value,
}

impl Template {
    /// Creates a template with the default section schemas.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        engine_type: impl Into<String>,
        launch: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            engine_type: engine_type.into(),
            description: String::new(),
            launch: launch.into(),
            parameters: default_parameters_schema(),
            source: default_source_schema(),
            destination: default_destination_schema(),
            tags: default_tags_schema(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_parameters(mut self, schema: Value) -> Self {
        self.parameters = schema;
        self
    }

    /// Adds source schemas on top of the defaults.
    pub fn with_source(mut self, schema: Value) -> Self {
        self.source = merge_keyed(default_source_schema(), Some(schema));
        self
    }

    /// Adds destination schemas on top of the defaults.
    pub fn with_destination(mut self, schema: Value) -> Self {
        self.destination = merge_keyed(default_destination_schema(), Some(schema));
        self
    }

    pub fn with_tags(mut self, schema: Value) -> Self {
        self.tags = schema;
        self
    }

    /// Builds a template from the contents of a template file.
    ///
    /// Returns a human-readable reason when the file should be skipped.
    pub fn from_file_value(
        name: &str,
        version: &str,
        value: Value,
        supported_types: &[&str],
    ) -> Result<Self, String> {
        let file: TemplateFile =
            serde_json::from_value(value).map_err(|e| format!("invalid template: {}", e))?;

        let engine_type = file.engine_type.ok_or("missing 'type'")?;
        let description = file.description.ok_or("missing 'description'")?;
        if !supported_types.iter().any(|t| *t == engine_type) {
            return Err(format!("unsupported type '{}'", engine_type));
        }
        let launch = match file.template.ok_or("missing 'template'")? {
            LaunchTemplate::Single(s) => s,
            LaunchTemplate::Lines(lines) => lines.concat(),
        };

        Ok(Self {
            name: name.to_string(),
            version: version.to_string(),
            engine_type,
            description,
            launch,
            parameters: file.parameters.unwrap_or_else(default_parameters_schema),
            source: merge_keyed(default_source_schema(), file.source),
            destination: merge_keyed(default_destination_schema(), file.destination),
            tags: file.tags.unwrap_or_else(default_tags_schema),
        })
    }

    /// Public view of the template.
    pub fn summary(&self) -> TemplateSummary {
        TemplateSummary {
            name: self.name.clone(),
            version: self.version.clone(),
            engine_type: self.engine_type.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }

    /// Schema for one source type.
    pub fn source_schema(&self, source_type: &str) -> Option<&Value> {
        self.source.get(source_type)
    }

    /// Schema for one sub-destination.
    pub fn destination_schema(&self, kind: &str, destination_type: &str) -> Option<&Value> {
        self.destination.get(kind)?.get(destination_type)
    }

    /// Expands `{env[NAME]}` in parameter defaults.
    ///
    /// A default referencing an unset variable is removed. For non-string
    /// parameter types the expanded text is parsed as JSON. Returns warnings.
    pub fn expand_env_defaults<F>(&mut self, lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut warnings = Vec::new();
        let Some(pattern) = Regex::new(r"\{env\[([A-Za-z_][A-Za-z0-9_]*)\]\}").ok() else {
            return warnings;
        };
        let Some(Value::Object(properties)) = self.parameters.get_mut("properties") else {
            return warnings;
        };

        for (key, schema) in properties.iter_mut() {
            let Some(schema) = schema.as_object_mut() else {
                continue;
            };
            let Some(Value::String(default)) = schema.get("default") else {
                continue;
            };
            if !pattern.is_match(default) {
                continue;
            }

            let mut unset = None;
            let expanded = pattern
                .replace_all(default, |caps: &regex_lite::Captures| {
                    let var = &caps[1];
                    lookup(var).unwrap_or_else(|| {
                        unset = Some(var.to_string());
                        String::new()
                    })
                })
                .into_owned();

            if let Some(var) = unset {
                warnings.push(format!(
                    "{}/{}: parameter '{}' default dropped, {} is not set",
                    self.name, self.version, key, var
                ));
                schema.remove("default");
                continue;
            }

            let is_string = schema.get("type").and_then(Value::as_str) == Some("string");
            let value = if is_string {
                Value::String(expanded)
            } else {
                match serde_json::from_str::<Value>(&expanded) {
                    Ok(value) => value,
                    Err(e) => {
                        warnings.push(format!(
                            "{}/{}: parameter '{}' default '{}' is not valid JSON: {}",
                            self.name, self.version, key, expanded, e
                        ));
                        schema.remove("default");
                        continue;
                    }
                }
            };
            schema.insert("default".to_string(), value);
        }

        warnings
    }

    /// Every element binding declared in the template, with the request path it reads.
    pub fn bindings(&self) -> Vec<SectionBinding> {
        let mut out = Vec::new();
        collect_bindings(&self.parameters, BindingSection::Parameters, &mut out);
        if let Some(sources) = self.source.as_object() {
            for (source_type, schema) in sources {
                collect_bindings(schema, BindingSection::Source(source_type.clone()), &mut out);
            }
        }
        if let Some(kinds) = self.destination.as_object() {
            for (kind, types) in kinds {
                let Some(types) = types.as_object() else {
                    continue;
                };
                for (destination_type, schema) in types {
                    collect_bindings(
                        schema,
                        BindingSection::Destination(kind.clone(), destination_type.clone()),
                        &mut out,
                    );
                }
            }
        }
        out
    }
}

/// Public description of a loaded template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateSummary {
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub engine_type: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Deserialize)]
struct TemplateFile {
    #[serde(rename = "type")]
    engine_type: Option<String>,
    description: Option<String>,
    template: Option<LaunchTemplate>,
    parameters: Option<Value>,
    source: Option<Value>,
    destination: Option<Value>,
    tags: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LaunchTemplate {
    Single(String),
    Lines(Vec<String>),
}

// =============================================================================
// Element bindings
// =============================================================================

/// Where in the request a bound value lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingSection {
    Parameters,
    /// Applies when the request's source has this type.
    Source(String),
    /// Applies when `destination[kind]` has this type.
    Destination(String, String),
}

/// A schema property that is written to one or more engine elements.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionBinding {
    pub section: BindingSection,
    /// Key within the section.
    pub key: String,
    pub targets: Vec<ElementBinding>,
}

/// One element/property target of a bound value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementBinding {
    pub element: String,
    /// Property name; defaults to the parameter key.
    pub property: Option<String>,
    /// `json` serializes the value to a string before writing it.
    pub format: Option<String>,
}

impl ElementBinding {
    pub fn property_for<'a>(&'a self, key: &'a str) -> &'a str {
        self.property.as_deref().unwrap_or(key)
    }

    pub fn is_json(&self) -> bool {
        self.format.as_deref() == Some("json")
    }
}

fn collect_bindings(schema: &Value, section: BindingSection, out: &mut Vec<SectionBinding>) {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return;
    };
    for (key, property) in properties {
        let Some(element) = property.get("element") else {
            continue;
        };
        let targets = parse_element(element);
        if !targets.is_empty() {
            out.push(SectionBinding {
                section: section.clone(),
                key: key.clone(),
                targets,
            });
        }
    }
}

fn parse_element(value: &Value) -> Vec<ElementBinding> {
    match value {
        Value::String(element) => vec![ElementBinding {
            element: element.clone(),
            property: None,
            format: None,
        }],
        Value::Object(map) => parse_element_object(map).into_iter().collect(),
        Value::Array(items) => items.iter().flat_map(parse_element).collect(),
        _ => Vec::new(),
    }
}

fn parse_element_object(map: &Map<String, Value>) -> Option<ElementBinding> {
    Some(ElementBinding {
        element: map.get("name")?.as_str()?.to_string(),
        property: map
            .get("property")
            .and_then(Value::as_str)
            .map(str::to_string),
        format: map.get("format").and_then(Value::as_str).map(str::to_string),
    })
}
