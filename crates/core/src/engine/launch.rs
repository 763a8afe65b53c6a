//! Launch string rendering.
//!
//! Templates reference request values with `{section[key][subkey]}`
//! placeholders. `{{` and `}}` produce literal braces.
//!
//! Engines that take an argument vector use [`render_launch_args`]: the
//! template is split first, so a request value always stays inside the
//! argument its placeholder sits in.

use serde_json::Value;

use super::error::EngineError;

/// Substitutes request values into a launch string.
pub fn render_launch(template: &str, request: &Value) -> Result<String, EngineError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    field.push(c);
                }
                if !closed {
                    return Err(EngineError::invalid_launch(format!(
                        "unterminated placeholder '{{{}'",
                        field
                    )));
                }
                out.push_str(&lookup(&field, request)?);
            }
            '}' => {
                return Err(EngineError::invalid_launch("single '}' in launch string"));
            }
            c => out.push(c),
        }
    }

    Ok(out)
}

/// Splits the template into arguments, then substitutes request values
/// inside each argument.
pub fn render_launch_args(template: &str, request: &Value) -> Result<Vec<String>, EngineError> {
    split_args(template)?
        .iter()
        .map(|arg| render_launch(arg, request))
        .collect()
}

fn lookup(field: &str, request: &Value) -> Result<String, EngineError> {
    let missing = || EngineError::MissingPlaceholder {
        placeholder: field.to_string(),
    };

    let (head, mut rest) = match field.find('[') {
        Some(idx) => (&field[..idx], &field[idx..]),
        None => (field, ""),
    };
    let mut value = request.get(head.trim()).ok_or_else(missing)?;

    while !rest.is_empty() {
        let end = rest.find(']').ok_or_else(|| {
            EngineError::invalid_launch(format!("unbalanced '[' in placeholder '{}'", field))
        })?;
        let key = &rest[1..end];
        value = match value {
            Value::Object(map) => map.get(key),
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
        .ok_or_else(missing)?;
        rest = &rest[end + 1..];
        if !rest.is_empty() && !rest.starts_with('[') {
            return Err(EngineError::invalid_launch(format!(
                "unexpected text after ']' in placeholder '{}'",
                field
            )));
        }
    }

    Ok(match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Splits a command line into arguments, honoring single and double quotes.
pub fn split_args(line: &str) -> Result<Vec<String>, EngineError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_arg = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                in_arg = true;
            }
            None if c.is_whitespace() => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            None => {
                current.push(c);
                in_arg = true;
            }
        }
    }

    if quote.is_some() {
        return Err(EngineError::invalid_launch("unterminated quote"));
    }
    if in_arg {
        args.push(current);
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_nested_placeholder() {
        let request = json!({
            "source": {"uri": "file:///a.mp4"},
            "parameters": {"scale": {"width": 640}}
        });
        let rendered = render_launch(
            "-i {source[uri]} -vf scale=w={parameters[scale][width]}",
            &request,
        )
        .unwrap();
        assert_eq!(rendered, "-i file:///a.mp4 -vf scale=w=640");
    }

    #[test]
    fn test_render_escaped_braces() {
        let rendered = render_launch("{{literal}} {name}", &json!({"name": "x"})).unwrap();
        assert_eq!(rendered, "{literal} x");
    }

    #[test]
    fn test_render_missing_value() {
        let err = render_launch("-i {source[uri]}", &json!({"source": {}})).unwrap_err();
        assert!(matches!(
            err,
            EngineError::MissingPlaceholder { placeholder } if placeholder == "source[uri]"
        ));
    }

    #[test]
    fn test_render_unterminated() {
        assert!(matches!(
            render_launch("-i {source", &json!({})),
            Err(EngineError::InvalidLaunch { .. })
        ));
    }

    #[test]
    fn test_render_array_index() {
        let request = json!({"inputs": ["a.mp4", "b.mp4"]});
        assert_eq!(render_launch("{inputs[1]}", &request).unwrap(), "b.mp4");
    }

    #[test]
    fn test_render_args_keeps_value_in_one_argument() {
        let request = json!({
            "source": {"uri": "file:///my clip.mp4 -y /tmp/other.mp4"},
            "parameters": {"title": "it's \"quoted\""}
        });
        let args = render_launch_args(
            "-i {source[uri]} -metadata 'title={parameters[title]}' -f null -",
            &request,
        )
        .unwrap();
        assert_eq!(
            args,
            vec![
                "-i",
                "file:///my clip.mp4 -y /tmp/other.mp4",
                "-metadata",
                "title=it's \"quoted\"",
                "-f",
                "null",
                "-"
            ]
        );
    }

    #[test]
    fn test_render_args_missing_value() {
        assert!(matches!(
            render_launch_args("-i {source[uri]}", &json!({"source": {}})),
            Err(EngineError::MissingPlaceholder { .. })
        ));
    }

    #[test]
    fn test_split_args_quotes() {
        let args = split_args(r#"-i "my file.mp4" -vf 'scale=w=1:h=2' out.mp4"#).unwrap();
        assert_eq!(args, vec!["-i", "my file.mp4", "-vf", "scale=w=1:h=2", "out.mp4"]);
    }

    #[test]
    fn test_split_args_empty_quoted() {
        let args = split_args(r#"-metadata title="" x"#).unwrap();
        assert_eq!(args, vec!["-metadata", "title=", "x"]);
    }

    #[test]
    fn test_split_args_unterminated() {
        assert!(split_args("-i 'oops").is_err());
    }
}
