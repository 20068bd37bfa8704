//! Argument validation against the tool parameter schemas.
//!
//! The registry's schemas are the single source of truth; validation here is
//! the executor's first line of defense so handlers can assume well-typed
//! input. Checks cover required fields, primitive types and enum membership,
//! which is exactly what the schemas express.

use serde_json::Value;

/// Validate `args` against a JSON-schema-shaped `schema`. Returns the list
/// of problems, empty when the arguments are acceptable.
pub fn validate_args(schema: &Value, args: &Value) -> Vec<String> {
    let mut problems = Vec::new();

    let Some(obj) = args.as_object() else {
        return vec!["arguments must be an object".to_string()];
    };
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if !obj.contains_key(field) {
                problems.push(format!("missing required field '{}'", field));
            }
        }
    }

    for (key, value) in obj {
        let Some(prop) = properties.get(key) else {
            if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
                problems.push(format!("unknown field '{}'", key));
            }
            continue;
        };

        if let Some(expected) = prop.get("type").and_then(Value::as_str) {
            if !type_matches(expected, value) {
                problems.push(format!(
                    "field '{}' should be {}, got {}",
                    key,
                    expected,
                    type_name(value)
                ));
                continue;
            }
        }

        if let Some(allowed) = prop.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                let options: Vec<String> = allowed.iter().map(render).collect();
                problems.push(format!(
                    "field '{}' must be one of [{}]",
                    key,
                    options.join(", ")
                ));
            }
        }
    }

    problems
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
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

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {"type": "string"},
                "mode": {"type": "string", "enum": ["rtl", "post_synth"]},
                "signals": {"type": "array"},
                "start_time": {"type": "integer"}
            },
            "required": ["file_path"],
            "additionalProperties": false
        })
    }

    #[test]
    fn accepts_valid_arguments() {
        let args = json!({"file_path": "dump.vcd", "mode": "rtl", "start_time": 0});
        assert!(validate_args(&schema(), &args).is_empty());
    }

    #[test]
    fn reports_missing_required() {
        let problems = validate_args(&schema(), &json!({"mode": "rtl"}));
        assert!(problems.iter().any(|p| p.contains("file_path")));
    }

    #[test]
    fn reports_type_mismatches() {
        let problems = validate_args(&schema(), &json!({"file_path": 42}));
        assert!(problems.iter().any(|p| p.contains("should be string")));
    }

    #[test]
    fn reports_enum_violations() {
        let problems =
            validate_args(&schema(), &json!({"file_path": "a.vcd", "mode": "gate"}));
        assert!(problems.iter().any(|p| p.contains("one of")));
    }

    #[test]
    fn reports_unknown_fields_when_closed() {
        let problems =
            validate_args(&schema(), &json!({"file_path": "a.vcd", "bogus": true}));
        assert!(problems.iter().any(|p| p.contains("unknown field 'bogus'")));
    }
}
