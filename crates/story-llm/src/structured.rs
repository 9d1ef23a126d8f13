//! Parse model text as JSON and check it against a JSON Schema.

use crate::error::LlmError;
use crate::Result;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Parse `raw` as JSON. A fenced ```json block is unwrapped first.
pub fn parse_json(raw: &str) -> Result<Value> {
    let trimmed = strip_code_fence(raw.trim());
    if trimmed.is_empty() {
        return Err(LlmError::Parse("empty response".to_string()));
    }
    serde_json::from_str(trimmed).map_err(|e| LlmError::Parse(e.to_string()))
}

fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Validate `value` against `schema`, returning every violation.
pub fn validate(value: &Value, schema: &Value) -> Result<()> {
    let compiled = jsonschema::JSONSchema::compile(schema)
        .map_err(|e| LlmError::Parse(format!("invalid output schema: {e}")))?;

    let errors: Vec<String> = compiled
        .validate(value)
        .err()
        .map(|errors| {
            errors
                .map(|error| {
                    let path = error.instance_path.to_string();
                    if path.is_empty() {
                        error.to_string()
                    } else {
                        format!("{path}: {error}")
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(LlmError::SchemaMismatch(errors))
    }
}

/// Parse, validate, then deserialize.
pub fn decode<T: DeserializeOwned>(raw: &str, schema: &Value) -> Result<T> {
    let value = parse_json(raw)?;
    validate(&value, schema)?;
    serde_json::from_value(value).map_err(|e| LlmError::Parse(e.to_string()))
}
