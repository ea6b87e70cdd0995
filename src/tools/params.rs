//! Parameter validation and typed accessors.
//!
//! Validation checks required fields, declared types, `enum` membership and
//! integer minimums, then injects defaults for absent optional fields.
//! Unknown parameters pass through untouched.

use serde_json::{Map, Value};

use super::ToolDefinition;
use crate::error::{GatewayError, GatewayResult};

/// Validate `params` against `definition`, returning the enriched object.
///
/// `null` is accepted as an empty object. Any other non-object fails.
pub fn validate_params(
    definition: &ToolDefinition,
    params: &Value,
) -> GatewayResult<Map<String, Value>> {
    let mut result = match params {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            return Err(GatewayError::invalid(format!(
                "parameters must be a JSON object, got {}",
                json_type_name(other)
            )))
        }
    };

    for (name, spec) in &definition.parameters {
        let value = result.get(name).filter(|v| !v.is_null()).cloned();

        let Some(value) = value else {
            if spec.required {
                return Err(GatewayError::invalid(format!(
                    "missing required parameter: {}",
                    name
                )));
            }
            match &spec.default {
                Some(default) => {
                    result.insert(name.clone(), default.clone());
                }
                None => {
                    result.remove(name);
                }
            }
            continue;
        };

        if !spec.param_type.matches(&value) {
            return Err(GatewayError::invalid(format!(
                "parameter '{}' must be of type '{}', got {}",
                name,
                spec.param_type.as_str(),
                json_type_name(&value)
            )));
        }

        if let Some(allowed) = &spec.allowed {
            if !allowed.contains(&value) {
                let allowed: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
                return Err(GatewayError::invalid(format!(
                    "parameter '{}' must be one of [{}], got {}",
                    name,
                    allowed.join(", "),
                    value
                )));
            }
        }

        if let (Some(min), Some(n)) = (spec.minimum, value.as_i64()) {
            if n < min {
                return Err(GatewayError::invalid(format!(
                    "parameter '{}' must be >= {}, got {}",
                    name, min, n
                )));
            }
        }
    }

    Ok(result)
}

/// Human-readable name for a JSON value's type.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============ Accessors ============

pub fn required_str<'a>(params: &'a Map<String, Value>, name: &str) -> GatewayResult<&'a str> {
    optional_str(params, name)?
        .ok_or_else(|| GatewayError::invalid(format!("missing required parameter: {}", name)))
}

pub fn optional_str<'a>(
    params: &'a Map<String, Value>,
    name: &str,
) -> GatewayResult<Option<&'a str>> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(GatewayError::invalid(format!(
            "parameter '{}' must be of type 'string', got {}",
            name,
            json_type_name(other)
        ))),
    }
}

pub fn optional_usize(params: &Map<String, Value>, name: &str) -> GatewayResult<Option<usize>> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| {
                GatewayError::invalid(format!(
                    "parameter '{}' must be a non-negative integer, got {}",
                    name, v
                ))
            }),
    }
}

pub fn flag(params: &Map<String, Value>, name: &str) -> bool {
    params.get(name).and_then(Value::as_bool).unwrap_or(false)
}
