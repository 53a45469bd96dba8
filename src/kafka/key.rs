use crate::{Error, Result};
use serde_json::Value;
use tracing::{error, warn};

/// Decodes a JSON payload and returns the string found at `field_path`.
///
/// `field_path` may be dotted (`order.customer`) to reach into nested
/// objects. The value must be a JSON string; numbers, objects and nulls are
/// rejected so that the partition key is never an implicit conversion.
pub fn extract_partition_key(payload: &[u8], field_path: &str) -> Result<String> {
    let document: Value = serde_json::from_slice(payload).map_err(|e| {
        error!(
            error = %e,
            payload = %String::from_utf8_lossy(payload),
            "Payload is not valid JSON"
        );
        Error::InvalidArgument(format!("payload is not valid JSON: {}", e))
    })?;

    match lookup_field(&document, field_path) {
        Some(Value::String(key)) => Ok(key.clone()),
        Some(other) => {
            warn!(field = field_path, kind = value_kind(other), "Partition key is not a string");
            Err(Error::InvalidArgument(format!(
                "field '{}' must be a string, found {}",
                field_path,
                value_kind(other)
            )))
        }
        None => {
            warn!(field = field_path, "Partition key field not found in payload");
            Err(Error::InvalidArgument(format!(
                "payload is missing required field '{}'",
                field_path
            )))
        }
    }
}

fn lookup_field<'a>(document: &'a Value, field_path: &str) -> Option<&'a Value> {
    field_path
        .split('.')
        .try_fold(document, |current, part| current.get(part))
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
