use serde_json::{Map, Value};
use thiserror::Error;

/// Fields every backup payload must contain.
pub const REQUIRED_FIELDS: [&str; 2] = ["timestamp", "data"];

/// A structurally valid backup submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    /// The submitted JSON object, in the order the client sent it.
    pub fields: Map<String, Value>,

    /// The size of the raw body in bytes.
    pub size: u64,
}

/// Decodes and checks a raw backup submission.
///
/// The size is checked on the raw bytes before anything is parsed.
pub fn validate(bytes: &[u8], maximum_bytes: u64) -> Result<Payload, PayloadError> {
    if bytes.is_empty() {
        return Err(PayloadError::EmptyBody);
    }

    let size = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
    if size > maximum_bytes {
        return Err(PayloadError::TooLarge {
            size,
            maximum: maximum_bytes,
        });
    }

    let value: Value = serde_json::from_slice(bytes)?;

    let Value::Object(fields) = value else {
        return Err(PayloadError::SchemaViolation("not a JSON object"));
    };

    if let Some(missing) = REQUIRED_FIELDS
        .into_iter()
        .find(|field| !fields.contains_key(*field))
    {
        return Err(PayloadError::MissingField(missing));
    }

    Ok(Payload { fields, size })
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("The body is empty")]
    EmptyBody,

    #[error("The body is {size} bytes, the limit is {maximum} bytes")]
    TooLarge { size: u64, maximum: u64 },

    #[error("The body is not valid JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("The body is not a valid backup: {0}")]
    SchemaViolation(&'static str),

    #[error("The body is missing the '{0}' field")]
    MissingField(&'static str),
}

impl PayloadError {
    /// Returns if the error is a schema violation.
    pub fn is_schema_violation(&self) -> bool {
        matches!(self, Self::SchemaViolation(_) | Self::MissingField(_))
    }
}
