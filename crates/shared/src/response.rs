use serde::{Deserialize, Serialize};

/// The body the receiver replies with once a backup has been stored.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuccessResponse {
    /// Always `true`.
    pub success: bool,

    /// Human readable confirmation.
    pub message: String,

    /// The name the backup was stored under.
    pub filename: String,

    /// When the receiver received the backup, RFC 3339.
    pub timestamp: String,

    /// The size of the received body in bytes.
    pub size: u64,
}

impl SuccessResponse {
    /// Creates a response for a stored backup.
    pub fn new(filename: String, timestamp: String, size: u64) -> Self {
        Self {
            success: true,
            message: "Backup received and stored successfully.".to_string(),
            filename,
            timestamp,
            size,
        }
    }
}

/// The body the receiver replies with when a backup was rejected.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Why the backup was rejected.
    pub error: String,
}

impl ErrorResponse {
    /// Creates an error response.
    pub fn new<S: Into<String>>(error: S) -> Self {
        Self {
            error: error.into(),
        }
    }
}
