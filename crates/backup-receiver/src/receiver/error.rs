use core::net::IpAddr;
use std::io;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use shared::ErrorResponse;
use thiserror::Error;

use crate::{PayloadError, StoreError};

/// Why a backup was not accepted.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The request was not a POST.
    #[error("Method {0} is not allowed")]
    MethodNotAllowed(String),

    /// The client is not in the allowed addresses.
    #[error("{0} is not an allowed address")]
    OriginDenied(IpAddr),

    /// The backup directory could not be created or is not a directory.
    #[error("The backup directory is unavailable: {0}")]
    DirectoryUnavailable(#[source] io::Error),

    /// The daily backup limit has been reached.
    #[error("The daily limit of {0} backups has been reached")]
    LimitExceeded(u64),

    /// The request body could not be read.
    #[error("Failed to read the request body: {0}")]
    BodyUnreadable(String),

    /// The body is not a valid backup.
    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// The backup could not be written.
    #[error("Failed to persist the backup: {0}")]
    PersistFailed(#[source] StoreError),

    /// The task handling the backup did not complete.
    #[error("The ingest task did not complete: {0}")]
    Interrupted(String),
}

impl IngestError {
    /// The HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::OriginDenied(_) => StatusCode::FORBIDDEN,
            Self::DirectoryUnavailable(_) | Self::PersistFailed(_) | Self::Interrupted(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::LimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::BodyUnreadable(_) => StatusCode::BAD_REQUEST,
            Self::Payload(PayloadError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Payload(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// The message sent to the client. Does not leak server internals.
    pub fn client_message(&self) -> &'static str {
        match self {
            Self::MethodNotAllowed(_) => "Method not allowed. Use POST.",
            Self::OriginDenied(_) => "Access denied.",
            Self::DirectoryUnavailable(_) => "Failed to create backup directory.",
            Self::LimitExceeded(_) => "Daily backup limit exceeded.",
            Self::BodyUnreadable(_) => "Failed to read request body.",
            Self::Payload(PayloadError::EmptyBody) => "No data received.",
            Self::Payload(PayloadError::TooLarge { .. }) => "Backup data too large.",
            Self::Payload(PayloadError::MalformedJson(_)) => "Invalid JSON data.",
            Self::Payload(PayloadError::SchemaViolation(_) | PayloadError::MissingField(_)) => {
                "Invalid backup structure. Missing timestamp or data."
            }
            Self::PersistFailed(_) | Self::Interrupted(_) => "Failed to save backup.",
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(ErrorResponse::new(self.client_message())),
        )
            .into_response()
    }
}
