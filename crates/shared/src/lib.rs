//! # Shared
//! The shared components between the backup receiver and the clients that talk to it.
//!

#![warn(missing_docs)]

mod failure;
mod logger;
mod response;

pub use failure::{Failure, log_and_panic};
pub use logger::{LoggerError, init_logger};
pub use response::{ErrorResponse, SuccessResponse};
