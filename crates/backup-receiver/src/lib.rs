//! # backup-receiver
//! Receives JSON backups over HTTP, stores them under a daily limit and removes them once they
//! expire.
//!

mod activity_log;
mod cleanup;
mod config;
mod context;
mod locked_file;
mod payload;
mod rate_limiter;
mod receiver;
pub mod server;
mod store;

pub use activity_log::{ActivityLog, LOG_FILE};
pub use cleanup::{SweepReport, cleanup};
pub use config::{Config, Limits, LoadConfigError, Retention};
pub use context::Context;
pub use payload::{Payload, PayloadError, REQUIRED_FIELDS, validate};
pub use rate_limiter::{COUNTER_PREFIX, RateLimitError, RateLimiter, is_counter_file};
pub use receiver::{Accepted, IngestError, Receiver, Submission};
pub use store::{
    BACKUP_PREFIX, BACKUP_SUFFIX, BackupEntry, BackupRecord, BackupStore, SERVER_METADATA_KEY,
    ServerMetadata, StoreError, StoreSummary, format_age, is_backup_file,
};
