use core::net::IpAddr;
use std::{
    fs,
    io::{self, ErrorKind},
    time::SystemTime,
};

use chrono::{DateTime, Local, SecondsFormat};
use shared::SuccessResponse;
use tracing::{error, warn};

use crate::{
    ActivityLog, BackupStore, Config, Context, RateLimiter,
    cleanup::{SweepReport, cleanup},
};

mod error;
mod ingest;

pub use error::IngestError;

/// The backup receiver.
pub struct Receiver {
    /// The receiver config.
    pub config: Config,

    /// Where backups are stored.
    pub store: BackupStore,

    /// The daily backup counters.
    pub rate_limiter: RateLimiter,

    /// The log of stored backups.
    pub activity_log: ActivityLog,
}

/// A backup submitted by a client.
#[derive(Debug, Clone)]
pub struct Submission {
    /// The address the backup was sent from.
    pub client: IpAddr,

    /// The address the backup was received on, if known.
    pub server: Option<IpAddr>,

    /// The user agent the client declared.
    pub user_agent: Option<String>,

    /// The raw body.
    pub body: Vec<u8>,
}

/// A backup that was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    /// The name the backup was stored under.
    pub filename: String,

    /// When the backup was received.
    pub received_at: DateTime<Local>,

    /// The size of the raw body in bytes.
    pub size: u64,
}

impl Accepted {
    /// The body to reply to the client with.
    pub fn response(&self) -> SuccessResponse {
        SuccessResponse::new(
            self.filename.clone(),
            self.received_at
                .to_rfc3339_opts(SecondsFormat::Secs, false),
            self.size,
        )
    }
}

impl Receiver {
    /// Create a new receiver from config.
    pub fn new(config: Config) -> Self {
        let directory = config.backup_directory.clone();

        Self {
            store: BackupStore::new(directory.clone()),
            rate_limiter: RateLimiter::new(directory.clone()),
            activity_log: ActivityLog::new(directory),
            config,
        }
    }

    /// Check the client is allowed to submit backups.
    pub fn authorize(&self, context: &mut Context, client: IpAddr) -> Result<(), IngestError> {
        context.current_context = "Authorize";

        if !self.config.is_allowed(client) {
            warn!("{context}Address is not allowed");
            return Err(IngestError::OriginDenied(client));
        }

        Ok(())
    }

    /// Ensure the backup directory exists.
    pub fn prepare_directory(&self, context: &mut Context) -> Result<(), IngestError> {
        context.current_context = "Prepare Directory";

        let backup_directory = self.store.directory();

        // Check if the backup dir exists
        let directory_metadata = match fs::metadata(backup_directory) {
            Ok(directory_metadata) => Some(directory_metadata),
            Err(error) => {
                if error.kind() == ErrorKind::NotFound {
                    None
                } else {
                    error!("{context}Could not check metadata for {backup_directory:?}: {error}");
                    return Err(IngestError::DirectoryUnavailable(error));
                }
            }
        };

        match directory_metadata {
            // If the backup_dir exists, ensure it is a directory
            Some(directory_metadata) => {
                if !directory_metadata.is_dir() {
                    error!("{context}{backup_directory:?} is not a dir: {directory_metadata:?}");
                    return Err(IngestError::DirectoryUnavailable(io::Error::new(
                        ErrorKind::NotADirectory,
                        format!("{backup_directory:?} is not a directory"),
                    )));
                }
            }

            // If it does not exist, create it.
            None => {
                fs::create_dir_all(backup_directory)
                    .inspect_err(|e| {
                        error!("{context}Could not create directory {backup_directory:?}: {e}")
                    })
                    .map_err(IngestError::DirectoryUnavailable)?;
            }
        }

        Ok(())
    }

    /// Remove expired backups and daily counters.
    pub fn sweep(&self, now: SystemTime) -> SweepReport {
        let mut context = Context::default();

        cleanup(
            &mut context,
            self.store.directory(),
            self.config.retention.maximum_age(),
            now,
        )
    }
}
