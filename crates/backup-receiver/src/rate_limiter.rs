use std::{
    fs, io,
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use thiserror::Error;
use tracing::warn;

use crate::locked_file;

/// Prefix of the daily counter files.
pub const COUNTER_PREFIX: &str = ".rate_limit_";

/// Counts accepted backups per calendar day using one counter file per day.
///
/// Reads are never cached, the counter files are the only source of truth so several receiver
/// processes can share a directory.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    directory: PathBuf,
}

impl RateLimiter {
    /// Creates a rate limiter keeping its counters in `directory`.
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// The path of the counter file for `date`.
    pub fn counter_path(&self, date: NaiveDate) -> PathBuf {
        self.directory
            .join(format!("{COUNTER_PREFIX}{}", date.format("%Y-%m-%d")))
    }

    /// The number of backups accepted on `date`. Missing counters are zero.
    ///
    /// Not locked, a concurrent increment may not be visible yet.
    pub fn check(&self, date: NaiveDate) -> Result<u64, RateLimitError> {
        let path = self.counter_path(date);

        match fs::read_to_string(&path) {
            Ok(contents) => Ok(parse_count(&path, &contents)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(error) => Err(RateLimitError::Read(error)),
        }
    }

    /// Returns if another backup may be accepted on `date`.
    pub fn admit(&self, date: NaiveDate, maximum: u64) -> Result<bool, RateLimitError> {
        Ok(self.check(date)? < maximum)
    }

    /// Records an accepted backup on `date` and returns the new count.
    ///
    /// The read-modify-write happens under an exclusive lock on the counter file so concurrent
    /// increments are never lost.
    pub fn increment(&self, date: NaiveDate) -> Result<u64, RateLimitError> {
        let path = self.counter_path(date);

        let updated = locked_file::update(&path, |current| {
            parse_count(&path, current).saturating_add(1).to_string()
        })
        .map_err(RateLimitError::Write)?;

        Ok(parse_count(&path, &updated))
    }
}

/// Returns if `file_name` is a daily counter file.
pub fn is_counter_file(file_name: &str) -> bool {
    file_name
        .strip_prefix(COUNTER_PREFIX)
        .is_some_and(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok())
}

/// A counter that was just created and not yet written is empty, that reads as zero.
fn parse_count(path: &Path, contents: &str) -> u64 {
    let contents = contents.trim();
    if contents.is_empty() {
        return 0;
    }

    match contents.parse() {
        Ok(count) => count,
        Err(error) => {
            warn!("Counter {path:?} contains '{contents}' and will be treated as 0: {error}");
            0
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Failed to read the daily counter: {0}")]
    Read(#[source] io::Error),

    #[error("Failed to write the daily counter: {0}")]
    Write(#[source] io::Error),
}
