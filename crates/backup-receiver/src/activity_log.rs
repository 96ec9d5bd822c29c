use core::net::IpAddr;
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local, SecondsFormat};

use crate::locked_file;

/// Name of the activity log inside the backup directory.
pub const LOG_FILE: &str = "backup.log";

/// Append only log of every stored backup.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    path: PathBuf,
}

impl ActivityLog {
    /// Creates an activity log inside `directory`.
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            path: directory.as_ref().join(LOG_FILE),
        }
    }

    /// Records a stored backup.
    pub fn append(
        &self,
        received_at: DateTime<Local>,
        filename: &str,
        size: u64,
        client: IpAddr,
    ) -> io::Result<()> {
        let line = format!(
            "[{}] Backup saved: {filename} (Size: {size} bytes, Client: {client})\n",
            received_at.to_rfc3339_opts(SecondsFormat::Secs, false)
        );

        locked_file::append(&self.path, line.as_bytes())
    }

    /// The last `count` lines of the log, oldest first. A missing log has no lines.
    pub fn tail(&self, count: usize) -> io::Result<Vec<String>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error),
        };

        let lines: Vec<&str> = contents.lines().collect();
        let start = lines.len().saturating_sub(count);

        Ok(lines
            .into_iter()
            .skip(start)
            .map(str::to_string)
            .collect())
    }
}
