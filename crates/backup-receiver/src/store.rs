use core::{net::IpAddr, time::Duration};
use std::{
    fs, io,
    path::{Path, PathBuf},
    time::SystemTime,
};

use chrono::{DateTime, Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{locked_file, payload::Payload};

/// Prefix of every backup file.
pub const BACKUP_PREFIX: &str = "backup_";
/// Suffix of every backup file.
pub const BACKUP_SUFFIX: &str = ".json";
/// Key the server metadata is stored under in a backup file.
pub const SERVER_METADATA_KEY: &str = "server_metadata";

/// How many suffixed names are tried when a backup for the same second already exists.
const MAXIMUM_SUFFIX: u8 = 99;

/// Information the receiver records about a backup when it is received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMetadata {
    /// When the backup was received, RFC 3339.
    pub received_at: String,
    /// The address the backup was received on.
    pub server_ip: String,
    /// The address the backup was received from.
    pub client_ip: String,
    /// The user agent the client declared.
    pub user_agent: String,
    /// The size of the raw body in bytes.
    pub backup_size: u64,
}

impl ServerMetadata {
    /// Creates the metadata for a backup received now.
    pub fn new(
        received_at: DateTime<Local>,
        server: Option<IpAddr>,
        client: IpAddr,
        user_agent: Option<&str>,
        backup_size: u64,
    ) -> Self {
        Self {
            received_at: received_at.to_rfc3339_opts(SecondsFormat::Secs, false),
            server_ip: server.map_or_else(|| "unknown".to_string(), |ip| ip.to_string()),
            client_ip: client.to_string(),
            user_agent: user_agent.unwrap_or("unknown").to_string(),
            backup_size,
        }
    }
}

/// A client payload enriched with server metadata, ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupRecord {
    /// The receipt time to the second, `YYYY-MM-DD_HH-MM-SS`.
    pub id: String,
    /// The client's payload without any `server_metadata` it supplied.
    pub payload: Map<String, Value>,
    /// The metadata recorded by the receiver.
    pub server_metadata: ServerMetadata,
}

#[derive(Serialize)]
struct StoredDocument<'a> {
    #[serde(flatten)]
    payload: &'a Map<String, Value>,
    server_metadata: &'a ServerMetadata,
}

impl BackupRecord {
    /// Enriches a validated payload.
    pub fn new(
        payload: Payload,
        received_at: DateTime<Local>,
        server_metadata: ServerMetadata,
    ) -> Self {
        let mut fields = payload.fields;
        fields.shift_remove(SERVER_METADATA_KEY);

        Self {
            id: received_at.format("%Y-%m-%d_%H-%M-%S").to_string(),
            payload: fields,
            server_metadata,
        }
    }

    /// The record as pretty printed JSON, non ASCII characters are kept as is.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(&StoredDocument {
            payload: &self.payload,
            server_metadata: &self.server_metadata,
        })
    }
}

/// A stored backup as seen in the directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    /// The backup file name.
    pub filename: String,
    /// The file size in bytes.
    pub size: u64,
    /// When the file was last modified.
    pub modified: SystemTime,
}

impl BackupEntry {
    /// How long ago the backup was last modified.
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.modified).unwrap_or_default()
    }
}

/// Formats an age as `Hh Mm`, or `Mm` under an hour.
pub fn format_age(age: Duration) -> String {
    let minutes = age.as_secs() / 60;
    let (hours, minutes) = (minutes / 60, minutes % 60);

    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Totals over every stored backup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSummary {
    /// Number of backups.
    pub backups: usize,
    /// Combined size of every backup in bytes.
    pub total_bytes: u64,
    /// The newest backup.
    pub newest: Option<BackupEntry>,
}

/// Stores backups as one JSON file each in a single directory.
#[derive(Debug, Clone)]
pub struct BackupStore {
    directory: PathBuf,
}

impl BackupStore {
    /// Creates a store in `directory`.
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// The directory backups are stored in.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Writes `record` to a new file and returns its name.
    ///
    /// Existing files are never overwritten. If a backup with the same second is already stored
    /// a numbered suffix is appended, once those run out the write fails.
    pub fn put(&self, record: &BackupRecord) -> Result<String, StoreError> {
        let contents = record.to_json()?;

        for attempt in 0..=MAXIMUM_SUFFIX {
            let filename = if attempt == 0 {
                format!("{BACKUP_PREFIX}{}{BACKUP_SUFFIX}", record.id)
            } else {
                format!("{BACKUP_PREFIX}{}_{attempt:02}{BACKUP_SUFFIX}", record.id)
            };

            match locked_file::create_new(&self.directory.join(&filename), &contents) {
                Ok(()) => return Ok(filename),
                Err(error) if error.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(error) => return Err(StoreError::Write(error)),
            }
        }

        Err(StoreError::Collision(record.id.clone()))
    }

    /// Every stored backup, newest first.
    pub fn list(&self) -> Result<Vec<BackupEntry>, StoreError> {
        let directory = match fs::read_dir(&self.directory) {
            Ok(directory) => directory,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(StoreError::List(error)),
        };

        let mut entries = Vec::new();
        for entry in directory {
            let entry = entry.map_err(StoreError::List)?;

            let Some(filename) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !is_backup_file(&filename) {
                continue;
            }

            // Deleted since the directory was read.
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(error) if error.kind() == io::ErrorKind::NotFound => continue,
                Err(error) => return Err(StoreError::List(error)),
            };
            if !metadata.is_file() {
                continue;
            }

            entries.push(BackupEntry {
                filename,
                size: metadata.len(),
                modified: metadata.modified().map_err(StoreError::List)?,
            });
        }

        // Names embed the receipt time, so reverse name order is newest first.
        entries.sort_by(|a, b| b.filename.cmp(&a.filename));

        Ok(entries)
    }

    /// Totals over every stored backup.
    pub fn summary(&self) -> Result<StoreSummary, StoreError> {
        let entries = self.list()?;

        Ok(StoreSummary {
            backups: entries.len(),
            total_bytes: entries.iter().map(|entry| entry.size).sum(),
            newest: entries.into_iter().next(),
        })
    }

    /// Reads a stored backup.
    pub fn read(&self, filename: &str) -> Result<Value, StoreError> {
        let path = self.checked_path(filename)?;

        let contents = fs::read(path).map_err(StoreError::Read)?;
        Ok(serde_json::from_slice(&contents)?)
    }

    /// Deletes a stored backup. Returns `false` if there was no such backup.
    pub fn delete(&self, filename: &str) -> Result<bool, StoreError> {
        let path = self.checked_path(filename)?;

        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(StoreError::Delete(error)),
        }
    }

    fn checked_path(&self, filename: &str) -> Result<PathBuf, StoreError> {
        if !is_backup_file(filename) {
            return Err(StoreError::InvalidName(filename.to_string()));
        }

        Ok(self.directory.join(filename))
    }
}

/// Returns if `file_name` is a backup file name.
///
/// Only `[a-zA-Z0-9_\-]` is allowed between the prefix and suffix, so separators and `..` can
/// never reach outside the store directory.
pub fn is_backup_file(file_name: &str) -> bool {
    let Some(stem) = file_name
        .strip_prefix(BACKUP_PREFIX)
        .and_then(|rest| rest.strip_suffix(BACKUP_SUFFIX))
    else {
        return false;
    };

    !stem.is_empty()
        && stem
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_')
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("'{0}' is not a valid backup name")]
    InvalidName(String),

    #[error("Every name for a backup received at {0} is taken")]
    Collision(String),

    #[error("Failed to serialize the backup: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write the backup: {0}")]
    Write(#[source] io::Error),

    #[error("Failed to read the backup: {0}")]
    Read(#[source] io::Error),

    #[error("Failed to list backups: {0}")]
    List(#[source] io::Error),

    #[error("Failed to delete the backup: {0}")]
    Delete(#[source] io::Error),
}
