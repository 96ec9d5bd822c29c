use core::time::Duration;
use std::{fs, io::ErrorKind, path::Path, time::SystemTime};

use tracing::{debug, error, info, warn};

use crate::{Context, rate_limiter::is_counter_file, store::is_backup_file};

/// What a sweep removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Backups removed.
    pub backups: usize,
    /// Daily counters removed.
    pub counters: usize,
}

/// Remove every backup and daily counter in `directory` last modified more than `maximum_age`
/// before `now`.
///
/// Never fails, files that cannot be inspected or removed are logged and skipped.
pub fn cleanup(
    context: &mut Context,
    directory: &Path,
    maximum_age: Duration,
    now: SystemTime,
) -> SweepReport {
    context.current_context = "Cleanup";

    let mut report = SweepReport::default();

    let Some(cutoff) = now.checked_sub(maximum_age) else {
        return report;
    };

    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(error) => {
            if error.kind() == ErrorKind::NotFound {
                debug!("{context}Backup directory not found: {directory:?}");
            } else {
                error!("{context}Could not read backup directory {directory:?}: {error}");
            }
            return report;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!("{context}Could not read entry: {error}");
                continue;
            }
        };
        let path = entry.path();

        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };

        let is_backup = is_backup_file(file_name);
        if !is_backup && !is_counter_file(file_name) {
            continue;
        }

        let modified = match entry.metadata().and_then(|metadata| metadata.modified()) {
            Ok(modified) => modified,
            Err(error) => {
                if error.kind() != ErrorKind::NotFound {
                    warn!("{context}Could not get entry {path:?} metadata: {error}");
                }
                continue;
            }
        };

        if modified >= cutoff {
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) if is_backup => report.backups += 1,
            Ok(()) => report.counters += 1,
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => error!("{context}Could not remove file {path:?}: {error}"),
        }
    }

    if report != SweepReport::default() {
        info!(
            "{context}Removed {} expired backups and {} expired counters",
            report.backups, report.counters
        );
    }

    report
}
