//! # Backups receiver
//! The webserver that receives backups from clients.
//!
//! Commands:
//! * `init` writes the default config to `config.toml`.
//! * `list` lists the stored backups, newest first.
//! * `delete <filename>` deletes a stored backup.
//! * `log` prints the end of the activity log.
//! * No command serves until Ctrl-C.
//!

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::{fs, path::PathBuf, time::SystemTime};

use backup_receiver::{ActivityLog, BackupStore, Config, Receiver, format_age, server};
use chrono::{DateTime, Local};
use mimalloc::MiMalloc;
use shared::{Failure, init_logger};
use tracing::{error, info, warn};

/// How many activity log lines `log` prints.
const LOG_LINES: usize = 50;

fn main() {
    let _logger = init_logger().or_log_and_panic("Could not initialize logger");

    let mut args = std::env::args().skip(1);
    let command = args.next();

    // Initialize config if the command is 'init'.
    if command.as_deref() == Some("init") {
        let config = Config::default();
        let contents =
            toml::to_string_pretty(&config).or_log_and_panic("Could not serialize config file");
        fs::write("config.toml", contents).or_log_and_panic("Could not create config file");
        return;
    }

    // Load config
    let config = match Config::load_toml(PathBuf::from("./config.toml")) {
        Ok(config) => config,
        Err(error) => {
            error!("Could not load config: {error}");
            return;
        }
    };

    match command.as_deref() {
        None | Some("serve") => serve(config),
        Some("list") => list(&config),
        Some("delete") => match args.next() {
            Some(filename) => delete(&config, &filename),
            None => error!("Usage: backup-receiver delete <filename>"),
        },
        Some("log") => log(&config),
        Some(other) => error!("Unknown command '{other}', expected init, list, delete or log"),
    }
}

fn serve(config: Config) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .or_log_and_panic("Could not create runtime");

    if let Err(error) = runtime.block_on(server::serve(Receiver::new(config))) {
        error!("Server stopped: {error}");
    }
}

fn list(config: &Config) {
    let store = BackupStore::new(config.backup_directory.clone());
    let entries = match store.list() {
        Ok(entries) => entries,
        Err(error) => {
            error!("Could not list backups: {error}");
            return;
        }
    };

    if entries.is_empty() {
        println!("No backups found.");
        return;
    }

    let now = SystemTime::now();
    for entry in &entries {
        let modified: DateTime<Local> = entry.modified.into();
        println!(
            "{}  {}  {:>10.1} KiB  {}",
            entry.filename,
            modified.format("%Y-%m-%d %H:%M:%S"),
            kibibytes(entry.size),
            format_age(entry.age(now)),
        );
    }

    let summary = match store.summary() {
        Ok(summary) => summary,
        Err(error) => {
            error!("Could not summarize backups: {error}");
            return;
        }
    };
    println!(
        "{} backups, {:.1} MiB total",
        summary.backups,
        kibibytes(summary.total_bytes) / 1024.0
    );
    if let Some(newest) = summary.newest {
        println!("Newest: {} ({} ago)", newest.filename, format_age(newest.age(now)));
    }
}

fn delete(config: &Config, filename: &str) {
    let store = BackupStore::new(config.backup_directory.clone());

    match store.delete(filename) {
        Ok(true) => info!("Deleted {filename}"),
        Ok(false) => warn!("No backup named {filename}"),
        Err(error) => error!("Could not delete {filename}: {error}"),
    }
}

fn log(config: &Config) {
    let activity_log = ActivityLog::new(&config.backup_directory);

    match activity_log.tail(LOG_LINES) {
        Ok(lines) if lines.is_empty() => println!("No log entries found."),
        Ok(lines) => lines.iter().for_each(|line| println!("{line}")),
        Err(error) => error!("Could not read the activity log: {error}"),
    }
}

#[allow(clippy::as_conversions, clippy::cast_precision_loss)]
fn kibibytes(bytes: u64) -> f64 {
    bytes as f64 / 1024.0
}
