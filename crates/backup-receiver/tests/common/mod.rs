//! # common
//!

#![allow(dead_code)]

use core::{
    net::{IpAddr, Ipv4Addr},
    time::Duration,
};
use std::{fs::File, path::Path, time::SystemTime};

use backup_receiver::{Config, Receiver, Submission};
use chrono::{DateTime, Local, TimeZone};

pub const CLIENT: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10));
pub const SERVER: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));

/// A config storing backups in `directory`.
pub fn test_config(directory: &Path) -> Config {
    Config {
        backup_directory: directory.to_path_buf(),
        ..Config::default()
    }
}

/// A receiver storing backups in `directory`.
pub fn test_receiver(directory: &Path) -> Receiver {
    Receiver::new(test_config(directory))
}

/// A submission from [`CLIENT`] with `body`.
pub fn submission(body: &[u8]) -> Submission {
    Submission {
        client: CLIENT,
        server: Some(SERVER),
        user_agent: Some("backup-client/1.0".to_string()),
        body: body.to_vec(),
    }
}

/// A local time.
pub fn local_time(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(year, month, day, hour, minute, second)
        .earliest()
        .unwrap()
}

/// Set the last modified time of `path` to `age` ago.
pub fn set_age(path: &Path, age: Duration) {
    let modified = SystemTime::now() - age;
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(modified)
        .unwrap();
}

pub fn days(days: u64) -> Duration {
    Duration::from_secs(days * 24 * 60 * 60)
}
