//! Tests for ingesting backups
//!

use core::net::{IpAddr, Ipv4Addr};
use std::{fs, sync::Arc, thread};

use backup_receiver::{Context, IngestError, PayloadError, Receiver};
use common::{CLIENT, local_time, submission, test_config, test_receiver};
use serde_json::json;
use shared::test::init_test_logger;

mod common;

const BODY: &[u8] = br#"{"timestamp":"2024-01-01T00:00:00Z","data":{"k":1}}"#;

#[test]
fn average_client() {
    let _logger = init_test_logger();
    let directory = tempfile::tempdir().unwrap();
    let receiver = test_receiver(directory.path());

    let received_at = local_time(2024, 1, 1, 0, 0, 0);
    let mut context = Context::for_peer(CLIENT);
    let accepted = receiver
        .ingest_at(&mut context, &submission(BODY), received_at)
        .unwrap();

    assert_eq!(accepted.filename, "backup_2024-01-01_00-00-00.json");
    assert_eq!(accepted.size, u64::try_from(BODY.len()).unwrap());
    assert_eq!(context.backup.as_deref(), Some(accepted.filename.as_str()));

    let stored = receiver.store.read(&accepted.filename).unwrap();
    assert_eq!(stored["timestamp"], json!("2024-01-01T00:00:00Z"));
    assert_eq!(stored["data"], json!({ "k": 1 }));
    assert_eq!(stored["server_metadata"]["backup_size"], json!(BODY.len()));
    assert_eq!(stored["server_metadata"]["user_agent"], json!("backup-client/1.0"));

    assert_eq!(
        receiver.rate_limiter.check(received_at.date_naive()).unwrap(),
        1
    );

    let log = receiver.activity_log.tail(50).unwrap();
    assert_eq!(log.len(), 1);
    assert!(log[0].contains("Backup saved: backup_2024-01-01_00-00-00.json"));
    assert!(log[0].contains(&format!("Size: {} bytes", BODY.len())));
    assert!(log[0].contains(&format!("Client: {CLIENT}")));

    let response = accepted.response();
    assert!(response.success);
    assert_eq!(response.filename, accepted.filename);
    assert_eq!(response.size, accepted.size);
}

#[test]
fn creates_the_backup_directory() {
    let directory = tempfile::tempdir().unwrap();
    let receiver = test_receiver(&directory.path().join("nested").join("backups"));

    let mut context = Context::default();
    receiver.ingest(&mut context, &submission(BODY)).unwrap();

    assert_eq!(receiver.store.list().unwrap().len(), 1);
}

#[test]
fn backup_directory_is_a_file() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("backups");
    fs::write(&path, "not a directory").unwrap();
    let receiver = test_receiver(&path);

    let mut context = Context::default();
    let error = receiver.ingest(&mut context, &submission(BODY)).unwrap_err();

    assert!(matches!(error, IngestError::DirectoryUnavailable(_)), "{error:?}");
    assert_eq!(error.status_code(), 500);
}

#[test]
fn rejections_are_not_counted() {
    let directory = tempfile::tempdir().unwrap();
    let receiver = test_receiver(directory.path());
    let received_at = local_time(2024, 1, 1, 12, 0, 0);

    let cases: [(&[u8], u16); 3] = [
        (b"", 400),
        (b"not json", 400),
        (br#"{"timestamp":"x"}"#, 400),
    ];

    for (body, status) in cases {
        let mut context = Context::default();
        let error = receiver
            .ingest_at(&mut context, &submission(body), received_at)
            .unwrap_err();
        assert_eq!(error.status_code(), status, "{error:?}");
    }

    assert_eq!(
        receiver.rate_limiter.check(received_at.date_naive()).unwrap(),
        0
    );
    assert!(receiver.store.list().unwrap().is_empty());
}

#[test]
fn rejection_kinds() {
    let directory = tempfile::tempdir().unwrap();
    let receiver = test_receiver(directory.path());

    let mut context = Context::default();
    let empty = receiver.ingest(&mut context, &submission(b"")).unwrap_err();
    assert!(matches!(empty, IngestError::Payload(PayloadError::EmptyBody)));
    assert_eq!(empty.client_message(), "No data received.");

    let malformed = receiver
        .ingest(&mut context, &submission(b"not json"))
        .unwrap_err();
    assert!(matches!(
        malformed,
        IngestError::Payload(PayloadError::MalformedJson(_))
    ));
    assert_eq!(malformed.client_message(), "Invalid JSON data.");

    let missing = receiver
        .ingest(&mut context, &submission(br#"{"timestamp":"x"}"#))
        .unwrap_err();
    assert!(matches!(missing, IngestError::Payload(ref error) if error.is_schema_violation()));
    assert_eq!(
        missing.client_message(),
        "Invalid backup structure. Missing timestamp or data."
    );
}

#[test]
fn payload_size_limit() {
    let directory = tempfile::tempdir().unwrap();
    let mut config = test_config(directory.path());
    config.limits.maximum_payload_bytes = u64::try_from(BODY.len()).unwrap();
    let receiver = Receiver::new(config);

    let mut context = Context::default();
    receiver
        .ingest_at(&mut context, &submission(BODY), local_time(2024, 1, 1, 0, 0, 0))
        .unwrap();

    let mut larger = BODY.to_vec();
    larger.push(b' ');
    let error = receiver
        .ingest_at(&mut context, &submission(&larger), local_time(2024, 1, 1, 0, 0, 1))
        .unwrap_err();

    assert!(matches!(error, IngestError::Payload(PayloadError::TooLarge { .. })));
    assert_eq!(error.status_code(), 413);
}

#[test]
fn daily_limit() {
    let directory = tempfile::tempdir().unwrap();
    let receiver = test_receiver(directory.path());
    let day = local_time(2024, 1, 1, 9, 0, 0);
    fs::write(receiver.rate_limiter.counter_path(day.date_naive()), "49").unwrap();

    // The 50th backup of the day is accepted.
    let mut context = Context::default();
    receiver
        .ingest_at(&mut context, &submission(BODY), day)
        .unwrap();

    // The 51st is rejected.
    let error = receiver
        .ingest_at(&mut context, &submission(BODY), local_time(2024, 1, 1, 9, 0, 1))
        .unwrap_err();
    assert!(matches!(error, IngestError::LimitExceeded(50)), "{error:?}");
    assert_eq!(error.status_code(), 429);
    assert_eq!(error.client_message(), "Daily backup limit exceeded.");

    // The next day starts over.
    let next_day = local_time(2024, 1, 2, 0, 0, 0);
    let accepted = receiver
        .ingest_at(&mut context, &submission(BODY), next_day)
        .unwrap();
    assert_eq!(accepted.filename, "backup_2024-01-02_00-00-00.json");
    assert_eq!(
        receiver.rate_limiter.check(next_day.date_naive()).unwrap(),
        1
    );
}

#[test]
fn allowed_addresses() {
    let directory = tempfile::tempdir().unwrap();
    let mut config = test_config(directory.path());
    config.allowed_addresses = vec![IpAddr::V4(Ipv4Addr::LOCALHOST)];
    let receiver = Receiver::new(config);

    let mut context = Context::default();
    let error = receiver.ingest(&mut context, &submission(BODY)).unwrap_err();
    assert!(matches!(error, IngestError::OriginDenied(address) if address == CLIENT));
    assert_eq!(error.status_code(), 403);

    let mut allowed = submission(BODY);
    allowed.client = IpAddr::V4(Ipv4Addr::LOCALHOST);
    receiver.ingest(&mut context, &allowed).unwrap();
}

#[test]
fn concurrent_clients() {
    let directory = tempfile::tempdir().unwrap();
    let receiver = Arc::new(test_receiver(directory.path()));
    let received_at = local_time(2024, 1, 1, 0, 0, 0);

    // Every backup lands in the same second.
    let threads: Vec<_> = (0..10)
        .map(|_| {
            let receiver = Arc::clone(&receiver);
            thread::spawn(move || {
                let mut context = Context::default();
                receiver
                    .ingest_at(&mut context, &submission(BODY), received_at)
                    .unwrap()
                    .filename
            })
        })
        .collect();

    let mut filenames: Vec<_> = threads
        .into_iter()
        .map(|thread| thread.join().unwrap())
        .collect();
    filenames.sort();
    filenames.dedup();

    assert_eq!(filenames.len(), 10);
    assert_eq!(receiver.store.list().unwrap().len(), 10);
    assert_eq!(
        receiver.rate_limiter.check(received_at.date_naive()).unwrap(),
        10
    );
    assert_eq!(receiver.activity_log.tail(50).unwrap().len(), 10);
}

#[test]
fn concurrent_clients_near_the_limit() {
    let directory = tempfile::tempdir().unwrap();
    let receiver = Arc::new(test_receiver(directory.path()));
    let received_at = local_time(2024, 1, 1, 0, 0, 0);
    let date = received_at.date_naive();
    fs::write(receiver.rate_limiter.counter_path(date), "45").unwrap();

    let batch = 10;
    let threads: Vec<_> = (0..batch)
        .map(|_| {
            let receiver = Arc::clone(&receiver);
            thread::spawn(move || {
                let mut context = Context::default();
                receiver
                    .ingest_at(&mut context, &submission(BODY), received_at)
                    .is_ok()
            })
        })
        .collect();

    let accepted = threads
        .into_iter()
        .map(|thread| thread.join().unwrap())
        .filter(|accepted| *accepted)
        .count();

    // Every accepted backup is counted, and the limit is overshot by at most the batch.
    let count = receiver.rate_limiter.check(date).unwrap();
    assert_eq!(count, 45 + u64::try_from(accepted).unwrap());
    assert!(accepted >= 5);
    assert!(count <= 50 + batch);
}

#[test]
fn sweep_removes_expired_backups() {
    let directory = tempfile::tempdir().unwrap();
    let receiver = test_receiver(directory.path());

    let mut context = Context::default();
    let old = receiver
        .ingest_at(&mut context, &submission(BODY), local_time(2024, 1, 1, 0, 0, 0))
        .unwrap();
    let recent = receiver
        .ingest_at(&mut context, &submission(BODY), local_time(2024, 1, 2, 0, 0, 0))
        .unwrap();

    common::set_age(&directory.path().join(&old.filename), common::days(31));
    common::set_age(&directory.path().join(&recent.filename), common::days(29));

    let report = receiver.sweep(std::time::SystemTime::now());
    assert_eq!(report.backups, 1);

    let names: Vec<_> = receiver
        .store
        .list()
        .unwrap()
        .into_iter()
        .map(|entry| entry.filename)
        .collect();
    assert_eq!(names, [recent.filename]);
}
