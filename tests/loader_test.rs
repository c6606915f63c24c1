//! Snapshot loading from files on disk.

mod common;

use occupancy_sensor_pipeline::loader::SnapshotSchema;
use occupancy_sensor_pipeline::{Config, Occupancy, Pipeline, SnapshotError, SnapshotLoader};
use rusqlite::Connection;

#[test]
fn test_missing_file_is_not_created() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nope.sqlite");

    let err = SnapshotLoader::default().load(&path).unwrap_err();
    assert!(matches!(err, SnapshotError::NotFound(_)));
    assert!(!path.exists());
}

#[test]
fn test_missing_labels_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.db");
    Connection::open(&path)
        .unwrap()
        .execute_batch(
            "CREATE TABLE events (house_id TEXT, room_id TEXT, sensor_id TEXT, timestamp TEXT, state TEXT);",
        )
        .unwrap();

    let err = SnapshotLoader::default().load(&path).unwrap_err();
    assert!(matches!(err, SnapshotError::MissingTable(ref t) if t == "labels"));
}

#[test]
fn test_missing_state_column() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("old.db");
    Connection::open(&path)
        .unwrap()
        .execute_batch(
            "CREATE TABLE events (house_id TEXT, room_id TEXT, sensor_id TEXT, timestamp TEXT);
             CREATE TABLE labels (house_id TEXT, label TEXT);",
        )
        .unwrap();

    let err = SnapshotLoader::default().load(&path).unwrap_err();
    assert!(matches!(
        err,
        SnapshotError::MissingColumn { ref column, .. } if column == "state"
    ));
}

#[test]
fn test_not_a_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.db");
    std::fs::write(&path, "this is not sqlite, just some text that is long enough").unwrap();

    assert!(SnapshotLoader::default().load(&path).is_err());
}

#[test]
fn test_custom_tables_and_numeric_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.db");
    Connection::open(&path)
        .unwrap()
        .execute_batch(
            "CREATE TABLE motion (house_id TEXT, room_id TEXT, sensor_id TEXT, timestamp INTEGER, state INTEGER);
             CREATE TABLE occupancy (house_id TEXT, label INTEGER);
             INSERT INTO motion VALUES ('h1', 'hall', 's1', 1614556800, 1);
             INSERT INTO motion VALUES ('h1', 'hall', 's1', 1614556800, 1);
             INSERT INTO motion VALUES ('h1', 'hall', 's1', 1614560400, 0);
             INSERT INTO occupancy VALUES ('h1', 1);
             INSERT INTO occupancy VALUES ('h1', 1);",
        )
        .unwrap();

    let schema = SnapshotSchema {
        events_table: "motion".to_string(),
        labels_table: "occupancy".to_string(),
    };
    let snapshot = SnapshotLoader::new(schema.clone()).load(&path).unwrap();
    assert_eq!(snapshot.events.len(), 3);
    assert_eq!(snapshot.labels.len(), 1);
    assert_eq!(snapshot.labels[0].label, Occupancy::Single);

    let mut config = Config::default();
    config.schema = schema;
    let pipeline = Pipeline::new(config).unwrap();
    let prepared = pipeline.prepare(&snapshot).unwrap();
    assert_eq!(prepared.cleaning.duplicates, 1);
    // 00:00 and 01:00 on 2021-03-01
    let counts: Vec<u64> = prepared
        .aggregation
        .counts
        .iter()
        .map(|c| c.event_count)
        .collect();
    assert_eq!(counts, vec![1, 1]);
    assert_eq!(prepared.aggregation.counts[0].window_start, common::base_time());
}
