//! Shared helpers for building snapshot files.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use occupancy_sensor_pipeline::RawEvent;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 3, 1, 0, 0, 0).unwrap()
}

/// Write an events/labels snapshot at `path`.
pub fn write_snapshot(path: &Path, events: &[RawEvent], labels: &[(&str, &str)]) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE events (house_id TEXT, room_id TEXT, sensor_id TEXT, timestamp TEXT, state TEXT);
         CREATE TABLE labels (house_id TEXT, label TEXT);",
    )
    .unwrap();

    let mut insert = conn
        .prepare("INSERT INTO events VALUES (?1, ?2, ?3, ?4, ?5)")
        .unwrap();
    for e in events {
        insert
            .execute(params![e.house_id, e.room_id, e.sensor_id, e.timestamp, e.state])
            .unwrap();
    }

    for (house_id, label) in labels {
        conn.execute("INSERT INTO labels VALUES (?1, ?2)", params![house_id, label])
            .unwrap();
    }
}

/// Events at a fixed number per hour in every room, starting at [`base_time`].
pub fn regular_events(house_id: &str, rooms: &[&str], hours: i64, per_hour: i64) -> Vec<RawEvent> {
    let step = 60 / per_hour;
    let mut events = Vec::new();
    for room in rooms {
        for hour in 0..hours {
            for i in 0..per_hour {
                let ts = base_time() + Duration::hours(hour) + Duration::minutes(i * step + 1);
                events.push(RawEvent::new(
                    house_id,
                    room,
                    &format!("{room}-motion"),
                    &ts.to_rfc3339(),
                    "on",
                ));
            }
        }
    }
    events
}

/// A snapshot inside a fresh temporary directory.
pub fn temp_snapshot(events: &[RawEvent], labels: &[(&str, &str)]) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.db");
    write_snapshot(&path, events, labels);
    (dir, path)
}
