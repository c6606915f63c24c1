//! SQLite snapshot reader.
//!
//! The snapshot is opened read-only and must contain an events table and a
//! labels table. Column presence is checked up front so a malformed snapshot
//! fails before any processing starts.

use crate::loader::types::{Occupancy, OccupancyLabel, RawEvent};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Columns the events table must provide.
pub const EVENT_COLUMNS: [&str; 5] = ["house_id", "room_id", "sensor_id", "timestamp", "state"];

/// Columns the labels table must provide.
pub const LABEL_COLUMNS: [&str; 2] = ["house_id", "label"];

/// Errors raised while reading a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot not found: {0}")]
    NotFound(PathBuf),

    #[error("could not open snapshot {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("invalid table name '{0}'")]
    InvalidTableName(String),

    #[error("snapshot is missing table '{0}'")]
    MissingTable(String),

    #[error("table '{table}' is missing column '{column}'")]
    MissingColumn { table: String, column: String },

    #[error("conflicting labels for house '{house_id}': {first} vs {second}")]
    LabelConflict {
        house_id: String,
        first: Occupancy,
        second: Occupancy,
    },

    #[error("query failed: {0}")]
    Query(#[from] rusqlite::Error),
}

/// Table names inside the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotSchema {
    pub events_table: String,
    pub labels_table: String,
}

impl Default for SnapshotSchema {
    fn default() -> Self {
        Self {
            events_table: "events".to_string(),
            labels_table: "labels".to_string(),
        }
    }
}

/// Everything read from a snapshot.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub events: Vec<RawEvent>,
    pub labels: Vec<OccupancyLabel>,
    /// Label rows that could not be interpreted (null id, unknown label text).
    pub skipped_labels: usize,
}

/// Reads raw events and labels from a SQLite snapshot.
#[derive(Debug, Clone, Default)]
pub struct SnapshotLoader {
    schema: SnapshotSchema,
}

impl SnapshotLoader {
    pub fn new(schema: SnapshotSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &SnapshotSchema {
        &self.schema
    }

    /// Load a snapshot file.
    ///
    /// The existence check happens before opening, so a wrong path never
    /// creates an empty database.
    pub fn load(&self, path: &Path) -> Result<Snapshot, SnapshotError> {
        if !path.is_file() {
            return Err(SnapshotError::NotFound(path.to_path_buf()));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|source| SnapshotError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        info!(path = %path.display(), "opened sensor snapshot");
        self.load_from_connection(&conn)
    }

    /// Load from an already open connection.
    pub fn load_from_connection(&self, conn: &Connection) -> Result<Snapshot, SnapshotError> {
        let events_table = validate_identifier(&self.schema.events_table)?;
        let labels_table = validate_identifier(&self.schema.labels_table)?;

        require_columns(conn, events_table, &EVENT_COLUMNS)?;
        require_columns(conn, labels_table, &LABEL_COLUMNS)?;

        let events = read_events(conn, events_table)?;
        let (labels, skipped_labels) = read_labels(conn, labels_table)?;

        info!(
            events = events.len(),
            labels = labels.len(),
            skipped_labels,
            "snapshot loaded"
        );

        Ok(Snapshot {
            events,
            labels,
            skipped_labels,
        })
    }
}

/// Table names are interpolated into SQL, so only plain identifiers are allowed.
fn validate_identifier(name: &str) -> Result<&str, SnapshotError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());

    if valid {
        Ok(name)
    } else {
        Err(SnapshotError::InvalidTableName(name.to_string()))
    }
}

fn require_columns(conn: &Connection, table: &str, required: &[&str]) -> Result<(), SnapshotError> {
    let exists: i64 = conn.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
        params![table],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Err(SnapshotError::MissingTable(table.to_string()));
    }

    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{table}\")"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;

    for column in required {
        if !columns.iter().any(|c| c.eq_ignore_ascii_case(column)) {
            return Err(SnapshotError::MissingColumn {
                table: table.to_string(),
                column: column.to_string(),
            });
        }
    }

    debug!(table, columns = columns.len(), "table schema verified");
    Ok(())
}

fn read_events(conn: &Connection, table: &str) -> Result<Vec<RawEvent>, SnapshotError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT \"house_id\", \"room_id\", \"sensor_id\", \"timestamp\", \"state\" FROM \"{table}\""
    ))?;

    let events = stmt
        .query_map([], |row| {
            Ok(RawEvent {
                house_id: value_to_text(row.get(0)?),
                room_id: value_to_text(row.get(1)?),
                sensor_id: value_to_text(row.get(2)?),
                timestamp: value_to_text(row.get(3)?),
                state: value_to_text(row.get(4)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

fn read_labels(
    conn: &Connection,
    table: &str,
) -> Result<(Vec<OccupancyLabel>, usize), SnapshotError> {
    let mut stmt = conn.prepare(&format!("SELECT \"house_id\", \"label\" FROM \"{table}\""))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((value_to_text(row.get(0)?), value_to_text(row.get(1)?)))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut labels: BTreeMap<String, Occupancy> = BTreeMap::new();
    let mut skipped = 0;

    for (house_id, label) in rows {
        let (Some(house_id), Some(label)) = (house_id, label) else {
            skipped += 1;
            continue;
        };

        let occupancy = match label.parse::<Occupancy>() {
            Ok(occupancy) => occupancy,
            Err(e) => {
                warn!(house_id = %house_id, "skipping label row: {e}");
                skipped += 1;
                continue;
            }
        };

        match labels.get(&house_id) {
            Some(&existing) if existing != occupancy => {
                return Err(SnapshotError::LabelConflict {
                    house_id,
                    first: existing,
                    second: occupancy,
                });
            }
            Some(_) => {}
            None => {
                labels.insert(house_id, occupancy);
            }
        }
    }

    let labels = labels
        .into_iter()
        .map(|(house_id, label)| OccupancyLabel { house_id, label })
        .collect();

    Ok((labels, skipped))
}

/// SQLite is dynamically typed; normalise every cell to optional text.
fn value_to_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(r) => Some(r.to_string()),
        Value::Text(s) => Some(s),
        Value::Blob(b) => Some(String::from_utf8_lossy(&b).into_owned()),
    }
}
