//! End-to-end tests over snapshot files.

mod common;

use common::{base_time, regular_events, temp_snapshot};
use occupancy_sensor_pipeline::core::{Splitter, WindowedCount};
use occupancy_sensor_pipeline::{
    Config, Granularity, ModelKind, Occupancy, Pipeline, PipelineError, RawEvent, RunReport,
    SnapshotError,
};
use std::collections::BTreeMap;

fn majority_config() -> Config {
    let mut config = Config::default();
    config.model.kind = ModelKind::Majority;
    config
}

#[test]
fn test_two_houses_48_hours_hourly() {
    let mut events = regular_events("house-a", &["bedroom", "kitchen"], 48, 2);
    events.extend(regular_events("house-b", &["bedroom", "kitchen"], 48, 2));
    let (_dir, path) = temp_snapshot(&events, &[("house-a", "single"), ("house-b", "multiple")]);

    let pipeline = Pipeline::new(majority_config()).unwrap();
    let snapshot = pipeline.load(&path).unwrap();
    let (cleaning, aggregation) = pipeline.windows(&snapshot);
    assert_eq!(cleaning.dropped(), 0);

    let mut per_pair: BTreeMap<(String, String), Vec<&WindowedCount>> = BTreeMap::new();
    for count in &aggregation.counts {
        per_pair
            .entry((count.house_id.clone(), count.room_id.clone()))
            .or_default()
            .push(count);
    }
    assert_eq!(per_pair.len(), 4);
    for series in per_pair.values() {
        assert_eq!(series.len(), 48);
        assert_eq!(series[0].window_start, base_time());
        assert!(series.iter().all(|c| c.event_count == 2));
        assert!(series.iter().all(|c| c.window_length_secs == 3600));
    }

    let report = pipeline.run(&path).unwrap();
    assert_eq!(report.counts.windowed_rows, 4 * 48);
    assert_eq!(report.split.train.len(), 1);
    assert_eq!(report.split.test.len(), 1);
    // One training house cannot be folded
    assert!(report.cross_validation.is_none());

    assert_majority_accuracy(&report, &[("house-a", Occupancy::Single), ("house-b", Occupancy::Multiple)]);
}

#[test]
fn test_majority_accuracy_matches_class_share() {
    let mut events = Vec::new();
    let mut labels = Vec::new();
    let ids: Vec<String> = (0..10).map(|i| format!("h{i:02}")).collect();
    for (i, id) in ids.iter().enumerate() {
        events.extend(regular_events(id, &["hall", "lounge"], 24, 1 + (i as i64 % 3)));
        labels.push((id.as_str(), if i < 7 { "single" } else { "multiple" }));
    }
    let (_dir, path) = temp_snapshot(&events, &labels);

    let mut config = majority_config();
    config.split.stratify = false;
    config.folds = 3;
    let report = Pipeline::new(config).unwrap().run(&path).unwrap();

    let truth: Vec<(&str, Occupancy)> = labels
        .iter()
        .map(|(id, l)| (*id, l.parse().unwrap()))
        .collect();
    assert_majority_accuracy(&report, &truth);
    assert_eq!(report.cross_validation.as_ref().map(|cv| cv.folds.len()), Some(3));
}

/// The majority baseline scores exactly the share of test houses carrying
/// the training majority label.
fn assert_majority_accuracy(report: &RunReport, truth: &[(&str, Occupancy)]) {
    let label_of = |id: &str| truth.iter().find(|(h, _)| *h == id).map(|(_, l)| *l).unwrap();

    let train: Vec<Occupancy> = report.split.train.iter().map(|id| label_of(id)).collect();
    let multiple = train.iter().filter(|l| **l == Occupancy::Multiple).count();
    let majority = if train.len() - multiple > multiple {
        Occupancy::Single
    } else {
        Occupancy::Multiple
    };

    let test: Vec<Occupancy> = report.split.test.iter().map(|id| label_of(id)).collect();
    let expected = test.iter().filter(|l| **l == majority).count() as f64 / test.len() as f64;

    assert_eq!(report.test.classifier, "majority");
    assert!((report.accuracy() - expected).abs() < 1e-12);
    assert!(report.test.predictions.iter().all(|p| p.predicted == majority));
}

#[test]
fn test_runs_are_reproducible() {
    let mut events = Vec::new();
    let mut labels = Vec::new();
    let ids: Vec<String> = (0..8).map(|i| format!("home-{i}")).collect();
    for (i, id) in ids.iter().enumerate() {
        events.extend(regular_events(id, &["bed", "bath"], 12, 1 + i as i64 % 4));
        labels.push((id.as_str(), if i % 2 == 0 { "single" } else { "multiple" }));
    }
    let (_dir, path) = temp_snapshot(&events, &labels);

    let pipeline = Pipeline::new(Config::default()).unwrap();
    let first = pipeline.run(&path).unwrap();
    let second = pipeline.run(&path).unwrap();

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.split, second.split);
    assert_eq!(first.test.predictions, second.test.predictions);
    assert_eq!(first.cross_validation, second.cross_validation);
    assert!(first.split.is_disjoint());

    // Same partition as the splitter gives directly for the same ids
    let direct = Splitter::new(0.3, 42).unwrap();
    let mut unstratified = Config::default();
    unstratified.split.stratify = false;
    let report = Pipeline::new(unstratified).unwrap().run(&path).unwrap();
    assert_eq!(report.split, direct.split(&ids).unwrap());
}

#[test]
fn test_dirty_rows_and_exclusions_are_reported() {
    let mut events = regular_events("h1", &["kitchen"], 6, 1);
    events.extend(regular_events("h2", &["kitchen"], 6, 3));
    events.extend(regular_events("h3", &["kitchen"], 6, 1));
    // Exact duplicate, bad timestamp, bad state, missing room
    events.push(events[0].clone());
    events.push(RawEvent::new("h1", "kitchen", "k", "yesterday", "on"));
    events.push(RawEvent::new("h1", "kitchen", "k", "2021-03-01T02:00:00Z", "maybe"));
    events.push(RawEvent {
        room_id: None,
        ..RawEvent::new("h1", "x", "k", "2021-03-01T02:00:00Z", "on")
    });
    let (_dir, path) = temp_snapshot(
        &events,
        &[("h1", "single"), ("h2", "multiple"), ("h4", "single"), ("h5", "crowded")],
    );

    let mut config = majority_config();
    config.granularity = Granularity::HalfHourly;
    let report = Pipeline::new(config).unwrap().run(&path).unwrap();

    assert_eq!(report.counts.cleaning.duplicates, 1);
    assert_eq!(report.counts.cleaning.invalid_timestamp, 1);
    assert_eq!(report.counts.cleaning.invalid_state, 1);
    assert_eq!(report.counts.cleaning.missing_field, 1);
    assert_eq!(report.counts.skipped_labels, 1);
    assert_eq!(report.counts.houses_used, 2);
    // h3 has events but no label, h4 a label but no events
    assert_eq!(report.exclusions.excluded.len(), 2);
    // h1 and h3 end in the 05:00 window, h2 runs into 05:30
    assert_eq!(report.counts.windowed_rows, 11 + 12 + 11);
}

#[test]
fn test_report_written_as_json() {
    let mut events = regular_events("a", &["r1", "r2"], 10, 2);
    events.extend(regular_events("b", &["r1"], 10, 6));
    let (dir, path) = temp_snapshot(&events, &[("a", "single"), ("b", "multiple")]);

    let report = Pipeline::new(Config::default()).unwrap().run(&path).unwrap();
    let out = dir.path().join("out").join("report.json");
    report.save(&out).unwrap();

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(json["run_id"], report.run_id.to_string());
    assert_eq!(json["settings"]["granularity"], "hourly");
    assert_eq!(json["rooms"], serde_json::json!(["r1", "r2"]));
}

#[test]
fn test_run_to_writes_report_or_fails_with_path() {
    let mut events = regular_events("a", &["r1"], 10, 2);
    events.extend(regular_events("b", &["r1"], 10, 6));
    let (dir, path) = temp_snapshot(&events, &[("a", "single"), ("b", "multiple")]);
    let pipeline = Pipeline::new(Config::default()).unwrap();

    let out = dir.path().join("reports").join("run.json");
    let report = pipeline.run_to(&path, &out).unwrap();
    assert_eq!(RunReport::load(&out).unwrap().run_id, report.run_id);

    // A regular file where the parent directory should be
    let blocked = dir.path().join("blocker");
    std::fs::write(&blocked, "x").unwrap();
    let target = blocked.join("run.json");
    let err = pipeline.run_to(&path, &target).unwrap_err();
    match err {
        PipelineError::Report { path, .. } => assert_eq!(path, target),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_missing_snapshot_fails_before_processing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.db");

    let err = Pipeline::new(Config::default()).unwrap().run(&path).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Snapshot(SnapshotError::NotFound(_))
    ));
    assert!(!path.exists());
}
