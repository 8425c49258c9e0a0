//! End-to-end build/serve pipeline tests: ingest a request tree, answer stat
//! requests, and check the snapshot hand-off preserves every answer.

use serde_json::{json, Value};
use tempfile::TempDir;

use transit_route::formats::{Snapshot, SnapshotFile};
use transit_route::request::{ingest, parse_serve_input, QueryEngine};

fn build_tree(snapshot_path: &str) -> Value {
    json!({
        "base_requests": [
            {"type": "Bus", "name": "1", "stops": ["A", "B", "C"], "is_roundtrip": true},
            {"type": "Bus", "name": "shuttle", "stops": ["A", "D"], "is_roundtrip": false},
            {"type": "Stop", "name": "A", "latitude": 55.574371, "longitude": 37.651700,
             "road_distances": {"B": 1000, "D": 900}},
            {"type": "Stop", "name": "B", "latitude": 55.581065, "longitude": 37.648390,
             "road_distances": {"C": 1000}},
            {"type": "Stop", "name": "C", "latitude": 55.587655, "longitude": 37.645687,
             "road_distances": {"A": 2500}},
            {"type": "Stop", "name": "D", "latitude": 55.592028, "longitude": 37.653656}
        ],
        "routing_settings": {"bus_wait_time": 3, "bus_velocity": 30},
        "serialization_settings": {"file": snapshot_path}
    })
}

fn stat_requests() -> Vec<Value> {
    vec![
        json!({"id": 1, "type": "Bus", "name": "1"}),
        json!({"id": 2, "type": "Bus", "name": "ghost"}),
        json!({"id": 3, "type": "Stop", "name": "A"}),
        json!({"id": 4, "type": "Stop", "name": "nowhere"}),
        json!({"id": 5, "type": "Route", "from": "A", "to": "C"}),
        json!({"id": 6, "type": "Route", "from": "D", "to": "A"}),
        json!({"id": 7, "type": "Route", "from": "A", "to": "A"}),
    ]
}

#[test]
fn test_build_then_answer() {
    let input = ingest(&build_tree("unused.bin")).unwrap();
    let engine = QueryEngine::new(&input.catalogue, input.router);
    let answers = engine.execute(&stat_requests()).unwrap();
    let answers = answers.as_array().unwrap();

    // Roundtrip bus over two 1000 m legs.
    assert_eq!(answers[0]["stop_count"], 3);
    assert_eq!(answers[0]["unique_stop_count"], 3);
    assert_eq!(answers[0]["route_length"].as_f64().unwrap(), 2000.0);
    assert!(answers[0]["curvature"].as_f64().unwrap() > 1.0);

    assert_eq!(answers[1], json!({"request_id": 2, "error_message": "not found"}));

    assert_eq!(answers[2], json!({"request_id": 3, "buses": ["1", "shuttle"]}));
    assert_eq!(answers[3], json!({"request_id": 4, "error_message": "not found"}));

    // Wait 3 min, then ride both spans without transferring.
    assert_eq!(answers[4]["total_time"].as_f64().unwrap(), 7.0);
    assert_eq!(
        answers[4]["items"],
        json!([
            {"type": "Wait", "stop": "A", "time": 3.0},
            {"type": "Bus", "bus": "1", "span_count": 2, "time": 4.0}
        ])
    );

    // The 900 m leg has no reverse override, so the return ride reuses it.
    assert_eq!(answers[5]["total_time"].as_f64().unwrap(), 3.0 + 1.8);

    assert_eq!(answers[6]["total_time"].as_f64().unwrap(), 0.0);
    assert_eq!(answers[6]["items"], json!([]));
}

#[test]
fn test_snapshot_hand_off_preserves_answers() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db.bin");
    let tree = build_tree(path.to_str().unwrap());

    // Build phase.
    let input = ingest(&tree).unwrap();
    let snapshot = Snapshot::capture(&input.catalogue, &input.render, input.router);
    SnapshotFile::write(input.snapshot_file.as_deref().unwrap(), &snapshot).unwrap();

    let direct = QueryEngine::new(&input.catalogue, input.router)
        .execute(&stat_requests())
        .unwrap();

    // Serve phase, from the file alone.
    let serve = parse_serve_input(&json!({
        "serialization_settings": {"file": path.to_str().unwrap()},
        "stat_requests": stat_requests()
    }))
    .unwrap();
    let loaded = SnapshotFile::read(serve.snapshot_file.as_deref().unwrap()).unwrap();
    let (catalogue, _render, router) = loaded.restore().unwrap();
    let served = QueryEngine::new(&catalogue, router)
        .execute(&serve.stat_requests)
        .unwrap();

    assert_eq!(served, direct);
}

#[test]
fn test_corrupt_snapshot_is_refused() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db.bin");

    let input = ingest(&build_tree(path.to_str().unwrap())).unwrap();
    let snapshot = Snapshot::capture(&input.catalogue, &input.render, input.router);
    SnapshotFile::write(&path, &snapshot).unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    bytes[10] ^= 0x01;
    std::fs::write(&path, &bytes).unwrap();

    assert!(SnapshotFile::read(&path).is_err());
}
