//! Schema validation tests for TrackerSnapshot.

use omni_conversation::{SnapshotError, TrackerSnapshot, tracker_snapshot_schema};

const VALID: &str = r#"{
    "execution_count": 3,
    "last_execution_time": "2024-05-01T10:00:02Z",
    "conversation_history": [
        {"timestamp": "2024-05-01T10:00:01Z", "message": "b", "stage": "THINK", "sequence_number": 2, "metadata_snapshot": {}},
        {"timestamp": "2024-05-01T10:00:02Z", "message": "c", "stage": "THINK", "sequence_number": 3, "metadata_snapshot": {"k": 1}}
    ],
    "context_memory": {"message_lengths": [1, 1, 1], "stage_transitions": ["THINK"]}
}"#;

#[test]
fn test_snapshot_valid_document() {
    let snapshot = TrackerSnapshot::from_json(VALID).expect("valid snapshot");
    assert_eq!(snapshot.execution_count, 3);
    assert_eq!(snapshot.conversation_history.len(), 2);
    assert_eq!(snapshot.context_memory.message_lengths, vec![1, 1, 1]);
}

#[test]
fn test_snapshot_roundtrip_preserves_document() {
    let snapshot = TrackerSnapshot::from_json(VALID).expect("valid snapshot");
    let json = snapshot.to_json().expect("encode");
    let again = TrackerSnapshot::from_json(&json).expect("decode");
    assert_eq!(snapshot, again);
    assert!(!json.contains("context_switches"), "empty sequences are omitted");
}

#[test]
fn test_snapshot_empty_json_fails() {
    assert!(matches!(
        TrackerSnapshot::from_json(""),
        Err(SnapshotError::Validation(_))
    ));
    assert!(TrackerSnapshot::from_json("   ").is_err());
}

#[test]
fn test_snapshot_invalid_json_fails() {
    assert!(matches!(
        TrackerSnapshot::from_json("{\"execution_count\": \"three\"}"),
        Err(SnapshotError::InvalidJson(_))
    ));
}

#[test]
fn test_snapshot_sequence_must_increase() {
    let document = r#"{"execution_count": 5, "conversation_history": [
        {"timestamp": "2024-05-01T10:00:01Z", "message": "a", "stage": "THINK", "sequence_number": 4},
        {"timestamp": "2024-05-01T10:00:02Z", "message": "b", "stage": "THINK", "sequence_number": 4}
    ]}"#;
    assert!(matches!(
        TrackerSnapshot::from_json(document),
        Err(SnapshotError::Validation(_))
    ));
}

#[test]
fn test_snapshot_sequence_bounded_by_execution_count() {
    let document = r#"{"execution_count": 1, "conversation_history": [
        {"timestamp": "2024-05-01T10:00:01Z", "message": "a", "stage": "THINK", "sequence_number": 2}
    ]}"#;
    assert!(TrackerSnapshot::from_json(document).is_err());
}

#[test]
fn test_schema_describes_sink_document() {
    let schema = tracker_snapshot_schema();
    let properties = schema["properties"].as_object().expect("properties");
    for key in [
        "execution_count",
        "last_execution_time",
        "conversation_history",
        "context_memory",
    ] {
        assert!(properties.contains_key(key), "missing {key}");
    }
}
