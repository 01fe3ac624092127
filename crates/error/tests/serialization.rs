use serde_json::Value;
use shardline_error::{ErrorCode, ErrorContext, GroupFailure, ShardlineError};

#[test]
fn test_json_serialization() {
    let error = ShardlineError::new(ErrorCode::NoGroupForShard, "no group covers shard value 42")
        .with_context(ErrorContext::Routing {
            shard_value: 42,
            total_groups: 10,
        })
        .with_hint("Flag one group as default");

    let json = error.to_json();
    let v: Value = serde_json::from_str(&json).expect("valid json");

    assert_eq!(v["code"], "SHARD-4001");
    assert_eq!(v["message"], "no group covers shard value 42");
    assert_eq!(v["hint"], "Flag one group as default");
    assert_eq!(v["context"]["type"], "routing");
    assert_eq!(v["context"]["shard_value"], 42);
}

#[test]
fn test_fan_out_serialization() {
    let error = ShardlineError::fan_out(
        "delete",
        vec![GroupFailure::new("g1", "g1_master", "table locked")],
        Some(4),
    );
    let v: Value = serde_json::from_str(&error.to_json()).expect("valid json");

    assert_eq!(v["code"], "SHARD-1004");
    assert_eq!(v["context"]["type"], "fan_out");
    assert_eq!(v["context"]["failures"][0]["group"], "g1");
    assert_eq!(v["context"]["affected_rows"], 4);
}

#[test]
fn test_error_code_parsing() {
    let code: ErrorCode = "SHARD-5002".to_string().try_into().unwrap();
    assert_eq!(code, ErrorCode::QueryTimeout);
}
