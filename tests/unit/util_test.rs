//! Tests for shared utilities

use std::collections::HashMap;
use std::time::{Duration, UNIX_EPOCH};

use sandbox_orchestrator::util::{now_ms, round_to_millis, to_ms, Attribute, SandboxId, TaskId};

#[test]
fn test_clock_helpers() {
    let t = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
    assert_eq!(to_ms(t), 1_700_000_000_123);
    assert!(now_ms() > 1_700_000_000_000);
    assert_eq!(round_to_millis(t), t);
}

#[test]
fn test_ids_borrow_as_str() {
    let mut map = HashMap::new();
    map.insert(SandboxId::from("sbx-1"), 1);
    assert_eq!(map.get("sbx-1"), Some(&1));

    let id = TaskId::new(String::from("task-7"));
    assert_eq!(id.as_str(), "task-7");
    assert_eq!(id.to_string(), "task-7");
    assert_eq!(serde_json::to_string(&id).unwrap(), "\"task-7\"");
}

#[test]
fn test_attribute_formats_value() {
    let attr = Attribute::new("instance.id", SandboxId::from("sbx-9"));
    assert_eq!(attr.key, "instance.id");
    assert_eq!(attr.value, "sbx-9");
}
