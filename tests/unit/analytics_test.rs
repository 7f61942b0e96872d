//! Tests for analytics events

use sandbox_orchestrator::core::{
    build_analytics_event, AnalyticsSink, InMemoryAnalyticsSink, CREATED_INSTANCE,
};
use sandbox_orchestrator::util::TeamId;

#[test]
fn test_build_event_sets_fields() {
    let event = build_analytics_event(
        TeamId::from("T1"),
        CREATED_INSTANCE,
        [("environment", "env-123"), ("alias", "")],
    );
    assert_eq!(event.name, "created_instance");
    assert_eq!(event.team_id, TeamId::from("T1"));
    assert_eq!(event.properties.len(), 2);
    assert_eq!(event.properties["alias"], "");
    assert!(!event.event_id.is_empty());
    assert!(event.created_at_ms > 0);
}

#[test]
fn test_event_ids_are_unique() {
    let a = build_analytics_event(TeamId::from("T1"), "x", Vec::<(String, String)>::new());
    let b = build_analytics_event(TeamId::from("T1"), "x", Vec::<(String, String)>::new());
    assert_ne!(a.event_id, b.event_id);
}

#[test]
fn test_in_memory_sink_drops_oldest() {
    let sink = InMemoryAnalyticsSink::new(2);
    for name in ["first", "second", "third"] {
        sink.record(build_analytics_event(
            TeamId::from("T1"),
            name,
            Vec::<(String, String)>::new(),
        ));
    }
    let names: Vec<_> = sink.events().into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["second", "third"]);
}
