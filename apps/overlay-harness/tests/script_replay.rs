use overlay_harness::script::{parse_script, run_script, ScriptStep, VisitorAction};
use overlay_proto::{AckOutcome, AckRecord, TOPIC_OVERLAY_ACK, TOPIC_REQUEST_TOUR};
use overlay_sync::SessionConfig;

const SHOWING: &str = include_str!("../scripts/showing.jsonl");

#[test]
fn parses_every_step_kind_and_skips_comments() {
    let steps = parse_script(SHOWING).expect("script parses");
    assert_eq!(steps.len(), 7);
    assert!(matches!(steps[0], ScriptStep::Lifecycle { .. }));
    assert!(matches!(steps[1], ScriptStep::Message { .. }));
    assert!(matches!(
        steps[3],
        ScriptStep::Visitor {
            visitor: VisitorAction::RequestTour(_)
        }
    ));
}

#[test]
fn reports_line_numbers_for_bad_steps() {
    let err = parse_script("{\"event\": \"connected\"}\n\nnot json\n").expect_err("bad line");
    assert_eq!(err.line, 3);
}

#[test]
fn replays_a_showing_end_to_end() {
    let steps = parse_script(SHOWING).expect("script parses");
    let report = run_script(&steps, SessionConfig::default());

    assert_eq!(report.dropped, 0);
    assert_eq!(report.state.menu_items.len(), 2);
    assert_eq!(report.state.selected_id.as_deref(), Some("a"));
    assert!(report.state.lead_status.is_some());
    assert_eq!(
        report.acknowledgment,
        Some(AckRecord::new("lead-1", AckOutcome::Rendered))
    );

    let topics: Vec<&str> = report.outbound.iter().map(|m| m.topic.as_str()).collect();
    // menu ack, detail ack, tour, repeated detail ack on reconnect, lead ack
    assert_eq!(
        topics,
        [
            TOPIC_OVERLAY_ACK,
            TOPIC_OVERLAY_ACK,
            TOPIC_REQUEST_TOUR,
            TOPIC_OVERLAY_ACK,
            TOPIC_OVERLAY_ACK,
        ]
    );
    assert_eq!(report.outbound[2].message["payload"]["propertyId"], "a");
    assert_eq!(report.outbound[3].message["payload"]["overlayId"], "o2");
    assert_eq!(report.notices.len(), 2);
}

#[test]
fn foreign_messages_are_counted_as_dropped() {
    let steps = parse_script(r#"{"channel": "lk.chat", "message": {"text": "hi"}}"#)
        .expect("script parses");
    let report = run_script(&steps, SessionConfig::default());
    assert_eq!(report.dropped, 1);
    assert!(report.outbound.is_empty());
    assert!(report.state.menu_items.is_empty());
}
