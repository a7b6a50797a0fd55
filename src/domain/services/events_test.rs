use anyhow::Result;
use test_utils::events_fixture;
use tokio::sync::mpsc;

use super::DispatchOutcome;
use super::EventsService;
use crate::domain::models::BlockStatus;
use crate::domain::models::Event;
use crate::domain::models::InboundEvent;
use crate::domain::models::NotificationLevel;
use crate::domain::services::ChatStore;
use crate::domain::services::EventRegistry;

fn decode(line: &str) -> InboundEvent {
    return InboundEvent::decode(line).unwrap();
}

fn replay(store: &mut ChatStore, registry: &EventRegistry, lines: &str) -> Vec<DispatchOutcome> {
    return lines
        .lines()
        .filter_map(|line| return InboundEvent::decode(line).ok())
        .map(|event| return EventsService::apply(store, registry, event))
        .collect();
}

#[test]
fn it_replays_a_recorded_turn() {
    let registry = EventRegistry::with_defaults();
    let mut store = ChatStore::new("s1");

    let outcomes = replay(&mut store, &registry, events_fixture());

    assert_eq!(outcomes.len(), 14);
    assert_eq!(
        outcomes
            .iter()
            .filter(|e| return **e == DispatchOutcome::Dropped)
            .count(),
        1
    );
    assert!(store.message("m-assistant").unwrap().is_finalized());
    assert!(store.can_send());
    insta::assert_snapshot!(store.transcript(), @r###"
    assistant:
    [thinking] Recall the chain rule.
    [tool_call notes_search: success]
    [memory_retrieval: success]
    The derivative of sin(x^2) is 2x cos(x^2).
    "###);
}

#[test]
fn it_drops_unregistered_types_without_mutation() {
    let registry = EventRegistry::with_defaults();
    let mut store = ChatStore::new("s1");
    EventsService::apply(
        &mut store,
        &registry,
        decode(r#"{"kind":"stream_start","messageId":"m1"}"#),
    );
    let before = store.transcript();

    for line in [
        r#"{"kind":"block","type":"quiz_card","phase":"start","messageId":"m1","blockId":"b1"}"#,
        r#"{"kind":"block","type":"quiz_card","phase":"chunk","blockId":"b1","chunk":"x"}"#,
        r#"{"kind":"block","type":"quiz_card","phase":"end","blockId":"b1"}"#,
        r#"{"kind":"block","type":"quiz_card","phase":"error","blockId":"b1","error":"x"}"#,
    ] {
        let res = EventsService::apply(&mut store, &registry, decode(line));
        assert_eq!(res, DispatchOutcome::Dropped);
    }

    assert_eq!(store.transcript(), before);
    assert!(store.block("b1").is_none());
    assert!(store.message("m1").unwrap().block_ids.is_empty());
}

#[test]
fn it_drops_events_for_unknown_blocks_and_messages() {
    let registry = EventRegistry::with_defaults();
    let mut store = ChatStore::new("s1");

    let res = EventsService::apply(
        &mut store,
        &registry,
        decode(r#"{"kind":"block","type":"text","phase":"chunk","blockId":"ghost","chunk":"boo"}"#),
    );
    assert_eq!(res, DispatchOutcome::Dropped);

    let res = EventsService::apply(
        &mut store,
        &registry,
        decode(r#"{"kind":"block","type":"text","phase":"start","messageId":"ghost"}"#),
    );
    assert_eq!(res, DispatchOutcome::Dropped);
    assert!(store.messages().is_empty());
}

#[test]
fn it_drops_events_aimed_at_blocks_of_another_type() {
    let registry = EventRegistry::with_defaults();
    let mut store = ChatStore::new("s1");
    let outcomes = replay(
        &mut store,
        &registry,
        r#"{"kind":"stream_start","messageId":"m1"}
{"kind":"block","type":"memory_retrieval","phase":"start","messageId":"m1","blockId":"b-mem"}
{"kind":"block","type":"text","phase":"chunk","blockId":"b-mem","chunk":"sneaky"}
{"kind":"block","type":"text","phase":"end","blockId":"b-mem"}
{"kind":"block","type":"text","phase":"error","blockId":"b-mem","error":"x"}"#,
    );

    assert_eq!(
        outcomes,
        vec![
            DispatchOutcome::Applied,
            DispatchOutcome::Applied,
            DispatchOutcome::Dropped,
            DispatchOutcome::Dropped,
            DispatchOutcome::Dropped,
        ]
    );
    let block = store.block("b-mem").unwrap();
    assert_eq!(block.event_type(), "memory_retrieval");
    assert_eq!(block.status(), BlockStatus::Pending);
    assert_eq!(block.content(), "");

    let res = EventsService::apply(
        &mut store,
        &registry,
        decode(r#"{"kind":"block","type":"memory_retrieval","phase":"end","blockId":"b-mem"}"#),
    );
    assert_eq!(res, DispatchOutcome::Applied);
    assert_eq!(store.block("b-mem").unwrap().status(), BlockStatus::Error);
}

#[test]
fn it_settles_open_blocks_on_completion() {
    let registry = EventRegistry::with_defaults();
    let mut store = ChatStore::new("s1");
    replay(
        &mut store,
        &registry,
        r#"{"kind":"stream_start","messageId":"m1"}
{"kind":"block","type":"text","phase":"start","messageId":"m1","blockId":"b1"}
{"kind":"block","type":"text","phase":"chunk","blockId":"b1","chunk":"Unfinished"}
{"kind":"stream_complete","messageId":"m1"}"#,
    );

    assert_eq!(store.block("b1").unwrap().status(), BlockStatus::Success);
    assert!(store.message("m1").unwrap().is_finalized());
    assert!(store.can_send());
}

#[test]
fn it_fails_messages_on_stream_errors() {
    let registry = EventRegistry::with_defaults();
    let mut store = ChatStore::new("s1");
    let outcomes = replay(
        &mut store,
        &registry,
        r#"{"kind":"stream_start","messageId":"m1"}
{"kind":"block","type":"text","phase":"start","messageId":"m1","blockId":"b1"}
{"kind":"block","type":"text","phase":"chunk","blockId":"b1","chunk":"Partial"}
{"kind":"stream_error","messageId":"m1","error":"model crashed"}"#,
    );

    assert_eq!(outcomes.last(), Some(&DispatchOutcome::Applied));
    assert_eq!(store.block("b1").unwrap().status(), BlockStatus::Error);
    assert_eq!(store.notifications()[0].text, "model crashed");
    assert_eq!(
        store.message_content("m1").unwrap(),
        "Partial\n[error: model crashed]\n"
    );
}

#[test]
fn it_cancels_only_the_active_stream() {
    let registry = EventRegistry::with_defaults();
    let mut store = ChatStore::new("s1");
    let outcomes = replay(
        &mut store,
        &registry,
        r#"{"kind":"stream_start","messageId":"m1"}
{"kind":"block","type":"web_search","phase":"start","messageId":"m1","blockId":"b1"}
{"kind":"stream_cancelled","messageId":"m-other"}
{"kind":"stream_cancelled","messageId":"m1"}"#,
    );

    assert_eq!(
        outcomes,
        vec![
            DispatchOutcome::Applied,
            DispatchOutcome::Applied,
            DispatchOutcome::Dropped,
            DispatchOutcome::Applied,
        ]
    );
    assert_eq!(store.block("b1").unwrap().error(), Some("Stream cancelled"));
}

#[test]
fn it_handles_timeouts_and_backend_failures() {
    let (_tx, rx) = mpsc::unbounded_channel::<Event>();
    let service = EventsService::new(rx, EventRegistry::with_defaults());
    let mut store = ChatStore::new("s1");
    replay(
        &mut store,
        service.registry(),
        r#"{"kind":"stream_start","messageId":"m1"}
{"kind":"block","type":"text","phase":"start","messageId":"m1","blockId":"b1"}"#,
    );

    let res = service.handle(&mut store, Event::Timeout());
    assert_eq!(res, DispatchOutcome::Applied);
    assert_eq!(store.block("b1").unwrap().status(), BlockStatus::Error);
    assert_eq!(store.notifications()[0].level, NotificationLevel::Warning);

    let res = service.handle(
        &mut store,
        Event::BackendFailure(None, "bridge offline".to_string()),
    );
    assert_eq!(res, DispatchOutcome::Applied);
    assert_eq!(store.notifications()[1].text, "bridge offline");
}

#[test]
fn it_marks_failed_sends_on_their_message() {
    let (_tx, rx) = mpsc::unbounded_channel::<Event>();
    let service = EventsService::new(rx, EventRegistry::with_defaults());
    let mut store = ChatStore::new("s1");
    store.begin_assistant_message(Some("m1")).unwrap();

    let res = service.handle(
        &mut store,
        Event::BackendFailure(Some("m1".to_string()), "invoke failed".to_string()),
    );

    assert_eq!(res, DispatchOutcome::Applied);
    assert!(store.message("m1").unwrap().is_finalized());
    assert_eq!(store.message_content("m1").unwrap(), "[error: invoke failed]\n");
    assert_eq!(store.notifications().len(), 1);
}

#[tokio::test]
async fn it_receives_events_until_the_channel_closes() -> Result<()> {
    let (tx, rx) = mpsc::unbounded_channel::<Event>();
    let mut service = EventsService::new(rx, EventRegistry::with_defaults());

    tx.send(Event::Timeout())?;
    drop(tx);

    assert!(matches!(service.next().await?, Event::Timeout()));
    assert!(service.next().await.is_err());
    return Ok(());
}
