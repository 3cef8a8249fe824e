//! Scenario tests for the message lifecycle state machine.

use chrono::{Duration, Utc};
use frontdesk_messages::{DeliveryStatus, Message, MessageLifecycleStore, Sender};

fn seeded_store() -> (MessageLifecycleStore, String) {
    let mut store = MessageLifecycleStore::new("visitor-1");
    let message = Message::outgoing("room-1", "Hi", Sender::visitor("visitor-1"));
    let id = message.id.clone();
    store.append_local(message);
    (store, id)
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum LifecycleEvent {
    Delivered,
    Read,
}

fn apply(store: &mut MessageLifecycleStore, id: &str, event: LifecycleEvent) {
    let at = Utc::now();
    match event {
        LifecycleEvent::Delivered => store.apply_delivered("room-1", id, at),
        LifecycleEvent::Read => store.apply_read("room-1", &[id.to_string()], at),
    }
}

/// Replaying delivered/read events in any order and any multiplicity must
/// converge to the same final status as applying them once each in order.
#[test]
fn lifecycle_events_converge_under_reorder_and_replay() {
    use LifecycleEvent::{Delivered, Read};

    let sequences: &[&[LifecycleEvent]] = &[
        &[Delivered, Read],
        &[Read, Delivered],
        &[Delivered, Delivered, Read, Read],
        &[Read, Read, Delivered, Delivered],
        &[Delivered, Read, Delivered, Read, Delivered],
        &[Read],
    ];

    for sequence in sequences {
        let (mut store, id) = seeded_store();
        for event in *sequence {
            apply(&mut store, &id, *event);
        }
        let message = &store.messages("room-1")[0];
        assert_eq!(
            message.status,
            DeliveryStatus::Read,
            "sequence {sequence:?} should converge to read"
        );
        assert!(message.read_at.is_some());
        assert!(message.delivered_at.is_some());
    }
}

/// The offline-send scenario from the protocol design: optimistic append,
/// late ack after reconnect, then delivered, then read, then a duplicate
/// delivered that must be a no-op.
#[test]
fn offline_send_then_full_lifecycle() {
    let (mut store, id) = seeded_store();
    assert_eq!(store.messages("room-1")[0].status, DeliveryStatus::Sent);

    // Transport reconnects; the server acknowledges the buffered send.
    let sent_at = Utc::now();
    store.apply_ack("room-1", &id, sent_at);
    let message = &store.messages("room-1")[0];
    assert_eq!(message.status, DeliveryStatus::Sent);
    assert_eq!(message.sent_at, Some(sent_at));

    let delivered_at = sent_at + Duration::seconds(1);
    store.apply_delivered("room-1", &id, delivered_at);
    assert_eq!(store.messages("room-1")[0].status, DeliveryStatus::Delivered);

    let read_at = sent_at + Duration::seconds(2);
    store.apply_read("room-1", &[id.clone()], read_at);
    assert_eq!(store.messages("room-1")[0].status, DeliveryStatus::Read);

    // A straggling delivered event after read must change nothing.
    store.apply_delivered("room-1", &id, read_at + Duration::seconds(3));
    let message = &store.messages("room-1")[0];
    assert_eq!(message.status, DeliveryStatus::Read);
    assert_eq!(message.delivered_at, Some(delivered_at));
    assert_eq!(message.read_at, Some(read_at));
}

#[test]
fn ordering_is_insertion_order_not_timestamp_order() {
    let mut store = MessageLifecycleStore::new("visitor-1");

    let mut early = Message::outgoing("room-1", "second by clock", Sender::visitor("visitor-1"));
    early.created_at = Utc::now() + Duration::seconds(60);
    let early_id = early.id.clone();
    store.append_local(early);

    let mut late = Message::outgoing("room-1", "first by clock", Sender::visitor("visitor-1"));
    late.created_at = Utc::now() - Duration::seconds(60);
    let late_id = late.id.clone();
    store.append_local(late);

    // Server ack on the first message must not reorder either.
    store.apply_ack("room-1", &early_id, Utc::now());

    let ids: Vec<&str> = store
        .messages("room-1")
        .iter()
        .map(|m| m.id.as_str())
        .collect();
    assert_eq!(ids, vec![early_id.as_str(), late_id.as_str()]);
}
