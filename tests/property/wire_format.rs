//! Property-based wire format tests.
//!
//! Uses proptest to verify:
//! 1. Any valid client request survives an encode → decode round-trip.
//! 2. Any valid server event survives an encode → decode round-trip.
//! 3. Arbitrary input never causes a panic in decoding (returns `Err`
//!    gracefully).
//! 4. Applying the same partial update twice leaves the record exactly as
//!    after the first application.

use proptest::prelude::*;
use tasksync_proto::envelope::{self, ClientMessage, ServerMessage};
use tasksync_proto::task::{Priority, TaskId, TaskRecord, TaskStatus, TaskUpdates};
use uuid::Uuid;

// --- Strategies for protocol types ---

/// Strategy for generating arbitrary `TaskId` values.
fn arb_task_id() -> impl Strategy<Value = TaskId> {
    any::<u128>().prop_map(|n| TaskId::new(Uuid::from_u128(n).to_string()))
}

/// Strategy for generating arbitrary `TaskStatus` values.
fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![Just(TaskStatus::Pending), Just(TaskStatus::Completed)]
}

/// Strategy for generating arbitrary `Priority` values.
fn arb_priority() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::Low),
        Just(Priority::Medium),
        Just(Priority::High),
    ]
}

/// Strategy for generating arbitrary `TaskRecord` values.
/// Titles avoid NUL but exercise the full unicode range JSON can carry.
fn arb_record() -> impl Strategy<Value = TaskRecord> {
    (
        arb_task_id(),
        "[^\x00]{1,64}",
        arb_status(),
        "[a-z]{0,16}",
        arb_priority(),
        prop::option::of("[0-9]{4}-[0-9]{2}-[0-9]{2}"),
        "[a-z]{0,16}",
    )
        .prop_map(
            |(id, title, status, assignee, priority, due_date, created_by)| TaskRecord {
                id,
                title,
                status,
                assignee,
                priority,
                due_date,
                created_by,
                created_at: "2026-08-30T12:00:00Z".to_string(),
            },
        )
}

/// Strategy for generating arbitrary `TaskUpdates` values.
fn arb_updates() -> impl Strategy<Value = TaskUpdates> {
    (
        prop::option::of("[^\x00]{1,64}"),
        prop::option::of(arb_status()),
        prop::option::of("[a-z]{0,16}"),
        prop::option::of(arb_priority()),
        prop::option::of("[0-9]{4}-[0-9]{2}-[0-9]{2}"),
    )
        .prop_map(|(title, status, assignee, priority, due_date)| TaskUpdates {
            title,
            status,
            assignee,
            priority,
            due_date,
        })
}

/// Strategy for generating arbitrary client requests.
fn arb_client_message() -> impl Strategy<Value = ClientMessage> {
    prop_oneof![
        Just(ClientMessage::LoadTasks),
        arb_record().prop_map(|task| ClientMessage::AddTask { task }),
        (arb_task_id(), arb_updates())
            .prop_map(|(task_id, updates)| ClientMessage::UpdateTask { task_id, updates }),
        arb_task_id().prop_map(|task_id| ClientMessage::DeleteTask { task_id }),
    ]
}

/// Strategy for generating arbitrary server events.
fn arb_server_message() -> impl Strategy<Value = ServerMessage> {
    prop_oneof![
        prop::collection::vec(arb_record(), 0..8)
            .prop_map(|tasks| ServerMessage::TasksLoaded { tasks }),
        arb_record().prop_map(|task| ServerMessage::TaskAdded { task }),
        (arb_task_id(), arb_updates())
            .prop_map(|(task_id, updates)| ServerMessage::TaskUpdated { task_id, updates }),
        arb_task_id().prop_map(|task_id| ServerMessage::TaskDeleted { task_id }),
        "[^\x00]{0,64}".prop_map(|message| ServerMessage::Error { message }),
    ]
}

// --- Property tests ---

proptest! {
    /// Any valid client request survives an encode → decode round-trip.
    #[test]
    fn client_message_round_trip(msg in arb_client_message()) {
        let text = envelope::encode_client(&msg).expect("encode should succeed");
        let decoded = envelope::decode_client(&text).expect("decode should succeed");
        prop_assert_eq!(msg, decoded);
    }

    /// Any valid server event survives an encode → decode round-trip.
    #[test]
    fn server_message_round_trip(msg in arb_server_message()) {
        let text = envelope::encode_server(&msg).expect("encode should succeed");
        let decoded = envelope::decode_server(&text).expect("decode should succeed");
        prop_assert_eq!(msg, decoded);
    }

    /// Arbitrary input never panics the decoders; they return Err (or, for
    /// coincidentally valid JSON, Ok) without crashing.
    #[test]
    fn decode_never_panics(input in ".{0,256}") {
        let _ = envelope::decode_client(&input);
        let _ = envelope::decode_server(&input);
    }

    /// A record survives JSON round-tripping with unknown fields dropped.
    #[test]
    fn record_round_trip(record in arb_record()) {
        let json = serde_json::to_string(&record).expect("serialize should succeed");
        let decoded: TaskRecord = serde_json::from_str(&json).expect("deserialize should succeed");
        prop_assert_eq!(record, decoded);
    }

    /// Applying the same update twice equals applying it once, and the
    /// second application reports no change.
    #[test]
    fn update_application_is_idempotent(record in arb_record(), updates in arb_updates()) {
        let mut once = record.clone();
        updates.apply_to(&mut once);
        let mut twice = once.clone();
        let changed_again = updates.apply_to(&mut twice);
        prop_assert!(!changed_again);
        prop_assert_eq!(once, twice);
    }

    /// An empty update never changes a record.
    #[test]
    fn empty_update_is_a_noop(record in arb_record()) {
        let updates = TaskUpdates::default();
        let mut target = record.clone();
        prop_assert!(!updates.apply_to(&mut target));
        prop_assert_eq!(record, target);
    }
}
