//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random bundles against a known pool
//! of logical ids.

use proptest::prelude::*;
use verdb_core::{Operation, TransactionRequest};
use verdb_store::DocumentStatus;

/// Strategy for generating resource kinds.
pub fn resource_kind_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["Patient", "Observation", "Encounter"]).prop_map(str::to_string)
}

/// Strategy for generating logical ids.
pub fn logical_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9-]{0,11}").expect("Invalid regex")
}

/// Strategy for generating small JSON object payloads.
pub fn payload_strategy() -> impl Strategy<Value = serde_json::Value> {
    prop::collection::btree_map(
        prop::string::string_regex("[a-z]{1,8}").expect("Invalid regex"),
        prop_oneof![
            any::<i64>().prop_map(serde_json::Value::from),
            any::<bool>().prop_map(serde_json::Value::from),
            prop::string::string_regex("[ -~]{0,16}")
                .expect("Invalid regex")
                .prop_map(serde_json::Value::from),
        ],
        0..5,
    )
    .prop_map(|fields| serde_json::Value::Object(fields.into_iter().collect()))
}

/// Strategy for generating operations.
pub fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop_oneof![
        Just(Operation::Create),
        Just(Operation::Read),
        Just(Operation::Update),
        Just(Operation::Delete),
    ]
}

/// Strategy for generating document statuses.
pub fn status_strategy() -> impl Strategy<Value = DocumentStatus> {
    prop_oneof![
        Just(DocumentStatus::Pending),
        Just(DocumentStatus::Available),
        Just(DocumentStatus::Locked),
        Just(DocumentStatus::PendingDelete),
        Just(DocumentStatus::Deleted),
    ]
}

/// Strategy for generating one request targeting an id from `ids`.
///
/// Creates get a generated id half of the time.
pub fn request_strategy(ids: Vec<String>) -> impl Strategy<Value = TransactionRequest> {
    (
        operation_strategy(),
        prop::sample::select(ids),
        payload_strategy(),
        any::<bool>(),
    )
        .prop_map(|(operation, id, payload, generate_id)| match operation {
            Operation::Create if generate_id => TransactionRequest::create("Patient", payload),
            Operation::Create => TransactionRequest::create("Patient", payload).with_id(id),
            Operation::Read => TransactionRequest::read("Patient", id),
            Operation::Update => TransactionRequest::update("Patient", id, payload),
            Operation::Delete => TransactionRequest::delete("Patient", id),
        })
}

/// Strategy for generating bundles of `1..max_len` requests over `ids`.
pub fn bundle_strategy(
    ids: Vec<String>,
    max_len: usize,
) -> impl Strategy<Value = Vec<TransactionRequest>> {
    prop::collection::vec(request_strategy(ids), 1..max_len.max(2))
}

/// Strategy for generating the status history of one id.
///
/// Histories end committed: every version but the last is `DELETED`, the last
/// is `AVAILABLE` or `DELETED`.
pub fn committed_history_strategy() -> impl Strategy<Value = Vec<DocumentStatus>> {
    (0usize..4, any::<bool>()).prop_map(|(retired, deleted)| {
        let mut history = vec![DocumentStatus::Deleted; retired];
        history.push(if deleted {
            DocumentStatus::Deleted
        } else {
            DocumentStatus::Available
        });
        history
    })
}
