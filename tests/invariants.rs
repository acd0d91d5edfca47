//! Tree invariants (spec §8, properties 1-5): monotonic versioning and
//! identity destroyed on delete, exercised through the public `Store` API
//! rather than `Tree` directly.

use arboreal::options::CommandOptions;
use arboreal::testing::TestStore;
use arboreal::tree::Payload;

#[test]
fn payload_version_increases_on_every_write_even_with_identical_value() {
    let store = TestStore::new();
    store
        .put("/stock/oak", Payload::Data(serde_json::json!(80)), CommandOptions::new())
        .unwrap();
    store
        .put("/stock/oak", Payload::Data(serde_json::json!(80)), CommandOptions::new())
        .unwrap();

    let first = store.get_one("/stock/oak").unwrap();
    assert_eq!(first, Payload::Data(serde_json::json!(80)));

    // Writing an identical payload still advances the version -- verified
    // through a subsequent compare-and-swap: if the version had not moved,
    // a CAS against version 1 would succeed instead of failing.
    let err = store
        .compare_and_swap(
            "/stock/oak",
            1,
            Payload::Data(serde_json::json!(90)),
            CommandOptions::new(),
        )
        .unwrap_err();
    assert_eq!(err.kind, arboreal::ErrorKind::MismatchingNode);
}

#[test]
fn recreated_node_restarts_versioning_from_scratch() {
    let store = TestStore::new();
    store.put("/a", Payload::Data(serde_json::json!(1)), CommandOptions::new()).unwrap();
    store.put("/a", Payload::Data(serde_json::json!(2)), CommandOptions::new()).unwrap();
    store.delete("/a", CommandOptions::new()).unwrap();
    store.put("/a", Payload::Data(serde_json::json!(3)), CommandOptions::new()).unwrap();

    // A freshly recreated node's payload_version is back at 1; CAS against
    // the stale version 3 it would have carried under the old identity
    // must fail.
    let err = store
        .compare_and_swap("/a", 3, Payload::Data(serde_json::json!(4)), CommandOptions::new())
        .unwrap_err();
    assert_eq!(err.kind, arboreal::ErrorKind::MismatchingNode);
    store
        .compare_and_swap("/a", 1, Payload::Data(serde_json::json!(4)), CommandOptions::new())
        .unwrap();
}

#[test]
fn update_on_nonexistent_node_fails_and_create_then_succeeds() {
    let store = TestStore::new();
    let err = store
        .update("/missing", Payload::Data(serde_json::json!(1)), CommandOptions::new())
        .unwrap_err();
    assert_eq!(err.kind, arboreal::ErrorKind::NodeNotFound);

    store.create("/missing", Payload::Data(serde_json::json!(1)), CommandOptions::new()).unwrap();
    store.update("/missing", Payload::Data(serde_json::json!(2)), CommandOptions::new()).unwrap();
    assert_eq!(store.get_one("/missing").unwrap(), Payload::Data(serde_json::json!(2)));
}

#[test]
fn update_on_root_is_denied() {
    let store = TestStore::new();
    let err = store
        .update("/", Payload::Data(serde_json::json!(1)), CommandOptions::new())
        .unwrap_err();
    assert_eq!(err.kind, arboreal::ErrorKind::DeniedUpdate);
}
