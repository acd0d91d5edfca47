//! Transaction evaluation through `Store::transaction` (spec §4.F).

use std::sync::Arc;

use arboreal::path::NodeIdent;
use arboreal::testing::TestStore;
use arboreal::transaction::{AbortReason, TxBuilder, TxContext, TxOutcome, TxRegistry};
use arboreal::tree::Payload;
use arboreal::triggers::ProcRegistry;
use arboreal::projections::FunctionRegistry;

#[test]
fn read_write_transaction_is_visible_to_subsequent_reads() {
    let mut registry = TxRegistry::new();
    registry.register(
        "restock",
        Arc::new(|ctx: &mut TxContext| {
            let current = match ctx.get(&vec![NodeIdent::name("stock")]) {
                Some(Payload::Data(v)) => v.as_i64().unwrap_or(0),
                _ => 0,
            };
            ctx.put(&vec![NodeIdent::name("stock")], Payload::Data(serde_json::json!(current + 10))).unwrap();
            TxOutcome::Committed(serde_json::json!(current + 10))
        }),
    );
    let store = TestStore::with_registries(ProcRegistry::new(), FunctionRegistry::new(), registry);

    let tx = TxBuilder::new("restock").read_write().build().unwrap();
    let outcome = store.transaction(tx).unwrap();
    assert_eq!(outcome, TxOutcome::Committed(serde_json::json!(10)));
    assert_eq!(store.get_one("/stock").unwrap(), Payload::Data(serde_json::json!(10)));
}

#[test]
fn read_only_transaction_cannot_mutate_the_tree() {
    let mut registry = TxRegistry::new();
    registry.register(
        "sneaky_write",
        Arc::new(|ctx: &mut TxContext| match ctx.put(&vec![NodeIdent::name("a")], Payload::Data(serde_json::json!(1))) {
            Ok(()) => TxOutcome::Committed(serde_json::json!("should not happen")),
            Err(e) => TxOutcome::Aborted { reason: AbortReason::Exception(e) },
        }),
    );
    let store = TestStore::with_registries(ProcRegistry::new(), FunctionRegistry::new(), registry);

    let tx = TxBuilder::new("sneaky_write").read_only().build().unwrap();
    let outcome = store.transaction(tx).unwrap();
    match outcome {
        TxOutcome::Aborted { reason: AbortReason::Exception(e) } => {
            assert_eq!(e.kind, arboreal::ErrorKind::StoreUpdateDenied);
        }
        other => panic!("expected an aborted outcome, got {other:?}"),
    }
    assert!(!store.exists("/a"));
}

#[test]
fn user_initiated_abort_leaves_no_trace_in_the_outcome_but_applies_writes_made_before_it() {
    let mut registry = TxRegistry::new();
    registry.register(
        "write_then_abort",
        Arc::new(|ctx: &mut TxContext| {
            ctx.put(&vec![NodeIdent::name("attempt")], Payload::Data(serde_json::json!(1))).unwrap();
            TxContext::abort(serde_json::json!("not good enough"))
        }),
    );
    let store = TestStore::with_registries(ProcRegistry::new(), FunctionRegistry::new(), registry);

    let tx = TxBuilder::new("write_then_abort").read_write().build().unwrap();
    let outcome = store.transaction(tx).unwrap();
    assert_eq!(outcome, TxOutcome::Aborted { reason: AbortReason::User(serde_json::json!("not good enough")) });
    // There is no separate staging tree for `ReadWrite` transactions: a
    // write made before an application-chosen abort still lands.
    assert!(store.exists("/attempt"));
}

#[test]
fn unregistered_transaction_function_is_rejected() {
    let store = TestStore::new();
    let tx = TxBuilder::new("never_registered").read_only().build().unwrap();
    let err = store.transaction(tx).unwrap_err();
    assert_eq!(err.kind, arboreal::ErrorKind::FunctionClause);
}
