//! Trigger and projection dispatch through `Store` (spec §4.G, §8 S1-S7).

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use arboreal::config::StoreConfig;
use arboreal::dispatch::{EventAction, ProjectionKind, ProjectionOptions, ProjectionSpec, TriggerId, TriggerSpec, ViewType};
use arboreal::options::CommandOptions;
use arboreal::path::NodeIdent;
use arboreal::projections::{FunctionRegistry, ProjectionEvent, ProjectionFn, ViewHandle};
use arboreal::store::Store;
use arboreal::transaction::TxRegistry;
use arboreal::triggers::{ProcRegistry, TriggerContext};
use arboreal::tree::Payload;
use arboreal::view_store::{InMemoryViewStore, ViewStore};

fn new_store_with_view(view: InMemoryViewStore) -> Store {
    Store::new(
        TxRegistry::new(),
        ProcRegistry::new(),
        FunctionRegistry::new(),
        Arc::new(view),
        StoreConfig::default(),
    )
}

fn new_store_with(functions: FunctionRegistry, procs: ProcRegistry, view: InMemoryViewStore) -> Store {
    Store::new(TxRegistry::new(), procs, functions, Arc::new(view), StoreConfig::default())
}

// S1: a projection follows create, update, and delete of its matched nodes.
#[test]
fn projection_tracks_create_update_and_delete() {
    let mut functions = FunctionRegistry::new();
    functions.register("echo", ProjectionFn::Simple(Arc::new(|e: &ProjectionEvent| e.payload.clone())));
    let view = InMemoryViewStore::new();
    let store = new_store_with(functions, ProcRegistry::new(), view.clone());

    store
        .register_projection(ProjectionSpec {
            name: "stock_view".into(),
            pattern: arboreal::path::parse_string("/stock/*").unwrap(),
            kind: ProjectionKind::Simple,
            function_name: "echo".into(),
            options: ProjectionOptions::default(),
        })
        .unwrap();

    let path = vec![NodeIdent::name("stock"), NodeIdent::name("oak")];
    store.put("/stock/oak", Payload::Data(serde_json::json!(5)), CommandOptions::new()).unwrap();
    assert_eq!(view.get("stock_view", &path), Some(vec![serde_json::json!(5)]));

    store.put("/stock/oak", Payload::Data(serde_json::json!(9)), CommandOptions::new()).unwrap();
    assert_eq!(view.get("stock_view", &path), Some(vec![serde_json::json!(9)]));

    store.delete("/stock/oak", CommandOptions::new()).unwrap();
    assert_eq!(view.get("stock_view", &path), None);
}

// S2: stored-procedure payloads are never projected.
#[test]
fn projection_skips_stored_procedure_nodes() {
    let mut functions = FunctionRegistry::new();
    functions.register("echo", ProjectionFn::Simple(Arc::new(|e: &ProjectionEvent| e.payload.clone())));
    let view = InMemoryViewStore::new();
    let store = new_store_with(functions, ProcRegistry::new(), view.clone());

    store
        .register_projection(ProjectionSpec {
            name: "procs_view".into(),
            pattern: arboreal::path::parse_string("/procs/*").unwrap(),
            kind: ProjectionKind::Simple,
            function_name: "echo".into(),
            options: ProjectionOptions::default(),
        })
        .unwrap();

    store.put("/procs/restock", Payload::StoredProc("restock_proc".into()), CommandOptions::new()).unwrap();
    let path = vec![NodeIdent::name("procs"), NodeIdent::name("restock")];
    assert_eq!(view.get("procs_view", &path), None);
}

// S4: registering a projection against existing nodes synthesizes their
// current values into the view immediately (retroactive registration).
#[test]
fn projection_registration_is_retroactive() {
    let mut functions = FunctionRegistry::new();
    functions.register("echo", ProjectionFn::Simple(Arc::new(|e: &ProjectionEvent| e.payload.clone())));
    let view = InMemoryViewStore::new();
    let store = new_store_with(functions, ProcRegistry::new(), view.clone());

    store.put("/stock/pine", Payload::Data(serde_json::json!(4)), CommandOptions::new()).unwrap();
    store
        .register_projection(ProjectionSpec {
            name: "stock_view".into(),
            pattern: arboreal::path::parse_string("/stock/*").unwrap(),
            kind: ProjectionKind::Simple,
            function_name: "echo".into(),
            options: ProjectionOptions::default(),
        })
        .unwrap();

    let path = vec![NodeIdent::name("stock"), NodeIdent::name("pine")];
    assert_eq!(view.get("stock_view", &path), Some(vec![serde_json::json!(4)]));
}

// S5: a second registration under the same name is rejected.
#[test]
fn duplicate_projection_name_is_rejected() {
    let store = new_store_with_view(InMemoryViewStore::new());
    let spec = || ProjectionSpec {
        name: "dup".into(),
        pattern: arboreal::path::parse_string("/a/*").unwrap(),
        kind: ProjectionKind::Simple,
        function_name: "echo".into(),
        options: ProjectionOptions::default(),
    };
    store.register_projection(spec()).unwrap();
    let err = store.register_projection(spec()).unwrap_err();
    assert_eq!(err.kind, arboreal::ErrorKind::Exists);
}

// S6: an unrecognized registration option is rejected on the wire, i.e. when
// a `ProjectionOptions` is deserialized rather than built directly in Rust.
#[test]
fn unknown_projection_option_is_rejected_on_deserialize() {
    let json = serde_json::json!({
        "view_type": "Set",
        "read_concurrency": false,
        "write_concurrency": false,
        "snapshot_isolation": true,
    });
    let err = serde_json::from_value::<ProjectionOptions>(json).unwrap_err();
    assert!(err.to_string().contains("snapshot_isolation") || err.to_string().contains("unknown field"));
}

// S7: a projection function error (here, a missing function registration)
// is isolated -- the mutation that produced the event still succeeds.
#[test]
fn unregistered_projection_function_does_not_fail_the_mutation() {
    let view = InMemoryViewStore::new();
    let store = new_store_with(FunctionRegistry::new(), ProcRegistry::new(), view.clone());
    store
        .register_projection(ProjectionSpec {
            name: "broken".into(),
            pattern: arboreal::path::parse_string("/a/*").unwrap(),
            kind: ProjectionKind::Simple,
            function_name: "never_registered".into(),
            options: ProjectionOptions::default(),
        })
        .unwrap();

    store.put("/a/b", Payload::Data(serde_json::json!(1)), CommandOptions::new()).unwrap();
    assert!(store.exists("/a/b"));
    assert_eq!(view.get("broken", &vec![NodeIdent::name("a"), NodeIdent::name("b")]), None);
}

#[test]
fn trigger_fires_registered_stored_proc_on_matching_update() {
    let mut procs = ProcRegistry::new();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let calls2 = Arc::clone(&calls);
    procs.register(
        "restock_proc",
        Arc::new(move |ctx: &TriggerContext| calls2.lock().unwrap().push(ctx.path.clone())),
    );
    let store = new_store_with(FunctionRegistry::new(), procs, InMemoryViewStore::new());

    store.put("/procs/restock", Payload::StoredProc("restock_proc".into()), CommandOptions::new()).unwrap();
    store
        .register_trigger(TriggerSpec {
            id: TriggerId::new("on_restock"),
            pattern: arboreal::path::parse_string("/stock/**").unwrap(),
            actions: BTreeSet::from([EventAction::Update]),
            priority: 0,
            sproc_path: vec![NodeIdent::name("procs"), NodeIdent::name("restock")],
        })
        .unwrap();

    // First write creates the node, so it is not an `Update` event yet.
    store.put("/stock/oak", Payload::Data(serde_json::json!(1)), CommandOptions::new()).unwrap();
    assert!(calls.lock().unwrap().is_empty());

    store.put("/stock/oak", Payload::Data(serde_json::json!(2)), CommandOptions::new()).unwrap();
    assert_eq!(calls.lock().unwrap().len(), 1);
}

// S3: an Extended projection sees both old and new payload and can apply a
// partial update to its view that a Simple (one-value-in, one-value-out)
// projection could never express -- here, a bag's symmetric difference.
#[test]
fn extended_projection_applies_symmetric_difference_to_bag_view() {
    fn sync_tags(view: &ViewHandle, path: &arboreal::path::Path, old: Option<&serde_json::Value>, new: Option<&serde_json::Value>) {
        let old_items: Vec<serde_json::Value> = old.and_then(serde_json::Value::as_array).cloned().unwrap_or_default();
        let new_items: Vec<serde_json::Value> = new.and_then(serde_json::Value::as_array).cloned().unwrap_or_default();
        for removed in old_items.iter().filter(|v| !new_items.contains(v)) {
            view.remove_value(path, removed);
        }
        for added in new_items.iter().filter(|v| !old_items.contains(v)) {
            view.put(path, ViewType::Bag, added.clone());
        }
    }

    let mut functions = FunctionRegistry::new();
    functions.register("sync_tags", ProjectionFn::Extended(Arc::new(sync_tags)));
    let view = InMemoryViewStore::new();
    let store = new_store_with(functions, ProcRegistry::new(), view.clone());

    store
        .register_projection(ProjectionSpec {
            name: "tags".into(),
            pattern: arboreal::path::parse_string("/stock/*").unwrap(),
            kind: ProjectionKind::Extended,
            function_name: "sync_tags".into(),
            options: ProjectionOptions { view_type: ViewType::Bag, ..Default::default() },
        })
        .unwrap();

    let path = vec![NodeIdent::name("stock"), NodeIdent::name("oak")];

    store.put("/stock/oak", Payload::Data(serde_json::json!(["a", "b", "c"])), CommandOptions::new()).unwrap();
    let mut rows = view.get("tags", &path).unwrap();
    rows.sort_by(|a, b| a.as_str().cmp(&b.as_str()));
    assert_eq!(rows, vec![serde_json::json!("a"), serde_json::json!("b"), serde_json::json!("c")]);

    store.put("/stock/oak", Payload::Data(serde_json::json!(["b", "d"])), CommandOptions::new()).unwrap();
    let mut rows = view.get("tags", &path).unwrap();
    rows.sort_by(|a, b| a.as_str().cmp(&b.as_str()));
    assert_eq!(rows, vec![serde_json::json!("b"), serde_json::json!("d")]);

    store.delete("/stock/oak", CommandOptions::new()).unwrap();
    assert_eq!(view.get("tags", &path), None);
}

#[test]
fn duplicate_trigger_id_is_rejected() {
    let store = new_store_with_view(InMemoryViewStore::new());
    let spec = || TriggerSpec {
        id: TriggerId::new("dup"),
        pattern: arboreal::path::parse_string("/a/**").unwrap(),
        actions: BTreeSet::from([EventAction::Update]),
        priority: 0,
        sproc_path: vec![NodeIdent::name("procs"), NodeIdent::name("noop")],
    };
    store.register_trigger(spec()).unwrap();
    let err = store.register_trigger(spec()).unwrap_err();
    assert_eq!(err.kind, arboreal::ErrorKind::Exists);
}
