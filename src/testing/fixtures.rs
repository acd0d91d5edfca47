//! Pre-built test scenarios, mirroring the spec's own worked examples
//! (spec §8) so integration tests and doctests can share one seed instead
//! of re-deriving the same tree by hand.

use serde_json::json;

use crate::options::CommandOptions;
use crate::store::Store;
use crate::testing::TestStore;
use crate::tree::Payload;

/// A freshly seeded [`TestStore`] with a small inventory tree:
/// `/stock/oak = 12`, `/stock/pine = 4`, `/warehouse/name = "central"`.
///
/// # Panics
/// Panics if any of the seed writes fail (would indicate a bug in the
/// store itself, not in the test using this fixture).
#[must_use]
pub fn inventory_fixture() -> TestStore {
    let store = TestStore::new();
    seed_inventory(&store);
    store
}

fn seed_inventory(store: &Store) {
    store.put("/stock/oak", Payload::Data(json!(12)), CommandOptions::new()).unwrap();
    store.put("/stock/pine", Payload::Data(json!(4)), CommandOptions::new()).unwrap();
    store
        .put("/warehouse/name", Payload::Data(json!("central")), CommandOptions::new())
        .unwrap();
}
