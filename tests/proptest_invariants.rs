//! Property tests for the two structural invariants spec §8 calls out:
//! the page codec's encode/decode round trip, and the B+tree's ordering
//! guarantee under arbitrary insert sequences.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use tempfile::tempdir;

use innocore::alloc::SpaceAllocator;
use innocore::buffer::BufferPoolManager;
use innocore::common::{IndexId, TrxId};
use innocore::index::btree::{BTree, ParsedPageCache};
use innocore::lock::LockManager;
use innocore::redo::RedoManager;
use innocore::storage::page::{decode, encode, fits, PageFields, PageType, UserRecord};
use innocore::storage::tablespace::{ExtentPurpose, TablespaceRegistry};
use innocore::undo::UndoManager;

fn arb_record() -> impl Strategy<Value = (Vec<u8>, Vec<u8>, u64, bool)> {
    (
        prop::collection::vec(any::<u8>(), 1..12),
        prop::collection::vec(any::<u8>(), 0..24),
        any::<u64>(),
        any::<bool>(),
    )
}

proptest! {
    /// Any set of distinct-keyed records that fits on one page survives
    /// an encode/decode round trip byte-for-byte.
    #[test]
    fn page_codec_roundtrips_arbitrary_records(
        raw in prop::collection::vec(arb_record(), 0..40)
    ) {
        let mut by_key: std::collections::BTreeMap<Vec<u8>, (Vec<u8>, u64, bool)> = std::collections::BTreeMap::new();
        for (key, value, trx_id, delete_mark) in raw {
            by_key.insert(key, (value, trx_id, delete_mark));
        }
        let records: Vec<UserRecord> = by_key
            .into_iter()
            .map(|(key, (value, trx_id, delete_mark))| UserRecord { key, value, trx_id, delete_mark })
            .collect();
        prop_assume!(fits(&records));

        let mut sample = PageFields::new(innocore::common::SpaceId::new(7), 3, PageType::Index, 0);
        sample.records = records;

        let bytes = encode(&sample).unwrap();
        let decoded = decode(&bytes).unwrap();
        prop_assert_eq!(decoded, sample);
    }
}

fn fresh_tree() -> (tempfile::TempDir, BTree) {
    let dir = tempdir().unwrap();
    let registry = Arc::new(TablespaceRegistry::open(dir.path(), "ibdata1").unwrap());
    let space = registry.create_tablespace("t1").unwrap();
    registry
        .with_space(space, |ts| ts.allocate_extent(ExtentPurpose::Index))
        .unwrap();
    let allocator = Arc::new(SpaceAllocator::new(Arc::clone(&registry)));
    let bpm = Arc::new(BufferPoolManager::new(64, registry, 75, Duration::from_millis(1000)));
    let cache = ParsedPageCache::new(Arc::clone(&bpm), 64);
    let redo = RedoManager::open(dir.path(), 1 << 20).unwrap();
    let undo = UndoManager::new();
    let lock_manager = LockManager::new();
    let tree = BTree::create(
        allocator,
        cache,
        space,
        IndexId(1),
        true,
        redo,
        undo,
        lock_manager,
        Duration::from_millis(5_000),
    )
    .unwrap();
    (dir, tree)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    /// Inserting an arbitrary set of distinct short keys, in arbitrary
    /// order, leaves the tree's full-range scan in sorted order -- the
    /// ordering invariant the B+tree exists to provide.
    #[test]
    fn btree_range_search_returns_keys_in_sorted_order(
        keys in prop::collection::hash_set(prop::collection::vec(1u8..=20, 1..6), 1..60)
    ) {
        let (_dir, tree) = fresh_tree();
        let unique_keys: BTreeSet<Vec<u8>> = keys.into_iter().collect();
        for key in &unique_keys {
            tree.insert(TrxId(1), key.clone(), key.clone()).unwrap();
        }

        let lo = unique_keys.iter().next().cloned().unwrap();
        let hi = unique_keys.iter().next_back().cloned().unwrap();
        let results = tree.range_search(&lo, &hi, None).unwrap();

        let got: Vec<Vec<u8>> = results.into_iter().map(|kv| kv.key).collect();
        let expected: Vec<Vec<u8>> = unique_keys.into_iter().collect();
        prop_assert_eq!(got, expected);
    }
}
