//! Property tests: committed state always mirrors a reference map

use pagekv::Environment;
use proptest::collection::{btree_map, vec as prop_vec};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::ops::Bound;
use tempfile::TempDir;

fn keys() -> impl Strategy<Value = Vec<u8>> {
    prop_vec(any::<u8>(), 1..48)
}

fn values() -> impl Strategy<Value = Vec<u8>> {
    prop_vec(any::<u8>(), 0..160)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_round_trip(entries in btree_map(keys(), values(), 1..150)) {
        let dir = TempDir::new().unwrap();
        let env = Environment::open(dir.path().join("data.pkv")).unwrap();

        let mut txn = env.begin_write().unwrap();
        for (key, value) in &entries {
            txn.put(key, value).unwrap();
        }
        txn.commit().unwrap();

        let reader = env.begin_read().unwrap();
        for (key, value) in &entries {
            prop_assert_eq!(reader.get(key).unwrap(), Some(value.clone()));
        }
    }

    #[test]
    fn prop_overwrites_and_deletes_match_reference(
        entries in btree_map(keys(), values(), 1..100),
        tombstones in prop_vec(any::<prop::sample::Index>(), 0..40),
    ) {
        let dir = TempDir::new().unwrap();
        let env = Environment::open(dir.path().join("data.pkv")).unwrap();

        let mut reference: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        let mut txn = env.begin_write().unwrap();
        for (key, value) in &entries {
            txn.put(key, value).unwrap();
            reference.insert(key.clone(), value.clone());
        }
        txn.commit().unwrap();

        let all_keys: Vec<Vec<u8>> = entries.keys().cloned().collect();
        let mut txn = env.begin_write().unwrap();
        for index in &tombstones {
            let key = index.get(&all_keys);
            let existed = txn.delete(key).unwrap();
            prop_assert_eq!(existed, reference.remove(key).is_some());
        }
        txn.commit().unwrap();

        let reader = env.begin_read().unwrap();
        for key in &all_keys {
            prop_assert_eq!(reader.get(key).unwrap(), reference.get(key).cloned());
        }
    }

    #[test]
    fn prop_range_matches_reference(
        entries in btree_map(keys(), values(), 1..120),
        start in keys(),
        end in keys(),
    ) {
        let dir = TempDir::new().unwrap();
        let env = Environment::open(dir.path().join("data.pkv")).unwrap();

        let mut txn = env.begin_write().unwrap();
        for (key, value) in &entries {
            txn.put(key, value).unwrap();
        }
        txn.commit().unwrap();

        let reader = env.begin_read().unwrap();
        let scanned: Vec<(Vec<u8>, Vec<u8>)> = reader
            .range(&start, &end)
            .unwrap()
            .map(|item| item.unwrap())
            .collect();

        // Strictly ascending, half-open bounds
        for window in scanned.windows(2) {
            prop_assert!(window[0].0 < window[1].0);
        }
        let expected: Vec<(Vec<u8>, Vec<u8>)> = if start < end {
            entries
                .range::<Vec<u8>, _>((Bound::Included(&start), Bound::Excluded(&end)))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        } else {
            Vec::new()
        };
        prop_assert_eq!(scanned, expected);
    }
}
