//! Range scans: ordering, bounds, and stability under concurrent rewrites

use pagekv::Environment;
use tempfile::TempDir;

#[test]
fn test_range_is_sorted_and_bounded() {
    let dir = TempDir::new().unwrap();
    let env = Environment::open(dir.path().join("data.pkv")).unwrap();

    let mut txn = env.begin_write().unwrap();
    for i in (0..3000u32).rev() {
        txn.put(format!("key{i:05}").as_bytes(), format!("{i}").as_bytes())
            .unwrap();
    }
    txn.commit().unwrap();

    let reader = env.begin_read().unwrap();
    let items: Vec<(Vec<u8>, Vec<u8>)> = reader
        .range(b"key00100", b"key02500")
        .unwrap()
        .map(|item| item.unwrap())
        .collect();

    assert_eq!(items.len(), 2400);
    assert_eq!(items[0].0, b"key00100".to_vec());
    assert_eq!(items.last().unwrap().0, b"key02499".to_vec());
    for window in items.windows(2) {
        assert!(window[0].0 < window[1].0, "keys must be strictly ascending");
    }
    for (key, _) in &items {
        assert!(key.as_slice() >= b"key00100".as_slice());
        assert!(key.as_slice() < b"key02500".as_slice());
    }
}

#[test]
fn test_scan_unmoved_by_concurrent_rewrites() {
    let dir = TempDir::new().unwrap();
    let env = Environment::open(dir.path().join("data.pkv")).unwrap();

    let mut txn = env.begin_write().unwrap();
    for i in 1..=1000u32 {
        txn.put(format!("key{i:04}").as_bytes(), b"original").unwrap();
    }
    txn.commit().unwrap();

    let reader = env.begin_read().unwrap();

    // Rewrite the middle of the keyspace behind the reader's back
    let mut txn = env.begin_write().unwrap();
    for i in 500..600u32 {
        txn.put(format!("key{i:04}").as_bytes(), b"rewritten").unwrap();
    }
    txn.commit().unwrap();

    let items: Vec<(Vec<u8>, Vec<u8>)> = reader
        .range(b"key0001", b"key1001")
        .unwrap()
        .map(|item| item.unwrap())
        .collect();

    assert_eq!(items.len(), 1000);
    for (i, (key, value)) in items.iter().enumerate() {
        assert_eq!(key, &format!("key{:04}", i + 1).into_bytes());
        assert_eq!(value, &b"original".to_vec());
    }

    // A reader begun after the rewrite sees the new values
    let reader2 = env.begin_read().unwrap();
    let rewritten = reader2
        .range(b"key0500", b"key0600")
        .unwrap()
        .map(|item| item.unwrap())
        .filter(|(_, v)| v == b"rewritten")
        .count();
    assert_eq!(rewritten, 100);
}

#[test]
fn test_scan_interleaved_with_writes_in_same_txn() {
    let dir = TempDir::new().unwrap();
    let env = Environment::open(dir.path().join("data.pkv")).unwrap();

    let mut txn = env.begin_write().unwrap();
    txn.put(b"a", b"1").unwrap();
    txn.put(b"b", b"2").unwrap();
    txn.put(b"c", b"3").unwrap();

    // The uncommitted working set is visible to the writer's own scans
    let keys: Vec<Vec<u8>> = txn
        .range(b"a", b"z")
        .unwrap()
        .map(|item| item.unwrap().0)
        .collect();
    assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    txn.commit().unwrap();
}

#[test]
fn test_scan_count_matches_population() {
    let dir = TempDir::new().unwrap();
    let env = Environment::open(dir.path().join("data.pkv")).unwrap();

    let mut txn = env.begin_write().unwrap();
    for i in 0..500u32 {
        txn.put(format!("x{i:03}").as_bytes(), b"v").unwrap();
    }
    txn.commit().unwrap();

    let mut txn = env.begin_write().unwrap();
    for i in (0..500u32).step_by(3) {
        txn.delete(format!("x{i:03}").as_bytes()).unwrap();
    }
    txn.commit().unwrap();

    // A count implemented by scanning, the way a client would do it
    let reader = env.begin_read().unwrap();
    let count = reader.range(b"x", b"y").unwrap().count();
    assert_eq!(count, 500 - 167);
}
