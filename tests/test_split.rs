//! Byte-size split behavior with variable-length cells

use pagekv::{Environment, Error};
use tempfile::TempDir;

#[test]
fn test_small_cells_then_one_huge_cell() {
    let dir = TempDir::new().unwrap();
    let env = Environment::open(dir.path().join("data.pkv")).unwrap();

    // 100 cells of ~43 bytes, then one cell of ~3910 bytes; every
    // resulting leaf must fit a 4 KiB page, which the engine proves by
    // validating each page it later reads back
    let mut txn = env.begin_write().unwrap();
    for i in 0..100u32 {
        // 8 bytes of overhead + 7 key bytes + 28 value bytes
        txn.put(format!("c{i:06}").as_bytes(), &[b'v'; 28]).unwrap();
    }
    txn.put(b"zz-huge", &[b'V'; 3895]).unwrap();
    txn.commit().unwrap();

    let reader = env.begin_read().unwrap();
    assert_eq!(reader.get(b"zz-huge").unwrap(), Some(vec![b'V'; 3895]));
    let count = reader.range(b"c", b"{").unwrap().count();
    assert_eq!(count, 101);
}

#[test]
fn test_branch_splits_with_mixed_separator_sizes() {
    let dir = TempDir::new().unwrap();
    let env = Environment::open(dir.path().join("data.pkv")).unwrap();

    // Long keys become long branch separators as leaves split: 200 short
    // keys and 10 near-limit keys force branch pages to split by byte
    // size rather than entry count
    let long = |i: u32| {
        let mut key = format!("long{i:02}-").into_bytes();
        key.resize(900, b'x');
        key
    };
    let mut txn = env.begin_write().unwrap();
    for i in 0..200u32 {
        txn.put(format!("s{i:04}").as_bytes(), &[b'v'; 64]).unwrap();
    }
    for i in 0..10u32 {
        txn.put(&long(i), &[b'w'; 512]).unwrap();
    }
    // Pad with more bulk so the tree grows several branch levels
    for i in 0..3000u32 {
        txn.put(format!("bulk{i:05}").as_bytes(), &[b'u'; 100]).unwrap();
    }
    txn.commit().unwrap();

    let reader = env.begin_read().unwrap();
    for i in 0..200u32 {
        assert_eq!(
            reader.get(format!("s{i:04}").as_bytes()).unwrap(),
            Some(vec![b'v'; 64])
        );
    }
    for i in 0..10u32 {
        assert_eq!(reader.get(&long(i)).unwrap(), Some(vec![b'w'; 512]));
    }
    let keys: Vec<Vec<u8>> = reader
        .range(b"a", b"|")
        .unwrap()
        .map(|item| item.unwrap().0)
        .collect();
    assert_eq!(keys.len(), 3210);
    assert!(keys.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_value_too_large_rejected_and_db_unchanged() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.pkv");
    let env = Environment::open(&path).unwrap();

    let mut txn = env.begin_write().unwrap();
    txn.put(b"before", b"1").unwrap();
    txn.commit().unwrap();

    let mut txn = env.begin_write().unwrap();
    let err = txn.put(b"big", &[0u8; 5000]).unwrap_err();
    assert!(matches!(err, Error::ValueTooLarge { .. }));
    txn.abort();

    let reader = env.begin_read().unwrap();
    assert_eq!(reader.get(b"big").unwrap(), None);
    assert_eq!(reader.get(b"before").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn test_oversized_key_rejected() {
    let dir = TempDir::new().unwrap();
    let env = Environment::open(dir.path().join("data.pkv")).unwrap();

    // The key bound guarantees at least four cells per leaf
    let mut txn = env.begin_write().unwrap();
    let key = vec![b'k'; 2000];
    assert!(matches!(
        txn.put(&key, b"v"),
        Err(Error::ValueTooLarge { .. })
    ));

    // A key just under the bound is accepted
    let key = vec![b'k'; 1000];
    txn.put(&key, b"v").unwrap();
    txn.commit().unwrap();

    let reader = env.begin_read().unwrap();
    assert_eq!(reader.get(&vec![b'k'; 1000]).unwrap(), Some(b"v".to_vec()));
}

#[test]
fn test_values_near_the_page_boundary() {
    let dir = TempDir::new().unwrap();
    let env = Environment::open(dir.path().join("data.pkv")).unwrap();

    // max_cell_size(4096) = 4096 - 32 - 4 - 8 = 4052 bytes of key+value
    let mut txn = env.begin_write().unwrap();
    txn.put(b"a", &[1u8; 4051]).unwrap();
    txn.put(b"b", &[2u8; 4051]).unwrap();
    assert!(matches!(
        txn.put(b"c", &[3u8; 4052]),
        Err(Error::ValueTooLarge { .. })
    ));
    txn.commit().unwrap();

    let reader = env.begin_read().unwrap();
    assert_eq!(reader.get(b"a").unwrap(), Some(vec![1u8; 4051]));
    assert_eq!(reader.get(b"b").unwrap(), Some(vec![2u8; 4051]));
}
