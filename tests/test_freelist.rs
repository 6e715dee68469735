//! Page reuse discipline: freed pages stay off-limits while any reader
//! can still observe them, and become available once the last such reader
//! leaves

use pagekv::Environment;
use tempfile::TempDir;

#[test]
fn test_long_lived_reader_blocks_reuse() {
    let dir = TempDir::new().unwrap();
    let env = Environment::open(dir.path().join("data.pkv")).unwrap();

    let mut txn = env.begin_write().unwrap();
    for i in 0..5000u32 {
        txn.put(format!("k{i:05}").as_bytes(), b"payload").unwrap();
    }
    txn.commit().unwrap();

    // Pin the original snapshot
    let reader = env.begin_read().unwrap();

    // Delete every other key across several commits
    for chunk in 0..5u32 {
        let mut txn = env.begin_write().unwrap();
        for i in (chunk * 1000..(chunk + 1) * 1000).step_by(2) {
            assert!(txn.delete(format!("k{i:05}").as_bytes()).unwrap());
        }
        txn.commit().unwrap();
    }

    // Everything those commits freed is pinned by the reader
    let stat = env.stat().unwrap();
    assert_eq!(stat.freelist_reusable, 0);
    assert!(stat.freelist_pending > 0);
    let grown_high_water = stat.high_water;

    // The reader still sees the full original snapshot
    for i in (0..5000u32).step_by(499) {
        assert_eq!(
            reader.get(format!("k{i:05}").as_bytes()).unwrap(),
            Some(b"payload".to_vec())
        );
    }
    drop(reader);

    // One further commit lets the next writer see the backlog as free
    let mut txn = env.begin_write().unwrap();
    txn.put(b"poke", b"1").unwrap();
    txn.commit().unwrap();

    let stat = env.stat().unwrap();
    assert!(stat.freelist_reusable > 0, "released pages become available");

    // With the backlog reusable, further churn stops growing the file
    let mut txn = env.begin_write().unwrap();
    for i in 0..500u32 {
        txn.put(format!("churn{i:04}").as_bytes(), b"x").unwrap();
    }
    txn.commit().unwrap();
    assert!(
        env.stat().unwrap().high_water <= grown_high_water + 2,
        "churn should be served almost entirely from reclaimed pages"
    );
}

#[test]
fn test_file_growth_bounded_without_readers() {
    let dir = TempDir::new().unwrap();
    let env = Environment::open(dir.path().join("data.pkv")).unwrap();

    let mut txn = env.begin_write().unwrap();
    for i in 0..1000u32 {
        txn.put(format!("k{i:04}").as_bytes(), b"0123456789abcdef").unwrap();
    }
    txn.commit().unwrap();
    // A second commit turns the first one's frees into reusable pages
    let mut txn = env.begin_write().unwrap();
    txn.put(b"tick", b"1").unwrap();
    txn.commit().unwrap();

    // Steady-state churn: rewrite the same keys over and over
    let rewrite_all = |round: u32| {
        let mut txn = env.begin_write().unwrap();
        for i in 0..1000u32 {
            txn.put(
                format!("k{i:04}").as_bytes(),
                format!("round{round:011}").as_bytes(),
            )
            .unwrap();
        }
        txn.commit().unwrap();
    };

    for round in 0..10u32 {
        rewrite_all(round);
    }
    let settled = env.stat().unwrap().high_water;
    for round in 10..20u32 {
        rewrite_all(round);
    }
    let final_high_water = env.stat().unwrap().high_water;

    // The first rounds may grow the file to build CoW headroom; once the
    // free pool covers a full tree rewrite, growth must stop
    assert!(
        final_high_water <= settled + 5,
        "steady-state churn grew the file from {settled} to {final_high_water} pages"
    );
}

#[test]
fn test_fresh_reader_does_not_block_old_frees() {
    let dir = TempDir::new().unwrap();
    let env = Environment::open(dir.path().join("data.pkv")).unwrap();

    let mut txn = env.begin_write().unwrap();
    for i in 0..200u32 {
        txn.put(format!("k{i:03}").as_bytes(), b"v").unwrap();
    }
    txn.commit().unwrap();

    let mut txn = env.begin_write().unwrap();
    for i in 0..200u32 {
        txn.put(format!("k{i:03}").as_bytes(), b"w").unwrap();
    }
    txn.commit().unwrap();

    // This reader's snapshot postdates the frees above, so it cannot
    // reference the freed pages and must not hold them back
    let _reader = env.begin_read().unwrap();

    let stat = env.stat().unwrap();
    assert!(stat.freelist_reusable > 0);
}
