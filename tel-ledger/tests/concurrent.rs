//! Concurrent writers against one ledger

use std::collections::HashSet;
use std::thread;
use tel_core::verify_proof;
use tel_ledger::testutil::{owner, TestLedger};
use tel_types::{AnchorScope, RecordId, WindowKey};

#[test]
fn test_concurrent_appends_get_unique_ids() {
    let t = TestLedger::new();

    // 8 writers, each appending 25 records under its own owner
    let handles: Vec<_> = (0..8)
        .map(|writer| {
            let ledger = t.ledger.clone();
            thread::spawn(move || {
                let me = owner(&format!("writer-{}", writer));
                (0..25)
                    .map(|i| {
                        ledger
                            .append(&me, &format!("writer {} entry {}", writer, i))
                            .unwrap_or_else(|e| panic!("writer {} append {} failed: {}", writer, i, e))
                            .id
                    })
                    .collect::<Vec<RecordId>>()
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        for id in handle.join().expect("writer panicked") {
            assert!(ids.insert(id), "Duplicate record id {}", id);
        }
    }
    assert_eq!(ids.len(), 200);

    let window = WindowKey::parse("2024-05-01").unwrap();
    let anchor = t.ledger.anchor(window, &AnchorScope::Global).unwrap();
    assert_eq!(anchor.leaf_count, 200);

    for id in ids {
        let proof = t.ledger.inclusion_proof(id).unwrap();
        assert_eq!(proof.root_hash, anchor.root_hash);
        assert!(verify_proof(&proof).is_ok());
    }
}

#[test]
fn test_anchoring_while_writing() {
    let t = TestLedger::new();
    let window = WindowKey::parse("2024-05-01").unwrap();
    t.ledger.append(&owner("seed"), "seed").unwrap();

    let writer = {
        let ledger = t.ledger.clone();
        thread::spawn(move || {
            for i in 0..50 {
                ledger.append(&owner("writer"), &format!("entry {}", i)).unwrap();
            }
        })
    };
    let anchorer = {
        let ledger = t.ledger.clone();
        thread::spawn(move || {
            (0..20)
                .map(|_| ledger.anchor(window, &AnchorScope::Global).unwrap())
                .collect::<Vec<_>>()
        })
    };

    writer.join().expect("writer panicked");
    let anchors = anchorer.join().expect("anchorer panicked");

    // Each anchor saw a consistent prefix of the writes
    assert!(anchors.windows(2).all(|w| w[0].leaf_count <= w[1].leaf_count));

    // Whatever is stored last is internally consistent
    let latest = t.ledger.anchor_for(&window, &AnchorScope::Global).unwrap().unwrap();
    assert_eq!(latest, *anchors.last().unwrap());
    let seed_proof = t.ledger.inclusion_proof(RecordId(1)).unwrap();
    assert_eq!(seed_proof.root_hash, latest.root_hash);
    assert!(verify_proof(&seed_proof).is_ok());
}
