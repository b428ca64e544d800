//! Sustained mixed load with a single admitted validator: throughput may
//! degrade to sampling, but no record is lost and every reply stays correct.

use rand::Rng;

use scee::AppThread;
use scee_kv::ops::{checked_get, checked_set};
use scee_kv::{Key, KvStore, RetCode, Val};

#[test]
fn bounded_validators_under_sustained_load() {
    scee::set_max_validation_core(1);

    let store = KvStore::new(4096).leak();
    let workers: Vec<_> = (0..4u8)
        .map(|w| {
            AppThread::spawn(move || {
                let mut rng = rand::rng();
                for i in 0..2000u32 {
                    // (w, i) is unique, so every write creates.
                    let key = Key([w, (i >> 8) as u8, i as u8, b'L']);
                    let val = Val([rng.random::<u8>(); 8]);
                    assert_eq!(checked_set(store, key, val), RetCode::Created);
                    let got = checked_get(store, key);
                    assert!(got.found());
                    assert_eq!(got.val, val);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join();
    }
}
