//! Versioned hash map: the engine's worked example of a data structure whose
//! every shared read goes through versioned pointers.
//!
//! Buckets hold the head of an immutable entry chain. Entries are prepended
//! and never mutated after publication; value updates publish a new version
//! into the entry's value cell, and removals republish the chain without the
//! doomed entry. Writers serialize on a per-bucket mutex; readers follow the
//! versioned chain and never lock.

use parking_lot::Mutex;

use scee::{Ctx, FixedPtr, VPtr};

use crate::types::{Key, Lookup, RetCode, Val};

/// A chained entry. `next` is fixed at construction; the value cell is the
/// only mutable part, and it mutates by version publication.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Entry {
    key: Key,
    key_pad: u32,
    val_cell: FixedPtr<VPtr<Val>>,
    next: FixedPtr<Entry>,
}

// No padding: the explicit pad word keeps the byte image unique, which the
// validator's object comparison requires.
unsafe impl scee::Plain for Entry {}
const _: () = assert!(std::mem::size_of::<Entry>() == 24);

pub struct KvStore {
    capacity: usize,
    buckets: Box<[VPtr<Entry>]>,
    locks: Box<[Mutex<()>]>,
}

impl KvStore {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be positive");
        Self {
            capacity,
            buckets: (0..capacity).map(|_| VPtr::new_null()).collect(),
            locks: (0..capacity).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Leak into a `'static` handle suitable for closure arguments.
    pub fn leak(self) -> &'static KvStore {
        Box::leak(Box::new(self))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn slot(&self, key: &Key) -> usize {
        key.hash() as usize % self.capacity
    }
}

impl Drop for KvStore {
    // Direct teardown; the caller must ensure no closure referencing the
    // store is still unvalidated.
    fn drop(&mut self) {
        for bucket in self.buckets.iter() {
            let mut cur = bucket.load();
            while !cur.is_null() {
                unsafe {
                    let entry = Box::from_raw(cur as *mut Entry);
                    let cell = entry.val_cell.as_ptr();
                    if !cell.is_null() {
                        let payload = (*cell).load();
                        if !payload.is_null() {
                            drop(Box::from_raw(payload as *mut Val));
                        }
                        drop(Box::from_raw(cell as *mut VPtr<Val>));
                    }
                    cur = entry.next.as_ptr();
                }
            }
        }
    }
}

pub fn kv_get<C: Ctx>(ctx: &mut C, store: &KvStore, key: Key) -> Lookup {
    let slot = store.slot(&key);
    let mut cur = ctx.load(&store.buckets[slot]);
    while let Some(entry) = cur {
        if entry.key == key {
            let Some(cell) = entry.val_cell.get() else {
                return Lookup::miss();
            };
            return match ctx.load(cell) {
                Some(val) => Lookup::hit(*val),
                None => Lookup::miss(),
            };
        }
        cur = entry.next.get();
    }
    Lookup::miss()
}

pub fn kv_set<C: Ctx>(ctx: &mut C, store: &KvStore, key: Key, val: Val) -> RetCode {
    let slot = store.slot(&key);
    let _guard = ctx.lock(&store.locks[slot]);
    let cell = &store.buckets[slot];
    let head = ctx.load(cell);

    let mut cur = head;
    while let Some(entry) = cur {
        if entry.key == key {
            if let Some(vcell) = entry.val_cell.get() {
                ctx.replace(vcell, val);
            }
            return RetCode::Stored;
        }
        cur = entry.next.get();
    }

    let val_cell = ctx.new_cell(val);
    let entry = ctx.new_obj(Entry {
        key,
        key_pad: 0,
        val_cell,
        next: FixedPtr::from_ref(head),
    });
    ctx.publish(cell, entry);
    RetCode::Created
}

pub fn kv_del<C: Ctx>(ctx: &mut C, store: &KvStore, key: Key) -> RetCode {
    let slot = store.slot(&key);
    let _guard = ctx.lock(&store.locks[slot]);
    let cell = &store.buckets[slot];
    let head = ctx.load(cell);

    let mut depth = 0usize;
    let mut victim = None;
    let mut cur = head;
    while let Some(entry) = cur {
        if entry.key == key {
            victim = Some(entry);
            break;
        }
        depth += 1;
        cur = entry.next.get();
    }
    let Some(victim) = victim else {
        return RetCode::NotFound;
    };

    // Stash the prefix above the victim; the scratch dies with the closure.
    let prefix = scee::arena::bulk_alloc_slice::<&Entry>(depth);
    let mut cur = head;
    let mut filled = 0;
    while filled < depth {
        let Some(entry) = cur else { break };
        prefix[filled].write(entry);
        cur = entry.next.get();
        filled += 1;
    }

    // Republish the chain without the victim, deepest prefix entry first.
    let mut new_head = victim.next;
    for i in (0..filled).rev() {
        let entry = unsafe { prefix[i].assume_init() };
        new_head = ctx.new_obj(Entry {
            key: entry.key,
            key_pad: 0,
            val_cell: entry.val_cell,
            next: new_head,
        });
    }
    ctx.publish(cell, new_head);

    // The victim, its value cell, and the copied-over prefix entries are now
    // unreachable from the bucket.
    ctx.retire_cell(victim.val_cell);
    ctx.retire_obj(FixedPtr::from_ref(Some(victim)));
    for i in 0..filled {
        let entry = unsafe { prefix[i].assume_init() };
        ctx.retire_obj(FixedPtr::from_ref(Some(entry)));
    }
    RetCode::Deleted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{checked_del, checked_get, checked_set};
    use scee::main_thread;

    fn key(s: &[u8; 4]) -> Key {
        Key(*s)
    }

    fn val(s: &[u8; 8]) -> Val {
        Val(*s)
    }

    #[test]
    fn create_store_and_lookup() {
        let store = KvStore::new(64).leak();
        main_thread(|| {
            assert_eq!(checked_set(store, key(b"abcd"), val(b"01234567")), RetCode::Created);
            let got = checked_get(store, key(b"abcd"));
            assert!(got.found());
            assert_eq!(got.val, val(b"01234567"));

            assert_eq!(checked_set(store, key(b"abcd"), val(b"11111111")), RetCode::Stored);
            let got = checked_get(store, key(b"abcd"));
            assert_eq!(got.val, val(b"11111111"));
        });
    }

    #[test]
    fn miss_on_empty_store() {
        let store = KvStore::new(64).leak();
        main_thread(|| {
            assert!(!checked_get(store, key(b"zzzz")).found());
        });
    }

    #[test]
    fn chains_survive_collisions() {
        // Capacity 1 forces every key into one bucket.
        let store = KvStore::new(1).leak();
        main_thread(|| {
            let keys: [&[u8; 4]; 5] = [b"aaaa", b"bbbb", b"cccc", b"dddd", b"eeee"];
            for (i, k) in keys.iter().enumerate() {
                let v = Val([b'0' + i as u8; 8]);
                assert_eq!(checked_set(store, key(k), v), RetCode::Created);
            }
            for (i, k) in keys.iter().enumerate() {
                let got = checked_get(store, key(k));
                assert!(got.found());
                assert_eq!(got.val, Val([b'0' + i as u8; 8]));
            }
        });
    }

    #[test]
    fn delete_head_middle_and_tail() {
        let store = KvStore::new(1).leak();
        main_thread(|| {
            for k in [b"aaaa", b"bbbb", b"cccc", b"dddd"] {
                checked_set(store, key(k), val(b"xxxxxxxx"));
            }
            // Chain order is reverse insertion: dddd, cccc, bbbb, aaaa.
            assert_eq!(checked_del(store, key(b"dddd")), RetCode::Deleted); // head
            assert_eq!(checked_del(store, key(b"bbbb")), RetCode::Deleted); // middle
            assert_eq!(checked_del(store, key(b"aaaa")), RetCode::Deleted); // tail
            assert_eq!(checked_del(store, key(b"zzzz")), RetCode::NotFound);

            assert!(!checked_get(store, key(b"dddd")).found());
            assert!(!checked_get(store, key(b"bbbb")).found());
            assert!(!checked_get(store, key(b"aaaa")).found());
            let got = checked_get(store, key(b"cccc"));
            assert!(got.found());
            assert_eq!(got.val, val(b"xxxxxxxx"));
        });
    }

    #[test]
    fn delete_then_reinsert() {
        let store = KvStore::new(8).leak();
        main_thread(|| {
            assert_eq!(checked_set(store, key(b"abcd"), val(b"00000000")), RetCode::Created);
            assert_eq!(checked_del(store, key(b"abcd")), RetCode::Deleted);
            assert_eq!(checked_del(store, key(b"abcd")), RetCode::NotFound);
            assert_eq!(checked_set(store, key(b"abcd"), val(b"22222222")), RetCode::Created);
            assert_eq!(checked_get(store, key(b"abcd")).val, val(b"22222222"));
        });
    }

    #[test]
    fn teardown_frees_chains() {
        let store: &'static KvStore = KvStore::new(2).leak();
        main_thread(|| {
            for k in [b"aaaa", b"bbbb", b"cccc"] {
                checked_set(store, key(k), val(b"tttttttt"));
            }
            checked_del(store, key(b"bbbb"));
        });
        // Every closure was validated when main_thread returned, so direct
        // teardown is safe.
        unsafe { drop(Box::from_raw(store as *const KvStore as *mut KvStore)) };
    }

    #[test]
    fn concurrent_workers_share_the_store() {
        use scee::AppThread;

        let store = KvStore::new(256).leak();
        let writers: Vec<_> = (0..4u8)
            .map(|w| {
                AppThread::spawn(move || {
                    for i in 0..200u32 {
                        let k = Key([w, (i >> 8) as u8, i as u8, b'k']);
                        let v = Val([w; 8]);
                        assert_eq!(checked_set(store, k, v), RetCode::Created);
                        let got = checked_get(store, k);
                        assert!(got.found());
                        assert_eq!(got.val, v);
                    }
                })
            })
            .collect();
        for w in writers {
            w.join();
        }
        main_thread(|| {
            for w in 0..4u8 {
                for i in 0..200u32 {
                    let k = Key([w, (i >> 8) as u8, i as u8, b'k']);
                    assert_eq!(checked_get(store, k).val, Val([w; 8]));
                }
            }
        });
    }
}
