// packages/engine/src/identity/object_id_map.rs
//! Default identity store keyed by allocation address

use crate::exclusion::normalize_type_name;
use crate::identity::IdentityStore;
use crate::probe::{ObjectId, NULL_OBJECT_ID};
use crate::recording::value::{ObjectRef, Recordable};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

struct Slot {
    id: ObjectId,
    value: Weak<dyn Recordable>,
}

/// Weakly retained address → id map
///
/// Each slot holds a `Weak`, which keeps the allocation (not the value)
/// reserved, so an address cannot be reused by another value while its slot
/// exists. Slots whose value has been dropped are purged once the map grows
/// past its capacity.
pub struct ObjectIdMap {
    slots: DashMap<usize, Slot>,
    next_id: AtomicI64,
    purge_threshold: AtomicUsize,
    capacity: usize,
    latest_by_type: Mutex<LruCache<String, Weak<dyn Recordable>>>,
}

impl ObjectIdMap {
    pub fn new(capacity: usize, type_cache_capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let type_cache_capacity = NonZeroUsize::new(type_cache_capacity).unwrap_or(NonZeroUsize::MIN);

        Self {
            slots: DashMap::with_capacity(capacity.min(1 << 16)),
            next_id: AtomicI64::new(NULL_OBJECT_ID + 1),
            purge_threshold: AtomicUsize::new(capacity),
            capacity,
            latest_by_type: Mutex::new(LruCache::new(type_cache_capacity)),
        }
    }

    /// Number of slots, live or not yet purged
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop slots whose value is gone. Returns how many were removed.
    pub fn purge(&self) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| slot.value.strong_count() > 0);
        let after = self.slots.len();

        // Live entries above capacity: wait for the map to double before trying again
        self.purge_threshold
            .store(self.capacity.max(after * 2), Ordering::Relaxed);

        debug!("Purged {} dead identity slots ({} live)", before - after, after);
        before - after
    }

    fn mint(&self) -> ObjectId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn remember_type(&self, value: &ObjectRef) {
        if let Some(key) = simplify_type_name(value.type_name()) {
            self.latest_by_type.lock().put(key, Arc::downgrade(value));
        }
    }
}

impl Default for ObjectIdMap {
    fn default() -> Self {
        Self::new(1 << 16, 1024)
    }
}

impl IdentityStore for ObjectIdMap {
    fn id_for(&self, value: &ObjectRef) -> ObjectId {
        let address = Arc::as_ptr(value) as *const () as usize;

        let id = match self.slots.entry(address) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().value.strong_count() > 0 {
                    occupied.get().id
                } else {
                    let id = self.mint();
                    occupied.insert(Slot {
                        id,
                        value: Arc::downgrade(value),
                    });
                    id
                }
            }
            Entry::Vacant(vacant) => {
                let id = self.mint();
                vacant.insert(Slot {
                    id,
                    value: Arc::downgrade(value),
                });
                id
            }
        };

        if self.slots.len() > self.purge_threshold.load(Ordering::Relaxed) {
            self.purge();
        }

        self.remember_type(value);
        id
    }

    fn issue_id(&self) -> ObjectId {
        self.mint()
    }

    fn most_recent_instance_of_type(&self, type_name: &str) -> Option<ObjectRef> {
        let key = simplify_type_name(type_name)?;
        let mut cache = self.latest_by_type.lock();

        match cache.get(&key).map(Weak::upgrade) {
            Some(Some(live)) => Some(live),
            Some(None) => {
                cache.pop(&key);
                None
            }
            None => None,
        }
    }
}

/// Dotted type name without generic arguments; `None` for closures
pub fn simplify_type_name(type_name: &str) -> Option<String> {
    if type_name.contains("{{closure}}") {
        return None;
    }
    let base = match type_name.find('<') {
        Some(index) => &type_name[..index],
        None => type_name,
    };
    let base = base.trim();
    if base.is_empty() {
        return None;
    }
    Some(normalize_type_name(base).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use std::thread;

    #[derive(Serialize)]
    struct Account {
        number: u32,
    }

    crate::impl_recordable!(Account);

    fn account(number: u32) -> ObjectRef {
        Arc::new(Account { number })
    }

    #[test]
    fn test_same_value_same_id() {
        let map = ObjectIdMap::default();
        let a = account(1);
        let b = account(1);

        let id_a = map.id_for(&a);
        assert_eq!(map.id_for(&a), id_a);
        assert_eq!(map.id_for(&Arc::clone(&a)), id_a);
        assert_ne!(map.id_for(&b), id_a);
        assert!(id_a > NULL_OBJECT_ID);
    }

    #[test]
    fn test_dead_values_are_purged() {
        let map = ObjectIdMap::new(4, 8);
        let keep = account(0);
        let keep_id = map.id_for(&keep);

        for n in 0..32 {
            let temp = account(n);
            map.id_for(&temp);
        }

        assert!(map.len() <= 5);
        assert_eq!(map.id_for(&keep), keep_id);
    }

    #[test]
    fn test_issue_id_never_collides() {
        let map = ObjectIdMap::default();
        let value = account(3);
        let a = map.id_for(&value);
        let b = map.issue_id();
        let c = map.issue_id();
        assert!(a != b && b != c && a != c);
    }

    #[test]
    fn test_most_recent_instance() {
        let map = ObjectIdMap::default();
        let first = account(1);
        let second = account(2);
        map.id_for(&first);
        map.id_for(&second);

        let name = std::any::type_name::<Account>();
        let latest = map.most_recent_instance_of_type(name).unwrap();
        assert!(Arc::ptr_eq(&latest, &second));

        drop(latest);
        drop(second);
        assert!(map.most_recent_instance_of_type(name).is_none());
    }

    #[test]
    fn test_simplify_type_name() {
        assert_eq!(
            simplify_type_name("alloc::vec::Vec<u8>").as_deref(),
            Some("alloc.vec.Vec")
        );
        assert_eq!(simplify_type_name("app.Order").as_deref(), Some("app.Order"));
        assert_eq!(simplify_type_name("app::main::{{closure}}"), None);
    }

    #[test]
    fn test_concurrent_ids_are_unique() {
        let map = Arc::new(ObjectIdMap::default());
        let values: Vec<ObjectRef> = (0..64).map(account).collect();
        let values = Arc::new(values);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let map = Arc::clone(&map);
                let values = Arc::clone(&values);
                thread::spawn(move || values.iter().map(|v| map.id_for(v)).collect::<Vec<_>>())
            })
            .collect();

        let results: Vec<Vec<ObjectId>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for ids in &results[1..] {
            assert_eq!(ids, &results[0]);
        }
        let mut distinct = results[0].clone();
        distinct.sort_unstable();
        distinct.dedup();
        assert_eq!(distinct.len(), 64);
    }
}
