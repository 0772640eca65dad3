//! Process-local memory tier.
//!
//! Each cache owns its own `MemoryStore`, so the schema and facet namespaces
//! never share keys. Entries remember the schema they were derived from, which
//! lets invalidation remove exactly the entries of one scope.

use std::num::NonZeroUsize;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use lru::LruCache;
use time::OffsetDateTime;
use tracing::warn;

use super::payload::CachePayload;

/// Deserialized mirror of a persisted cache row.
#[derive(Debug, Clone)]
pub struct MemoryEntry {
    pub scope_id: Option<i64>,
    pub payload: CachePayload,
    pub expires_at: Option<OffsetDateTime>,
}

impl MemoryEntry {
    pub fn new(
        scope_id: Option<i64>,
        payload: CachePayload,
        expires_at: Option<OffsetDateTime>,
    ) -> Self {
        Self {
            scope_id,
            payload,
            expires_at,
        }
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|expires| expires <= now)
    }
}

/// LRU-bounded, thread-safe map of composite keys to cached payloads.
pub struct MemoryStore {
    namespace: &'static str,
    enabled: bool,
    entries: RwLock<LruCache<String, MemoryEntry>>,
}

impl MemoryStore {
    pub fn new(namespace: &'static str, limit: NonZeroUsize, enabled: bool) -> Self {
        Self {
            namespace,
            enabled,
            entries: RwLock::new(LruCache::new(limit)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the payload for `key` unless it is absent or expired.
    pub fn get(&self, key: &str) -> Option<CachePayload> {
        self.get_at(key, OffsetDateTime::now_utc())
    }

    pub fn get_at(&self, key: &str, now: OffsetDateTime) -> Option<CachePayload> {
        if !self.enabled {
            return None;
        }
        let mut entries = self.write("get");
        let expired = match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Some(entry.payload.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    /// Inserts or replaces `key`; returns the key evicted to make room, if any.
    pub fn insert(&self, key: String, entry: MemoryEntry) -> Option<String> {
        if !self.enabled {
            return None;
        }
        self.write("insert")
            .push(key.clone(), entry)
            .and_then(|(evicted, _)| (evicted != key).then_some(evicted))
    }

    /// Removes every entry derived from `scope_id`.
    pub fn remove_scope(&self, scope_id: i64) -> usize {
        self.remove_where(|_, entry| entry.scope_id == Some(scope_id))
    }

    pub fn remove_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&str, &MemoryEntry) -> bool,
    {
        let mut entries = self.write("remove_where");
        let doomed: Vec<String> = entries
            .iter()
            .filter(|(key, entry)| predicate(key.as_str(), entry))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            entries.pop(key);
        }
        doomed.len()
    }

    pub fn clear(&self) -> usize {
        let mut entries = self.write("clear");
        let removed = entries.len();
        entries.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.read("len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.read("contains_key").contains(key)
    }

    fn read(&self, op: &'static str) -> RwLockReadGuard<'_, LruCache<String, MemoryEntry>> {
        self.entries.read().unwrap_or_else(|poisoned| {
            warn!(
                op,
                namespace = self.namespace,
                lock_kind = "rwlock.read",
                result = "poisoned_recovered",
                "Recovered from poisoned memory tier lock"
            );
            poisoned.into_inner()
        })
    }

    fn write(&self, op: &'static str) -> RwLockWriteGuard<'_, LruCache<String, MemoryEntry>> {
        self.entries.write().unwrap_or_else(|poisoned| {
            warn!(
                op,
                namespace = self.namespace,
                lock_kind = "rwlock.write",
                result = "poisoned_recovered",
                "Recovered from poisoned memory tier lock"
            );
            poisoned.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::time::Duration;

    use serde_json::{Map, Value};

    use super::*;

    fn store(limit: usize) -> MemoryStore {
        MemoryStore::new(
            "test",
            NonZeroUsize::new(limit).expect("non-zero limit"),
            true,
        )
    }

    fn properties(scope: i64) -> MemoryEntry {
        let mut properties = Map::new();
        properties.insert("scope".to_string(), Value::from(scope));
        MemoryEntry::new(Some(scope), CachePayload::Properties { properties }, None)
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let store = store(8);
        assert!(store.get("properties_1").is_none());

        store.insert("properties_1".to_string(), properties(1));

        let payload = store.get("properties_1").expect("cached payload");
        assert_eq!(payload.artifact(), "properties");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn expired_entries_are_dropped_on_read() {
        let store = store(8);
        let now = OffsetDateTime::now_utc();
        let mut entry = properties(1);
        entry.expires_at = Some(now - Duration::from_secs(1));
        store.insert("properties_1".to_string(), entry);

        assert!(store.get_at("properties_1", now).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn remove_scope_only_touches_that_schema() {
        let store = store(8);
        store.insert("properties_7".to_string(), properties(7));
        store.insert("configuration_7".to_string(), properties(7));
        store.insert("properties_17".to_string(), properties(17));
        store.insert("properties_70".to_string(), properties(70));

        assert_eq!(store.remove_scope(7), 2);
        assert!(store.contains_key("properties_17"));
        assert!(store.contains_key("properties_70"));
        assert_eq!(store.remove_scope(7), 0);
    }

    #[test]
    fn remove_scope_races_with_concurrent_inserts() {
        let store = store(1024);

        std::thread::scope(|scope| {
            for writer in 0..4 {
                let store = &store;
                scope.spawn(move || {
                    for n in 0..50 {
                        store.insert(format!("properties_7_{writer}_{n}"), properties(7));
                        store.insert(format!("properties_17_{writer}_{n}"), properties(17));
                    }
                });
            }
            scope.spawn(|| {
                for _ in 0..50 {
                    store.remove_scope(7);
                    std::thread::yield_now();
                }
            });
        });

        store.remove_scope(7);
        assert_eq!(store.len(), 200);
        for writer in 0..4 {
            for n in 0..50 {
                assert!(!store.contains_key(&format!("properties_7_{writer}_{n}")));
                assert!(store.contains_key(&format!("properties_17_{writer}_{n}")));
            }
        }
        assert_eq!(store.remove_scope(7), 0);
    }

    #[test]
    fn lru_eviction_reports_evicted_key() {
        let store = store(2);
        assert!(store.insert("a".to_string(), properties(1)).is_none());
        assert!(store.insert("b".to_string(), properties(2)).is_none());
        assert_eq!(
            store.insert("c".to_string(), properties(3)),
            Some("a".to_string())
        );
        assert!(store.get("a").is_none());
        assert!(store.get("c").is_some());
    }

    #[test]
    fn replacing_a_key_is_not_an_eviction() {
        let store = store(1);
        store.insert("a".to_string(), properties(1));
        assert!(store.insert("a".to_string(), properties(1)).is_none());
    }

    #[test]
    fn disabled_store_never_holds_entries() {
        let store = MemoryStore::new("off", NonZeroUsize::MIN, false);
        store.insert("a".to_string(), properties(1));
        assert!(store.get("a").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn store_recovers_from_poisoned_lock() {
        let store = store(4);

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store
                .entries
                .write()
                .expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        store.insert("a".to_string(), properties(1));
        assert!(store.get("a").is_some());
    }
}
