use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub session_id: Uuid,
    pub file_name: String,
    pub fingerprint: String,
}

impl CacheKey {
    pub fn new(session_id: Uuid, file_name: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            session_id,
            file_name: file_name.into(),
            fingerprint: fingerprint.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}@{}", self.session_id, self.file_name, self.fingerprint)
    }
}

/// Built engines for one session. Unbounded unless a capacity is given, in
/// which case the oldest insertion is evicted first.
pub struct IndexCache<V> {
    entries: HashMap<CacheKey, Arc<V>>,
    order: VecDeque<CacheKey>,
    capacity: Option<usize>,
}

impl<V> IndexCache<V> {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.map(|c| c.max(1)),
        }
    }

    pub fn lookup(&self, key: &CacheKey) -> Option<Arc<V>> {
        self.entries.get(key).cloned()
    }

    pub fn insert(&mut self, key: CacheKey, value: Arc<V>) -> Vec<Arc<V>> {
        let mut evicted = Vec::new();

        if let Some(previous) = self.entries.insert(key.clone(), value) {
            self.order.retain(|k| k != &key);
            evicted.push(previous);
        }
        self.order.push_back(key);

        if let Some(capacity) = self.capacity {
            while self.entries.len() > capacity {
                let Some(oldest) = self.order.pop_front() else {
                    break;
                };
                if let Some(value) = self.entries.remove(&oldest) {
                    tracing::debug!("Evicted {oldest} from the index cache");
                    evicted.push(value);
                }
            }
        }

        evicted
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn drain(&mut self) -> Vec<Arc<V>> {
        self.order.clear();
        self.entries.drain().map(|(_, v)| v).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(session: Uuid, name: &str, fp: &str) -> CacheKey {
        CacheKey::new(session, name, fp)
    }

    #[test]
    fn lookup_returns_the_inserted_entry() {
        let session = Uuid::new_v4();
        let mut cache = IndexCache::new(None);
        assert!(cache.lookup(&key(session, "a.pdf", "1")).is_none());

        let evicted = cache.insert(key(session, "a.pdf", "1"), Arc::new("engine-a"));
        assert!(evicted.is_empty());
        assert_eq!(*cache.lookup(&key(session, "a.pdf", "1")).unwrap(), "engine-a");
    }

    #[test]
    fn same_name_with_different_content_is_a_different_entry() {
        let session = Uuid::new_v4();
        let mut cache = IndexCache::new(None);
        cache.insert(key(session, "a.pdf", "1"), Arc::new(1));
        cache.insert(key(session, "a.pdf", "2"), Arc::new(2));

        assert_eq!(cache.len(), 2);
        assert_eq!(*cache.lookup(&key(session, "a.pdf", "2")).unwrap(), 2);
    }

    #[test]
    fn keys_are_scoped_to_their_session() {
        let mut cache = IndexCache::new(None);
        cache.insert(key(Uuid::new_v4(), "a.pdf", "1"), Arc::new(1));
        assert!(!cache.contains(&key(Uuid::new_v4(), "a.pdf", "1")));
    }

    #[test]
    fn unbounded_by_default() {
        let session = Uuid::new_v4();
        let mut cache = IndexCache::new(None);
        for i in 0..100 {
            assert!(cache.insert(key(session, "a.pdf", &i.to_string()), Arc::new(i)).is_empty());
        }
        assert_eq!(cache.len(), 100);
    }

    #[test]
    fn capacity_evicts_oldest_insertion() {
        let session = Uuid::new_v4();
        let mut cache = IndexCache::new(Some(2));
        cache.insert(key(session, "a.pdf", "a"), Arc::new('a'));
        cache.insert(key(session, "b.pdf", "b"), Arc::new('b'));
        let evicted = cache.insert(key(session, "c.pdf", "c"), Arc::new('c'));

        assert_eq!(evicted.len(), 1);
        assert_eq!(*evicted[0], 'a');
        assert!(!cache.contains(&key(session, "a.pdf", "a")));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn drain_empties_the_cache() {
        let session = Uuid::new_v4();
        let mut cache = IndexCache::new(None);
        cache.insert(key(session, "a.pdf", "a"), Arc::new(1));
        assert_eq!(cache.drain().len(), 1);
        assert!(cache.is_empty());
    }
}
