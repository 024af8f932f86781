use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReadStoreError {
    #[error("read store unavailable: {0}")]
    Unavailable(String),
}

/// Key/value store abstraction for disposable read models.
///
/// `list` and `find` return rows in ascending key order.
pub trait ReadStore<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Result<Option<V>, ReadStoreError>;
    fn upsert(&self, key: K, value: V) -> Result<(), ReadStoreError>;
    fn find(&self, predicate: &dyn Fn(&V) -> bool) -> Result<Vec<V>, ReadStoreError>;
    /// Drop every row (rebuild support).
    fn clear(&self) -> Result<(), ReadStoreError>;

    fn list(&self) -> Result<Vec<V>, ReadStoreError> {
        self.find(&|_| true)
    }
}

impl<K, V, S> ReadStore<K, V> for Arc<S>
where
    S: ReadStore<K, V> + ?Sized,
{
    fn get(&self, key: &K) -> Result<Option<V>, ReadStoreError> {
        (**self).get(key)
    }

    fn upsert(&self, key: K, value: V) -> Result<(), ReadStoreError> {
        (**self).upsert(key, value)
    }

    fn find(&self, predicate: &dyn Fn(&V) -> bool) -> Result<Vec<V>, ReadStoreError> {
        (**self).find(predicate)
    }

    fn clear(&self) -> Result<(), ReadStoreError> {
        (**self).clear()
    }

    fn list(&self) -> Result<Vec<V>, ReadStoreError> {
        (**self).list()
    }
}

/// In-memory read store for tests/dev.
#[derive(Debug)]
pub struct InMemoryReadStore<K, V> {
    inner: RwLock<BTreeMap<K, V>>,
    unavailable: AtomicBool,
}

impl<K, V> InMemoryReadStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BTreeMap::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulate an outage: every operation fails until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), ReadStoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ReadStoreError::Unavailable("read store offline".to_string()));
        }
        Ok(())
    }
}

impl<K, V> Default for InMemoryReadStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ReadStore<K, V> for InMemoryReadStore<K, V>
where
    K: Clone + Ord + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Result<Option<V>, ReadStoreError> {
        self.ensure_available()?;
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map.get(key).cloned())
    }

    fn upsert(&self, key: K, value: V) -> Result<(), ReadStoreError> {
        self.ensure_available()?;
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        map.insert(key, value);
        Ok(())
    }

    fn find(&self, predicate: &dyn Fn(&V) -> bool) -> Result<Vec<V>, ReadStoreError> {
        self.ensure_available()?;
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map.values().filter(|v| predicate(v)).cloned().collect())
    }

    fn clear(&self) -> Result<(), ReadStoreError> {
        self.ensure_available()?;
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        map.clear();
        Ok(())
    }
}

fn poisoned() -> ReadStoreError {
    ReadStoreError::Unavailable("lock poisoned".to_string())
}
