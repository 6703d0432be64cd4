use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use crate::error::OdataError;

#[derive(Debug)]
pub struct MemoCache<K, V> {
    entries: Mutex<HashMap<K, Arc<V>>>,
}

impl<K, V> Default for MemoCache<K, V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone, V> MemoCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.lock().ok()?.get(key).cloned()
    }

    /// The lock is not held while loading; a concurrent duplicate load keeps the first result.
    pub fn get_or_try_insert_with<F>(&self, key: K, load: F) -> Result<Arc<V>, OdataError>
    where
        F: FnOnce() -> Result<V, OdataError>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = Arc::new(load()?);
        let mut entries = self.lock()?;
        Ok(entries.entry(key).or_insert(value).clone())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.lock() {
            entries.clear();
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<K, Arc<V>>>, OdataError> {
        self.entries
            .lock()
            .map_err(|_| OdataError::Validation("session cache lock poisoned".to_string()))
    }
}
