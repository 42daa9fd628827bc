//! In-memory record store.
//!
//! Data is lost when the store is dropped. Used by toy studies that refit
//! thousands of times from a fixed starting point, and by tests.

use rustc_hash::FxHashMap;

use super::RecordStore;
use crate::param::ParameterRecord;
use crate::Result;

/// In-memory record store backed by an `FxHashMap`.
///
/// # Example
///
/// ```rust
/// use fitflow::kv::{MemoryStore, RecordStore};
/// use fitflow::param::ParameterRecord;
///
/// # fn example() -> fitflow::Result<()> {
/// let mut store = MemoryStore::new();
/// store.set("fl", ParameterRecord::builder().value(0.7).build())?;
/// assert!(store.exists("fl")?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: FxHashMap<String, ParameterRecord>,
}

impl MemoryStore {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    /// Get the number of records in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Clear all records.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<ParameterRecord>> {
        Ok(self.records.get(key).cloned())
    }

    fn set(&mut self, key: &str, record: ParameterRecord) -> Result<()> {
        self.records.insert(key.to_string(), record);
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.records.remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.records.contains_key(key))
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.records.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}
