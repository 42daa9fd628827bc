//! Fit-Result Store Module
//!
//! Keyed table of [`ParameterRecord`]s shared by the fitting stages of a
//! pipeline:
//! - On-disk backend ([`FileStore`]), one file per physics bin
//! - In-memory backend ([`MemoryStore`]) for toy loops and tests
//! - Store seeding ([`FileStore::copy`]) and merging ([`merge`])
//!
//! # Concurrency
//!
//! There is no locking. At most one writer may hold a given store file at a
//! time; callers guarantee this by running one pipeline per file (one
//! process per bin, or per batch job directory). Two processes writing the
//! same file will lose updates.
//!
//! # Example
//!
//! ```rust,no_run
//! use fitflow::kv::{FileStore, OpenMode, RecordStore};
//! use fitflow::param::ParameterRecord;
//!
//! # fn example() -> fitflow::Result<()> {
//! let mut store = FileStore::open("fitResults_bin1.db", OpenMode::ReadWrite)?;
//! store.set("fl", ParameterRecord::builder().value(0.7).error(0.05).build())?;
//! store.close()?;
//!
//! let store = FileStore::open("fitResults_bin1.db", OpenMode::Read)?;
//! assert!(store.exists("fl")?);
//! # Ok(())
//! # }
//! ```

mod file;
mod memory;
mod merge;

pub use file::{FileStore, OpenMode};
pub use memory::MemoryStore;
pub use merge::{merge, MergeMode};

use crate::param::ParameterRecord;
use crate::Result;

/// Key-value store of parameter records.
///
/// Absence of a key is a valid state, never an error.
pub trait RecordStore {
    /// Get a record by key.
    ///
    /// Returns `None` if the key doesn't exist.
    fn get(&self, key: &str) -> Result<Option<ParameterRecord>>;

    /// Set the record for a key.
    ///
    /// Overwrites any existing record.
    fn set(&mut self, key: &str, record: ParameterRecord) -> Result<()>;

    /// Delete a key.
    ///
    /// No-op if the key doesn't exist.
    fn delete(&mut self, key: &str) -> Result<()>;

    /// Check if a key exists.
    fn exists(&self, key: &str) -> Result<bool>;

    /// All keys, sorted.
    fn keys(&self) -> Result<Vec<String>>;

    /// Push pending writes to durable storage.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Get multiple keys in a batch.
    ///
    /// Returns records in the same order as keys. Missing keys return `None`.
    fn batch_get(&self, keys: &[&str]) -> Result<Vec<Option<ParameterRecord>>> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    /// Set multiple records in a batch.
    fn batch_set(&mut self, pairs: Vec<(&str, ParameterRecord)>) -> Result<()> {
        for (key, record) in pairs {
            self.set(key, record)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: f64) -> ParameterRecord {
        ParameterRecord::builder().value(value).build()
    }

    #[test]
    fn test_memory_store_set_get() {
        let mut store = MemoryStore::new();

        store.set("key1", record(1.0)).unwrap();
        let value = store.get("key1").unwrap();

        assert_eq!(value, Some(record(1.0)));
    }

    #[test]
    fn test_memory_store_get_nonexistent() {
        let store = MemoryStore::new();

        assert_eq!(store.get("nonexistent").unwrap(), None);
    }

    #[test]
    fn test_memory_store_overwrite() {
        let mut store = MemoryStore::new();

        store.set("key", record(1.0)).unwrap();
        store.set("key", record(2.0)).unwrap();

        assert_eq!(store.get("key").unwrap(), Some(record(2.0)));
    }

    #[test]
    fn test_memory_store_delete() {
        let mut store = MemoryStore::new();

        store.set("key", record(1.0)).unwrap();
        store.delete("key").unwrap();
        assert_eq!(store.get("key").unwrap(), None);

        // Should not error
        store.delete("nonexistent").unwrap();
    }

    #[test]
    fn test_memory_store_exists() {
        let mut store = MemoryStore::new();

        assert!(!store.exists("key").unwrap());
        store.set("key", record(1.0)).unwrap();
        assert!(store.exists("key").unwrap());
    }

    #[test]
    fn test_memory_store_batch_get() {
        let mut store = MemoryStore::new();

        store.set("a", record(1.0)).unwrap();
        store.set("b", record(2.0)).unwrap();
        // "c" intentionally not set

        let results = store.batch_get(&["a", "b", "c"]).unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0], Some(record(1.0)));
        assert_eq!(results[1], Some(record(2.0)));
        assert_eq!(results[2], None);
    }

    #[test]
    fn test_memory_store_batch_set_and_sorted_keys() {
        let mut store = MemoryStore::new();

        store
            .batch_set(vec![("c", record(3.0)), ("a", record(1.0)), ("b", record(2.0))])
            .unwrap();

        assert_eq!(store.keys().unwrap(), vec!["a", "b", "c"]);
    }
}
