//! Source manager - registry of artifacts produced by stages
//!
//! Stages publish datasets, models and fit results under string keys;
//! later stages look them up. Every lookup tagged with an origin appends
//! that origin to the artifact's access history, which is only ever read
//! for auditing.

use std::any::Any;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use super::Service;
use crate::Result;

/// Shared handle on a produced object.
///
/// Artifacts needing mutation after publication wrap their payload in a
/// `RefCell`.
pub type Artifact = Rc<dyn Any>;

/// Wrap a value as an [`Artifact`].
pub fn artifact<T: Any>(value: T) -> Artifact {
    Rc::new(value)
}

#[derive(Debug)]
struct SourceEntry {
    key: String,
    obj: Artifact,
    history: Vec<String>,
}

/// Registry of artifacts, torn down last-in-first-out.
#[derive(Debug, Default)]
pub struct SourceManager {
    entries: Vec<SourceEntry>,
    index: FxHashMap<String, usize>,
}

impl SourceManager {
    /// Empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an artifact, keeping the accumulated history.
    pub fn update(&mut self, key: &str, obj: Artifact, origin: Option<&str>) {
        self.update_with(key, obj, origin, true);
    }

    /// Insert or replace an artifact.
    ///
    /// With `overwrite_existing` the history of an existing key is kept; without
    /// it the entry is rebuilt from scratch (history reset). Either way the key
    /// keeps its original teardown position.
    pub fn update_with(&mut self, key: &str, obj: Artifact, origin: Option<&str>, overwrite_existing: bool) {
        let idx = match self.index.get(key) {
            Some(&idx) => {
                let entry = &mut self.entries[idx];
                if overwrite_existing {
                    debug!(key, "overwrite source");
                } else {
                    entry.history.clear();
                }
                entry.obj = obj;
                idx
            }
            None => {
                self.entries.push(SourceEntry {
                    key: key.to_string(),
                    obj,
                    history: Vec::new(),
                });
                let idx = self.entries.len() - 1;
                self.index.insert(key.to_string(), idx);
                idx
            }
        };
        if let Some(origin) = origin {
            self.entries[idx].history.push(origin.to_string());
        }
    }

    /// Look up an artifact. Absence is logged as a warning, not an error.
    pub fn get(&mut self, key: &str, origin: Option<&str>) -> Option<Artifact> {
        let Some(&idx) = self.index.get(key) else {
            warn!(key, "no source labeled with this key is booked");
            return None;
        };
        let entry = &mut self.entries[idx];
        if let Some(origin) = origin {
            entry.history.push(origin.to_string());
        }
        Some(Rc::clone(&entry.obj))
    }

    /// Typed lookup. A type mismatch is logged and treated like absence.
    pub fn get_as<T: Any>(&mut self, key: &str, origin: Option<&str>) -> Option<Rc<T>> {
        let obj = self.get(key, origin)?;
        match obj.downcast::<T>() {
            Ok(typed) => Some(typed),
            Err(_) => {
                warn!(key, expected = std::any::type_name::<T>(), "source has unexpected type");
                None
            }
        }
    }

    /// Whether a key is booked.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Booked keys in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    /// Number of booked artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is booked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Access history of a key: every origin that published or retrieved it.
    #[must_use]
    pub fn history(&self, key: &str) -> Option<&[String]> {
        self.index.get(key).map(|&idx| self.entries[idx].history.as_slice())
    }

    /// Clear the access history of a key.
    pub fn reset_history(&mut self, key: &str) {
        if let Some(&idx) = self.index.get(key) {
            self.entries[idx].history.clear();
        }
    }

    /// Drop every artifact, last registered first.
    pub fn clear(&mut self) {
        while let Some(entry) = self.entries.pop() {
            debug!(key = %entry.key, "releasing source");
            self.index.remove(&entry.key);
        }
    }
}

impl Service for SourceManager {
    fn end_seq(&mut self) -> Result<()> {
        self.clear();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
