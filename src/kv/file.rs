//! On-disk record store.
//!
//! The file holds one JSON object mapping store keys to records. The whole
//! table is loaded at open and written back (temp file + rename) on flush,
//! so a crash mid-write leaves the previous version intact.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::RecordStore;
use crate::param::ParameterRecord;
use crate::{Error, Result};

/// Access mode for [`FileStore::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Read only; the file must exist.
    #[default]
    Read,
    /// Read-modify-write; the file is created on first flush if absent.
    ReadWrite,
}

/// Scoped handle on a store file.
///
/// Pending writes are flushed by [`close`](Self::close), or by `Drop` on any
/// other exit path (early return, `?`, panic unwinding).
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    mode: OpenMode,
    records: BTreeMap<String, ParameterRecord>,
    dirty: bool,
}

impl FileStore {
    /// Open a store file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreOpen`] if the file is absent in read mode, cannot
    /// be read, is not a valid store, or (write mode) its directory is missing.
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let (records, dirty) = if path.exists() {
            (Self::load(&path)?, false)
        } else {
            match mode {
                OpenMode::Read => return Err(Error::store_open(path, "file does not exist")),
                OpenMode::ReadWrite => {
                    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
                    if let Some(dir) = parent {
                        if !dir.is_dir() {
                            return Err(Error::store_open(
                                path.clone(),
                                format!("directory {} does not exist", dir.display()),
                            ));
                        }
                    }
                    debug!(path = %path.display(), "creating new fit-result store");
                    (BTreeMap::new(), true)
                }
            }
        };

        Ok(Self {
            path,
            mode,
            records,
            dirty,
        })
    }

    fn load(path: &Path) -> Result<BTreeMap<String, ParameterRecord>> {
        let text = fs::read_to_string(path).map_err(|e| Error::store_open(path, e))?;
        if text.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&text).map_err(|e| Error::store_open(path, format!("malformed store: {e}")))
    }

    /// Duplicate `src` to `dst` byte for byte.
    ///
    /// Skipped when `dst` already exists unless `force` is set. Returns whether
    /// a copy happened.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreOpen`] if `src` is missing, or IO errors from the copy.
    pub fn copy<P: AsRef<Path>, Q: AsRef<Path>>(src: P, dst: Q, force: bool) -> Result<bool> {
        let (src, dst) = (src.as_ref(), dst.as_ref());
        if dst.exists() && !force {
            debug!(dst = %dst.display(), "store already present, not seeding");
            return Ok(false);
        }
        if !src.exists() {
            return Err(Error::store_open(src, "seed store does not exist"));
        }
        fs::copy(src, dst)?;
        debug!(src = %src.display(), dst = %dst.display(), "seeded store");
        Ok(true)
    }

    /// File path of this store.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mode the store was opened with.
    #[must_use]
    pub const fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the store holds no record.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate records in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterRecord)> {
        self.records.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Flush and release the handle.
    ///
    /// # Errors
    ///
    /// Returns IO or serialization errors from the final flush.
    pub fn close(mut self) -> Result<()> {
        self.flush()
    }

    fn ensure_writable(&self) -> Result<()> {
        match self.mode {
            OpenMode::ReadWrite => Ok(()),
            OpenMode::Read => Err(Error::ReadOnlyStore(self.path.clone())),
        }
    }

    fn write_out(&self) -> Result<()> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let text = serde_json::to_string_pretty(&self.records)?;
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl RecordStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<ParameterRecord>> {
        Ok(self.records.get(key).cloned())
    }

    fn set(&mut self, key: &str, record: ParameterRecord) -> Result<()> {
        self.ensure_writable()?;
        self.records.insert(key.to_string(), record);
        self.dirty = true;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.ensure_writable()?;
        if self.records.remove(key).is_some() {
            self.dirty = true;
        }
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.records.contains_key(key))
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.records.keys().cloned().collect())
    }

    fn flush(&mut self) -> Result<()> {
        if self.mode == OpenMode::Read || !self.dirty {
            return Ok(());
        }
        self.write_out()?;
        self.dirty = false;
        Ok(())
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(path = %self.path.display(), error = %e, "failed to flush fit-result store on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: f64) -> ParameterRecord {
        ParameterRecord::builder().value(value).error(0.1).build()
    }

    #[test]
    fn test_read_mode_requires_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileStore::open(dir.path().join("missing.db"), OpenMode::Read).unwrap_err();
        assert!(matches!(err, Error::StoreOpen { .. }));
    }

    #[test]
    fn test_write_then_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fitResults_bin1.db");

        let mut store = FileStore::open(&path, OpenMode::ReadWrite).unwrap();
        store.set("fl", record(0.7)).unwrap();
        store.close().unwrap();

        let store = FileStore::open(&path, OpenMode::Read).unwrap();
        assert_eq!(store.get("fl").unwrap(), Some(record(0.7)));
    }

    #[test]
    fn test_drop_flushes_pending_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        {
            let mut store = FileStore::open(&path, OpenMode::ReadWrite).unwrap();
            store.set("afb", record(0.1)).unwrap();
        }
        let store = FileStore::open(&path, OpenMode::Read).unwrap();
        assert!(store.exists("afb").unwrap());
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        FileStore::open(&path, OpenMode::ReadWrite).unwrap().close().unwrap();

        let mut store = FileStore::open(&path, OpenMode::Read).unwrap();
        let err = store.set("fl", record(0.5)).unwrap_err();
        assert!(matches!(err, Error::ReadOnlyStore(_)));
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.db");
        fs::write(&path, "not json").unwrap();
        let err = FileStore::open(&path, OpenMode::Read).unwrap_err();
        assert!(err.to_string().contains("malformed store"));
    }

    #[test]
    fn test_write_mode_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no/such/dir/store.db");
        let err = FileStore::open(path, OpenMode::ReadWrite).unwrap_err();
        assert!(matches!(err, Error::StoreOpen { .. }));
    }

    #[test]
    fn test_copy_respects_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("baseline.db");
        let dst = dir.path().join("bin.db");

        let mut store = FileStore::open(&src, OpenMode::ReadWrite).unwrap();
        store.set("fl", record(0.7)).unwrap();
        store.close().unwrap();

        assert!(FileStore::copy(&src, &dst, false).unwrap());
        assert!(!FileStore::copy(&src, &dst, false).unwrap());
        assert!(FileStore::copy(&src, &dst, true).unwrap());
    }
}
