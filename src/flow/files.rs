//! File manager - keyed registry of open output files

use std::any::Any;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::{ProcessEnv, Service};
use crate::Result;

/// How a booked file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileMode {
    /// Existing file, read only
    #[default]
    Read,
    /// Truncate or create
    Recreate,
    /// Append, creating if absent
    Append,
}

impl FileMode {
    fn options(self) -> OpenOptions {
        let mut opts = OpenOptions::new();
        match self {
            Self::Read => opts.read(true),
            Self::Recreate => opts.write(true).create(true).truncate(true),
            Self::Append => opts.append(true).create(true),
        };
        opts
    }
}

#[derive(Debug)]
struct Booked {
    key: String,
    path: PathBuf,
    file: File,
}

/// Keyed registry of open files, closed last-in-first-out.
#[derive(Debug, Default)]
pub struct FileManager {
    work_dir: Option<PathBuf>,
    files: Vec<Booked>,
}

impl FileManager {
    /// Empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.work_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Open and book a file under `key`, or return the handle already booked.
    ///
    /// Relative paths resolve against the work directory.
    ///
    /// # Errors
    ///
    /// Returns IO errors from opening the file.
    pub fn open(&mut self, key: &str, path: impl AsRef<Path>, mode: FileMode) -> Result<&mut File> {
        if let Some(idx) = self.files.iter().position(|b| b.key == key) {
            debug!(key, "file already booked");
            return Ok(&mut self.files[idx].file);
        }
        let path = self.resolve(path.as_ref());
        let file = mode.options().open(&path)?;
        debug!(key, path = %path.display(), ?mode, "booked file");
        self.files.push(Booked {
            key: key.to_string(),
            path,
            file,
        });
        let last = self.files.len() - 1;
        Ok(&mut self.files[last].file)
    }

    /// Booked handle, if any.
    pub fn get(&mut self, key: &str) -> Option<&mut File> {
        let found = self.files.iter_mut().find(|b| b.key == key).map(|b| &mut b.file);
        if found.is_none() {
            info!(key, "no file booked with this key");
        }
        found
    }

    /// Path of a booked file.
    #[must_use]
    pub fn path(&self, key: &str) -> Option<&Path> {
        self.files.iter().find(|b| b.key == key).map(|b| b.path.as_path())
    }

    /// Booked keys in booking order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|b| b.key.as_str())
    }

    /// Close every file, last booked first.
    ///
    /// # Errors
    ///
    /// Returns the first sync failure; every file is still closed.
    pub fn close_all(&mut self) -> Result<()> {
        let mut first_err = None;
        while let Some(booked) = self.files.pop() {
            debug!(key = %booked.key, "closing file");
            if let Err(e) = booked.file.sync_all() {
                warn!(key = %booked.key, error = %e, "failed to sync file");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), |e| Err(e.into()))
    }
}

impl Service for FileManager {
    fn begin_seq(&mut self, env: &ProcessEnv) -> Result<()> {
        self.work_dir = Some(env.work_dir().to_path_buf());
        Ok(())
    }

    fn end_seq(&mut self) -> Result<()> {
        self.close_all()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn test_open_resolves_against_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let env = ProcessEnv::new("test", dir.path());
        let mut fm = FileManager::new();
        fm.begin_seq(&env).unwrap();

        writeln!(fm.open("summary", "summary.jsonl", FileMode::Recreate).unwrap(), "line").unwrap();
        assert_eq!(fm.path("summary").unwrap(), dir.path().join("summary.jsonl"));
        fm.end_seq().unwrap();

        let text = std::fs::read_to_string(dir.path().join("summary.jsonl")).unwrap();
        assert_eq!(text, "line\n");
    }

    #[test]
    fn test_reopen_returns_booked_handle() {
        let dir = tempfile::tempdir().unwrap();
        let env = ProcessEnv::new("test", dir.path());
        let mut fm = FileManager::new();
        fm.begin_seq(&env).unwrap();

        write!(fm.open("out", "a.txt", FileMode::Append).unwrap(), "1").unwrap();
        write!(fm.open("out", "ignored.txt", FileMode::Recreate).unwrap(), "2").unwrap();
        fm.close_all().unwrap();

        assert!(!dir.path().join("ignored.txt").exists());
        let mut text = String::new();
        File::open(dir.path().join("a.txt")).unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "12");
    }

    #[test]
    fn test_read_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut fm = FileManager::new();
        assert!(fm.open("in", dir.path().join("absent.txt"), FileMode::Read).is_err());
        assert!(fm.get("in").is_none());
        assert_eq!(fm.keys().count(), 0);
    }
}
