//! Merge several store files into one.

use std::path::Path;
use std::str::FromStr;

use tracing::{info, warn};

use super::{FileStore, OpenMode, RecordStore};
use crate::{Error, Result};

/// How duplicated keys are handled by [`merge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMode {
    /// Later inputs replace earlier records.
    #[default]
    Overwrite,
    /// Keep the first record and log every duplicate.
    Print,
    /// Keep the first record silently.
    Skip,
}

impl MergeMode {
    /// Mode name as accepted on the command line.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Overwrite => "overwrite",
            Self::Print => "print",
            Self::Skip => "skip",
        }
    }
}

impl FromStr for MergeMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "overwrite" => Ok(Self::Overwrite),
            "print" => Ok(Self::Print),
            "skip" => Ok(Self::Skip),
            other => Err(Error::Other(format!(
                "Unknown merge mode '{other}' (expected overwrite, print or skip)"
            ))),
        }
    }
}

/// Merge `inputs` into `output`.
///
/// No-op (returns `Ok(false)`) if any input is missing. When `output` does
/// not exist yet the first input seeds it by byte copy.
///
/// # Errors
///
/// Returns store open/flush errors.
pub fn merge<P: AsRef<Path>>(inputs: &[P], mode: MergeMode, output: impl AsRef<Path>) -> Result<bool> {
    let output = output.as_ref();
    let paths: Vec<&Path> = inputs.iter().map(AsRef::<Path>::as_ref).collect();
    if let Some(missing) = paths.iter().find(|p| !p.exists()) {
        warn!(input = %missing.display(), "merge input missing, nothing merged");
        return Ok(false);
    }

    let mut remaining = paths.into_iter();
    if !output.exists() {
        match remaining.next() {
            Some(first) => {
                FileStore::copy(first, output, false)?;
            }
            None => return Ok(false),
        }
    }

    let mut out = FileStore::open(output, OpenMode::ReadWrite)?;
    for input in remaining {
        let db = FileStore::open(input, OpenMode::Read)?;
        for (key, record) in db.iter() {
            let duplicated = out.exists(key)?;
            match (mode, duplicated) {
                (MergeMode::Overwrite, _) | (_, false) => out.set(key, record.clone())?,
                (MergeMode::Print, true) => {
                    info!(key, input = %input.display(), "found duplicated key");
                }
                (MergeMode::Skip, true) => {}
            }
        }
    }
    out.close()?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::ParameterRecord;

    fn write_store(path: &Path, entries: &[(&str, f64)]) {
        let mut store = FileStore::open(path, OpenMode::ReadWrite).unwrap();
        for (key, value) in entries {
            store.set(key, ParameterRecord::builder().value(*value).build()).unwrap();
        }
        store.close().unwrap();
    }

    fn value_of(path: &Path, key: &str) -> Option<f64> {
        FileStore::open(path, OpenMode::Read)
            .unwrap()
            .get(key)
            .unwrap()
            .and_then(|r| r.value())
    }

    #[test]
    fn test_merge_mode_parse() {
        assert_eq!("Overwrite".parse::<MergeMode>().unwrap(), MergeMode::Overwrite);
        assert_eq!("skip".parse::<MergeMode>().unwrap(), MergeMode::Skip);
        assert!("bogus".parse::<MergeMode>().is_err());
    }

    #[test]
    fn test_merge_overwrite_and_skip() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.db");
        let b = dir.path().join("b.db");
        write_store(&a, &[("fl", 0.1), ("afb", 0.2)]);
        write_store(&b, &[("fl", 0.9), ("nSig", 100.0)]);

        let over = dir.path().join("over.db");
        assert!(merge(&[&a, &b], MergeMode::Overwrite, &over).unwrap());
        assert_eq!(value_of(&over, "fl"), Some(0.9));
        assert_eq!(value_of(&over, "nSig"), Some(100.0));

        let skip = dir.path().join("skip.db");
        assert!(merge(&[&a, &b], MergeMode::Skip, &skip).unwrap());
        assert_eq!(value_of(&skip, "fl"), Some(0.1));
        assert_eq!(value_of(&skip, "nSig"), Some(100.0));
    }

    #[test]
    fn test_merge_missing_input_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.db");
        write_store(&a, &[("fl", 0.1)]);
        let out = dir.path().join("out.db");

        assert!(!merge(&[a, dir.path().join("missing.db")], MergeMode::Overwrite, &out).unwrap());
        assert!(!out.exists());
    }
}
