//! DB player - owns the fit-result store of the active bin
//!
//! At `begin_seq` the store path is fixed to `fitResults_<binLabel>.db` in
//! the work directory. When an input directory is configured, the store of
//! the same name found there seeds the output, so a batch job starts from
//! the nominal fit results.

use std::any::Any;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{ProcessEnv, Service};
use crate::kv::FileStore;
use crate::{Error, Result};

/// Store file name of a bin.
#[must_use]
pub fn db_file_name(bin_label: &str) -> String {
    format!("fitResults_{bin_label}.db")
}

/// Service holding the output store path of the process.
#[derive(Debug, Default)]
pub struct DbPlayer {
    abs_input_dir: Option<PathBuf>,
    odb_file: Option<PathBuf>,
}

impl DbPlayer {
    /// Player without an input baseline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Player seeding its output from the store found in `dir`.
    #[must_use]
    pub fn with_input_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            abs_input_dir: Some(dir.into()),
            odb_file: None,
        }
    }

    /// Change the baseline directory.
    pub fn set_abs_input_dir(&mut self, dir: Option<PathBuf>) {
        self.abs_input_dir = dir;
    }

    /// Baseline directory, if any.
    #[must_use]
    pub fn abs_input_dir(&self) -> Option<&Path> {
        self.abs_input_dir.as_deref()
    }

    /// Output store path, known after `begin_seq`.
    #[must_use]
    pub fn odb_file(&self) -> Option<&Path> {
        self.odb_file.as_deref()
    }

    /// Output store path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before `begin_seq`.
    pub fn require_odb_file(&self) -> Result<&Path> {
        self.odb_file().ok_or_else(|| Error::InvalidState {
            expected: "dbplayer after beginSeq".to_string(),
            found: "no output store assigned".to_string(),
        })
    }

    fn baseline(&self, odb: &Path) -> Option<PathBuf> {
        let name = odb.file_name()?;
        let path = self.abs_input_dir.as_ref()?.join(name);
        path.exists().then_some(path)
    }

    /// Bring the output store back to its baseline.
    ///
    /// Without `force` the baseline is only copied when the output is absent.
    /// With `force` the output is replaced by the baseline, or deleted when
    /// there is none. Calling it twice in a row leaves the same state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before `begin_seq`, or IO errors.
    pub fn reset_db(&self, force: bool) -> Result<()> {
        let odb = self.require_odb_file()?;
        match self.baseline(odb) {
            Some(src) => {
                FileStore::copy(&src, odb, force)?;
            }
            None if force && odb.exists() => {
                debug!(path = %odb.display(), "removing output store, no baseline");
                std::fs::remove_file(odb)?;
            }
            None => {}
        }
        Ok(())
    }
}

impl Service for DbPlayer {
    fn begin_seq(&mut self, env: &ProcessEnv) -> Result<()> {
        let odb = env.work_dir().join(db_file_name(env.bin_label()));
        info!(path = %odb.display(), "fit-result store");
        self.odb_file = Some(odb);
        self.reset_db(false)
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
    use crate::config::{BinSpec, ProcessConfig};
    use crate::kv::{OpenMode, RecordStore};
    use crate::param::ParameterRecord;

    fn env_for(dir: &Path) -> ProcessEnv {
        let cfg = ProcessConfig::new()
            .with_bin("belowJpsi", BinSpec::new("bin1", 1.0, 8.68))
            .with_bin_key("belowJpsi");
        ProcessEnv::with_config("test", dir, cfg)
    }

    fn write_store(path: &Path, value: f64) {
        let mut store = FileStore::open(path, OpenMode::ReadWrite).unwrap();
        store.set("fl", ParameterRecord::builder().value(value).build()).unwrap();
        store.close().unwrap();
    }

    fn stored_fl(path: &Path) -> f64 {
        let store = FileStore::open(path, OpenMode::Read).unwrap();
        store.get("fl").unwrap().unwrap().value().unwrap()
    }

    #[test]
    fn test_db_file_name() {
        assert_eq!(db_file_name("bin1"), "fitResults_bin1.db");
    }

    #[test]
    fn test_reset_before_begin_is_invalid_state() {
        let player = DbPlayer::new();
        assert!(matches!(player.reset_db(true), Err(Error::InvalidState { .. })));
    }

    #[test]
    fn test_begin_seeds_from_baseline() {
        let input = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        write_store(&input.path().join("fitResults_bin1.db"), 0.7);

        let mut player = DbPlayer::with_input_dir(input.path());
        player.begin_seq(&env_for(work.path())).unwrap();

        let odb = player.odb_file().unwrap();
        assert_eq!(odb, work.path().join("fitResults_bin1.db"));
        assert!((stored_fl(odb) - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_forced_reset_is_idempotent() {
        let input = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        write_store(&input.path().join("fitResults_bin1.db"), 0.7);

        let mut player = DbPlayer::with_input_dir(input.path());
        player.begin_seq(&env_for(work.path())).unwrap();
        let odb = player.odb_file().unwrap().to_path_buf();

        write_store(&odb, 0.2);
        player.reset_db(true).unwrap();
        let first = std::fs::read(&odb).unwrap();
        player.reset_db(true).unwrap();
        let second = std::fs::read(&odb).unwrap();

        assert_eq!(first, second);
        assert!((stored_fl(&odb) - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_forced_reset_without_baseline_removes_output() {
        let work = tempfile::tempdir().unwrap();
        let mut player = DbPlayer::new();
        player.begin_seq(&env_for(work.path())).unwrap();
        let odb = player.odb_file().unwrap().to_path_buf();

        write_store(&odb, 0.2);
        player.reset_db(false).unwrap();
        assert!(odb.exists());
        player.reset_db(true).unwrap();
        assert!(!odb.exists());
        player.reset_db(true).unwrap();
        assert!(!odb.exists());
    }
}
