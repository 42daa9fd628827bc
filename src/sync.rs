//! Parameter synchronization between live parameter sets and the store
//!
//! Three operations bridge a [`ParameterSet`] and a [`RecordStore`]:
//!
//! - [`init_from`]: lenient read. Unknown names stay at their model defaults.
//! - [`update_to`]: read-modify-write of every exposed attribute.
//! - [`fluctuate_from`]: strict read that resamples values within the stored
//!   errors, for systematic studies.
//!
//! Bounds are written by `update_to` but never restored by `init_from`; a
//! fit re-derives them from its model definition on every run.
//!
//! The `*_file` variants open the store, run the operation and flush it on
//! every exit path.

use std::path::Path;

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use tracing::{debug, info};

use crate::kv::{FileStore, OpenMode, RecordStore};
use crate::param::{AliasMap, Attr, ParameterRecord, ParameterSet, Resolution};
use crate::{Error, Result};

/// Asymmetric errors at or below this magnitude fall back to the symmetric error.
pub const ASYM_ERROR_EPSILON: f64 = 1e-5;

/// Per-name outcome of one sync call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Parameters read from or written to the store.
    pub synced: Vec<String>,
    /// Parameters left out by an alias skip rule.
    pub skipped: Vec<String>,
    /// Parameters with no prior record (`init_from` only).
    pub fresh: Vec<String>,
}

impl SyncReport {
    /// Total number of parameters visited.
    #[must_use]
    pub fn visited(&self) -> usize {
        self.synced.len() + self.skipped.len() + self.fresh.len()
    }
}

/// Initialize parameters from stored records.
///
/// Copies value, error, constancy and the asymmetric error pair. Bounds are
/// left as the model supplied them.
///
/// # Errors
///
/// Returns [`Error::RecordCorrupt`] if a matching record has no value.
pub fn init_from<S: RecordStore + ?Sized>(
    store: &S,
    params: &mut ParameterSet,
    aliases: &AliasMap,
) -> Result<SyncReport> {
    let mut report = SyncReport::default();
    for param in params.iter_mut() {
        let key = match aliases.resolve(param.name()) {
            Resolution::Skip => {
                debug!(param = param.name(), "skipped by alias rule");
                report.skipped.push(param.name().to_string());
                continue;
            }
            Resolution::Key(key) => key.to_string(),
        };

        let Some(record) = store.get(&key)? else {
            info!(param = param.name(), key = %key, "new variable, no prior record");
            report.fresh.push(param.name().to_string());
            continue;
        };

        param.set_value(record.require(&key, Attr::Value)?);
        if let Some(error) = record.error() {
            param.set_error(error);
        }
        if let Some((lo, hi)) = record.asym_error() {
            param.set_asym_error(lo, hi);
        }
        if let Some(constant) = record.is_constant() {
            param.set_constant(constant);
        }
        report.synced.push(param.name().to_string());
    }
    Ok(report)
}

/// Write every exposed attribute of every parameter to the store.
///
/// Records are created when absent; stored fields a parameter does not
/// expose are kept. On failure the parameters already written stay written.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] for a non-finite attribute, or store errors.
pub fn update_to<S: RecordStore + ?Sized>(
    store: &mut S,
    params: &ParameterSet,
    aliases: &AliasMap,
) -> Result<SyncReport> {
    let mut report = SyncReport::default();
    for param in params {
        let key = match aliases.resolve(param.name()) {
            Resolution::Skip => {
                debug!(param = param.name(), "skipped by alias rule");
                report.skipped.push(param.name().to_string());
                continue;
            }
            Resolution::Key(key) => key,
        };

        let update = ParameterRecord::from_parameter(param)?;
        let mut record = store.get(key)?.unwrap_or_default();
        record.merge_from(&update);
        store.set(key, record)?;
        report.synced.push(param.name().to_string());
    }
    Ok(report)
}

/// Resample parameter values around their stored results.
///
/// For each parameter a standard-normal significance `s` is drawn. Positive
/// draws step up by `s` times the upper error, negative draws step down by
/// `|s|` times the lower error; either falls back to the symmetric error when
/// the asymmetric one is below [`ASYM_ERROR_EPSILON`]. The result is clamped
/// to the stored `[min, max]`.
///
/// # Errors
///
/// Returns [`Error::RecordMissing`] for a parameter without record and
/// [`Error::RecordCorrupt`] if value, error, min or max is not stored.
pub fn fluctuate_from<S, R>(
    store: &S,
    params: &mut ParameterSet,
    aliases: &AliasMap,
    rng: &mut R,
) -> Result<SyncReport>
where
    S: RecordStore + ?Sized,
    R: Rng + ?Sized,
{
    let mut report = SyncReport::default();
    for param in params.iter_mut() {
        let key = match aliases.resolve(param.name()) {
            Resolution::Skip => {
                report.skipped.push(param.name().to_string());
                continue;
            }
            Resolution::Key(key) => key.to_string(),
        };

        let record = store.get(&key)?.ok_or_else(|| Error::RecordMissing(key.clone()))?;
        let value = record.require(&key, Attr::Value)?;
        let error = record.require(&key, Attr::Error)?;
        let min = record.require(&key, Attr::Min)?;
        let max = record.require(&key, Attr::Max)?;

        let significance: f64 = StandardNormal.sample(rng);
        let pick = |asym: Option<f64>| {
            asym.filter(|e| e.abs() > ASYM_ERROR_EPSILON)
                .unwrap_or(error)
                .abs()
        };
        let shifted = if significance > 0.0 {
            value + significance * pick(record.error_hi())
        } else {
            value + significance * pick(record.error_lo())
        };
        let fluctuated = shifted.max(min).min(max);

        debug!(param = param.name(), key = %key, significance, fluctuated, "fluctuated from store");
        param.set_value(fluctuated);
        report.synced.push(param.name().to_string());
    }
    Ok(report)
}

/// [`init_from`] on a store file. A missing file is a no-op.
///
/// # Errors
///
/// Returns store open errors for an unreadable file and [`init_from`] errors.
pub fn init_from_file(path: impl AsRef<Path>, params: &mut ParameterSet, aliases: &AliasMap) -> Result<SyncReport> {
    let path = path.as_ref();
    if !path.exists() {
        debug!(path = %path.display(), "no store yet, keeping model defaults");
        return Ok(SyncReport::default());
    }
    let store = FileStore::open(path, OpenMode::Read)?;
    init_from(&store, params, aliases)
}

/// [`update_to`] on a store file, created if absent.
///
/// The store is flushed even when a parameter fails, so earlier parameters
/// of the same call are kept.
///
/// # Errors
///
/// Returns the first parameter or store error.
pub fn update_to_file(path: impl AsRef<Path>, params: &ParameterSet, aliases: &AliasMap) -> Result<SyncReport> {
    let mut store = FileStore::open(path, OpenMode::ReadWrite)?;
    match update_to(&mut store, params, aliases) {
        Ok(report) => {
            store.close()?;
            Ok(report)
        }
        Err(e) => {
            store.flush()?;
            Err(e)
        }
    }
}

/// [`fluctuate_from`] on a store file, which must exist.
///
/// # Errors
///
/// Returns [`Error::StoreOpen`] for a missing file and [`fluctuate_from`] errors.
pub fn fluctuate_from_file<R: Rng + ?Sized>(
    path: impl AsRef<Path>,
    params: &mut ParameterSet,
    aliases: &AliasMap,
    rng: &mut R,
) -> Result<SyncReport> {
    let store = FileStore::open(path, OpenMode::Read)?;
    fluctuate_from(&store, params, aliases, rng)
}
