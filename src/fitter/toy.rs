//! Toy studier - repeated resample-and-refit of one fitter
//!
//! Each set forces the store back to its baseline, resets and re-customizes
//! the inner [`Fitter`], draws a subset of the source dataset and fits it.
//! A [`ToyObserver`] collects per-set results.

use std::any::Any;
use std::io::Write;
use std::marker::PhantomData;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Poisson};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::stage::Fitter;
use crate::config::StageConfig;
use crate::flow::{artifact, Artifact, FileMode, ProcessContext, Stage, StageBase};
use crate::kv::{FileStore, OpenMode, RecordStore};
use crate::param::Attr;
use crate::{Error, Result};

/// Sets whose NLL magnitude reaches this value are treated as failed fits.
pub const NLL_SANITY_LIMIT: f64 = 1e20;

/// How many entries each toy set draws.
#[derive(Debug, Clone, PartialEq)]
pub enum SubDataEntries {
    /// The whole source dataset.
    All,
    /// A fixed count.
    Fixed(usize),
    /// A Poisson draw around the sum of the stored values of these keys
    /// (typically the fitted yields).
    Poisson(Vec<String>),
}

impl SubDataEntries {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn draw(&self, set_idx: usize, ctx: &mut ProcessContext) -> Result<Option<usize>> {
        match self {
            Self::All => Ok(None),
            Self::Fixed(n) => Ok(Some(*n)),
            Self::Poisson(keys) => {
                let odb = ctx.db_player()?.require_odb_file()?.to_path_buf();
                let store = FileStore::open(&odb, OpenMode::Read)?;
                let mut expected = 0.0;
                for key in keys {
                    let record = store.get(key)?.ok_or_else(|| Error::RecordMissing(key.clone()))?;
                    expected += record.require(key, Attr::Value)?;
                }
                let poisson = Poisson::new(expected)
                    .map_err(|e| Error::Other(format!("cannot draw toy size around {expected}: {e}")))?;
                let entries = poisson.sample(ctx.rng()) as usize;
                info!(entries, set = set_idx, "sub dataset has expected yields");
                Ok(Some(entries))
            }
        }
    }
}

/// Turns the source dataset into one toy subset.
pub trait SubDataSampler {
    /// Draw a subset of `entries` events; `None` means the whole dataset.
    ///
    /// # Errors
    ///
    /// Returns an error when the source cannot supply the subset.
    fn sample(&mut self, data: &Artifact, entries: Option<usize>, rng: &mut StdRng) -> Result<Artifact>;

    /// Forget which events earlier sets consumed.
    fn reset(&mut self) {}
}

fn rows<T: Any>(data: &Artifact) -> Result<&Vec<T>> {
    data.downcast_ref::<Vec<T>>()
        .ok_or_else(|| Error::Other(format!("toy source is not a Vec<{}>", std::any::type_name::<T>())))
}

/// Hands the source dataset to every set unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct WholeSet;

impl SubDataSampler for WholeSet {
    fn sample(&mut self, data: &Artifact, _entries: Option<usize>, _rng: &mut StdRng) -> Result<Artifact> {
        Ok(Rc::clone(data))
    }
}

/// More than one collision per twenty drawn events.
const fn collision_rate_high(collisions: usize, entries: usize) -> bool {
    collisions.saturating_mul(20) > entries
}

/// Random events, never reusing an event across sets of one study.
#[derive(Debug, Clone)]
pub struct RandomSubset<T> {
    used: Vec<bool>,
    _rows: PhantomData<T>,
}

impl<T> Default for RandomSubset<T> {
    fn default() -> Self {
        Self {
            used: Vec::new(),
            _rows: PhantomData,
        }
    }
}

impl<T> RandomSubset<T> {
    /// Sampler with no event used yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T: Any + Clone> SubDataSampler for RandomSubset<T> {
    fn sample(&mut self, data: &Artifact, entries: Option<usize>, rng: &mut StdRng) -> Result<Artifact> {
        let source = rows::<T>(data)?;
        let total = source.len();
        let entries = entries.unwrap_or(total);
        if self.used.len() != total {
            self.used = vec![false; total];
        }
        let available = self.used.iter().filter(|u| !**u).count();
        if entries > available {
            return Err(Error::Other(format!(
                "source dataset exhausted: {entries} events requested, {available} unused"
            )));
        }

        let mut picked = vec![false; total];
        let mut collisions = 0_usize;
        for _ in 0..entries {
            loop {
                let idx = rng.gen_range(0..total);
                if self.used[idx] {
                    collisions += 1;
                } else {
                    self.used[idx] = true;
                    picked[idx] = true;
                    break;
                }
            }
        }
        if collision_rate_high(collisions, entries) {
            warn!(collisions, entries, "random collision rate is high, use a larger source");
        }

        let subset: Vec<T> = source
            .iter()
            .zip(&picked)
            .filter(|(_, p)| **p)
            .map(|(row, _)| row.clone())
            .collect();
        Ok(artifact(subset))
    }

    fn reset(&mut self) {
        self.used.clear();
    }
}

/// Consecutive blocks of the source, in order.
#[derive(Debug, Clone)]
pub struct SequentialSubset<T> {
    cursor: usize,
    _rows: PhantomData<T>,
}

impl<T> Default for SequentialSubset<T> {
    fn default() -> Self {
        Self {
            cursor: 0,
            _rows: PhantomData,
        }
    }
}

impl<T> SequentialSubset<T> {
    /// Sampler starting at the first event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T: Any + Clone> SubDataSampler for SequentialSubset<T> {
    fn sample(&mut self, data: &Artifact, entries: Option<usize>, _rng: &mut StdRng) -> Result<Artifact> {
        let source = rows::<T>(data)?;
        let entries = entries.unwrap_or(source.len());
        let end = self.cursor + entries;
        if end > source.len() {
            return Err(Error::Other("running out of source dataset".to_string()));
        }
        let subset = source[self.cursor..end].to_vec();
        self.cursor = end;
        Ok(artifact(subset))
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }
}

/// Hooks around the toy loop.
pub trait ToyObserver {
    /// Before the first set.
    ///
    /// # Errors
    ///
    /// Implementation-specific.
    fn pre_sets_loop(&mut self, _ctx: &mut ProcessContext) -> Result<()> {
        Ok(())
    }

    /// After each set's fit.
    ///
    /// # Errors
    ///
    /// Implementation-specific.
    fn post_run_fit(&mut self, set_idx: usize, fitter: &Fitter, ctx: &mut ProcessContext) -> Result<()>;

    /// After the last set.
    ///
    /// # Errors
    ///
    /// Implementation-specific.
    fn post_sets_loop(&mut self, _ctx: &mut ProcessContext) -> Result<()> {
        Ok(())
    }

    /// Drop per-run state.
    fn reset(&mut self) {}
}

/// One line of the set summary.
#[derive(Debug, Clone, Serialize)]
struct SetSummary {
    set: usize,
    status: i32,
    nll: f64,
    params: serde_json::Map<String, Value>,
}

/// Default observer: one JSON line per good set in `setSummary_<binLabel>.jsonl`.
#[derive(Debug, Clone, Default)]
pub struct JsonSummary {
    written: usize,
}

/// File manager key of the summary file.
pub const SUMMARY_KEY: &str = "setSummary";

impl JsonSummary {
    /// Fresh observer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Summary file name for a bin.
    #[must_use]
    pub fn file_name(bin_label: &str) -> String {
        format!("setSummary_{bin_label}.jsonl")
    }

    /// Lines written so far.
    #[must_use]
    pub const fn written(&self) -> usize {
        self.written
    }
}

impl ToyObserver for JsonSummary {
    fn pre_sets_loop(&mut self, ctx: &mut ProcessContext) -> Result<()> {
        let name = Self::file_name(ctx.bin_label());
        ctx.files_mut()?.open(SUMMARY_KEY, name, FileMode::Recreate)?;
        Ok(())
    }

    fn post_run_fit(&mut self, set_idx: usize, fitter: &Fitter, ctx: &mut ProcessContext) -> Result<()> {
        let Some(migrad) = fitter.fit_result("migrad") else {
            return Ok(());
        };
        let nll = fitter.nll().unwrap_or(migrad.nll);
        if !nll.is_finite() || nll.abs() >= NLL_SANITY_LIMIT {
            debug!(set = set_idx, nll, "set dropped from summary");
            return Ok(());
        }
        let params = fitter.params().iter().map(|p| (p.name().to_string(), json!(p.value()))).collect();
        let line = SetSummary {
            set: set_idx,
            status: migrad.status,
            nll,
            params,
        };
        let name = Self::file_name(ctx.bin_label());
        let file = ctx.files_mut()?.open(SUMMARY_KEY, name, FileMode::Append)?;
        serde_json::to_writer(&mut *file, &line)?;
        writeln!(file)?;
        self.written += 1;
        Ok(())
    }

    fn post_sets_loop(&mut self, ctx: &mut ProcessContext) -> Result<()> {
        if let Some(file) = ctx.files_mut()?.get(SUMMARY_KEY) {
            file.flush()?;
        }
        info!(sets = self.written, "toy summary written");
        Ok(())
    }

    fn reset(&mut self) {
        self.written = 0;
    }
}

/// Stage running an inner fitter over `nSetOfToys` sampled subsets.
pub struct ToyStudier {
    base: StageBase,
    fitter: Fitter,
    entries: SubDataEntries,
    sampler: Box<dyn SubDataSampler>,
    observer: Box<dyn ToyObserver>,
    sets_done: usize,
}

impl std::fmt::Debug for ToyStudier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToyStudier")
            .field("base", &self.base)
            .field("fitter", &self.fitter)
            .field("entries", &self.entries)
            .field("sets_done", &self.sets_done)
            .finish_non_exhaustive()
    }
}

impl ToyStudier {
    /// Default configuration.
    #[must_use]
    pub fn template_config() -> Value {
        json!({
            "name": "ToyStudier",
            "data": null,
            "nSetOfToys": 1,
        })
    }

    /// Studier around `fitter`, fitting the whole dataset each set and
    /// writing the JSON summary.
    #[must_use]
    pub fn new(cfg: StageConfig, fitter: Fitter) -> Self {
        Self {
            base: StageBase::new(cfg),
            fitter,
            entries: SubDataEntries::All,
            sampler: Box::new(WholeSet),
            observer: Box::new(JsonSummary::new()),
            sets_done: 0,
        }
    }

    /// Choose how many entries each set draws.
    #[must_use]
    pub fn with_entries(mut self, entries: SubDataEntries) -> Self {
        self.entries = entries;
        self
    }

    /// Choose how subsets are drawn.
    #[must_use]
    pub fn with_sampler(mut self, sampler: impl SubDataSampler + 'static) -> Self {
        self.sampler = Box::new(sampler);
        self
    }

    /// Choose the per-set observer.
    #[must_use]
    pub fn with_observer(mut self, observer: impl ToyObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Inner fitter.
    #[must_use]
    pub const fn fitter(&self) -> &Fitter {
        &self.fitter
    }

    /// Sets completed in the last run.
    #[must_use]
    pub const fn sets_done(&self) -> usize {
        self.sets_done
    }

    fn run_sets_loop(&mut self, ctx: &mut ProcessContext, data: &Artifact, n_sets: u64) -> Result<()> {
        for set in 0..n_sets {
            let set = usize::try_from(set).map_err(|e| Error::Other(e.to_string()))?;
            ctx.db_player()?.reset_db(true)?;
            self.fitter.reset();
            self.fitter.customize(ctx)?;

            let entries = self.entries.draw(set, ctx)?;
            let subset = self.sampler.sample(data, entries, ctx.rng())?;
            self.fitter.run_with_data(ctx, vec![subset])?;
            self.observer.post_run_fit(set, &self.fitter, ctx)?;
            self.sets_done += 1;
        }
        Ok(())
    }
}

impl Stage for ToyStudier {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn customize(&mut self, ctx: &ProcessContext) -> Result<()> {
        self.base.customize(ctx)?;
        self.base.cfg().require_str("data")?;
        Ok(())
    }

    fn run(&mut self, ctx: &mut ProcessContext) -> Result<()> {
        let cfg = self.base.cfg();
        let key = cfg.require_str("data")?.to_string();
        let n_sets = cfg.u64_or("nSetOfToys", 1)?;
        let data = ctx
            .sources_mut()?
            .get(&key, Some(self.base.name()))
            .ok_or_else(|| Error::MissingDependency {
                stage: self.base.name().to_string(),
                key: key.clone(),
            })?;

        self.sets_done = 0;
        self.sampler.reset();
        self.observer.pre_sets_loop(ctx)?;
        self.run_sets_loop(ctx, &data, n_sets)?;
        self.observer.post_sets_loop(ctx)
    }

    fn publish(&mut self) -> Vec<(String, Artifact)> {
        self.fitter.publish()
    }

    fn reset(&mut self) {
        self.fitter.reset();
        self.sampler.reset();
        self.observer.reset();
        self.sets_done = 0;
    }
}
