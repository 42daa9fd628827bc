//! Fitter stage
//!
//! Fits a booked model to booked data and syncs the parameters with the
//! bin's fit-result store:
//!
//! ```text
//! book model + data -> init from store -> freeze all, free argPattern
//!   -> pre-fit hooks -> migrad [-> hesse] [-> minos]
//!   -> freeze all -> update store -> publish "<name>.params"
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::rc::Rc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::engine::{as_model, FitStatus, Minimizer, ModelHandle};
use crate::config::{expand_bin_label, StageConfig};
use crate::flow::{artifact, Artifact, ProcessContext, Stage, StageBase};
use crate::param::{AliasMap, ParameterSet, PatternList};
use crate::sync::{init_from_file, update_to_file};
use crate::{Error, Result};

/// Hook run on the parameter set after store initialization, before migrad.
pub type PreFitHook = Box<dyn Fn(&mut ParameterSet, &mut ProcessContext) -> Result<()>>;

/// Configuration keys understood by [`Fitter`], resolved at `customize` time.
#[derive(Debug, Clone)]
struct FitSettings {
    pdf: String,
    data: Vec<String>,
    arg_pattern: PatternList,
    aliases: AliasMap,
    save_to_db: bool,
    db: Option<String>,
    hesse: bool,
    minos: Option<PatternList>,
}

impl FitSettings {
    fn from_cfg(cfg: &StageConfig, bin_label: &str) -> Result<Self> {
        let stage = cfg.stage_name();
        let data = cfg.str_list("data")?;
        if data.is_empty() {
            return Err(Error::config(stage, "data", "is required"));
        }
        Ok(Self {
            pdf: cfg.require_str("pdf")?.to_string(),
            data,
            arg_pattern: cfg.patterns("argPattern")?,
            aliases: cfg.alias_map("argAliasInDB")?,
            save_to_db: cfg.bool_or("saveToDB", true)?,
            db: cfg.opt_str("db")?.map(|t| expand_bin_label(t, bin_label)),
            hesse: cfg.bool_or("FitHesse", true)?,
            minos: minos_setting(cfg)?,
        })
    }
}

/// `FitMinos`: `bool` or `[bool, [patterns...]]`.
fn minos_setting(cfg: &StageConfig) -> Result<Option<PatternList>> {
    let bad = || Error::config(cfg.stage_name(), "FitMinos", "must be a boolean or [boolean, [patterns]]");
    match cfg.get("FitMinos") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(None),
        Some(Value::Bool(true)) => Ok(Some(PatternList::all())),
        Some(Value::Array(items)) => {
            let enabled = items.first().and_then(Value::as_bool).ok_or_else(bad)?;
            if !enabled {
                return Ok(None);
            }
            let sources = match items.get(1) {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::String(s)) => vec![s.clone()],
                Some(Value::Array(pats)) => pats
                    .iter()
                    .map(|p| p.as_str().map(str::to_string).ok_or_else(bad))
                    .collect::<Result<_>>()?,
                Some(_) => return Err(bad()),
            };
            Ok(Some(PatternList::new(sources)?))
        }
        Some(_) => Err(bad()),
    }
}

/// Standard fitting stage.
pub struct Fitter {
    base: StageBase,
    settings: Option<FitSettings>,
    pre_fit_hooks: Vec<PreFitHook>,
    model: Option<Rc<ModelHandle>>,
    data: Vec<Artifact>,
    minimizer: Option<Box<dyn Minimizer>>,
    params: ParameterSet,
    results: BTreeMap<String, FitStatus>,
}

impl std::fmt::Debug for Fitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fitter")
            .field("base", &self.base)
            .field("settings", &self.settings)
            .field("params", &self.params)
            .field("results", &self.results)
            .finish_non_exhaustive()
    }
}

impl Fitter {
    /// Default configuration; override keys with [`StageConfig::from_template`].
    #[must_use]
    pub fn template_config() -> Value {
        json!({
            "name": "StdFitter",
            "data": "dataReader.Fit",
            "pdf": "f",
            "FitHesse": true,
            "FitMinos": [true, []],
            "argPattern": ["^.+$"],
            "argAliasInDB": {},
            "saveToDB": true,
        })
    }

    /// Fitter from a stage configuration.
    #[must_use]
    pub fn new(cfg: StageConfig) -> Self {
        Self {
            base: StageBase::new(cfg),
            settings: None,
            pre_fit_hooks: Vec::new(),
            model: None,
            data: Vec::new(),
            minimizer: None,
            params: ParameterSet::new(),
            results: BTreeMap::new(),
        }
    }

    /// Fitter from the template merged with `overrides`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the merged configuration has no name.
    pub fn from_overrides(overrides: Value) -> Result<Self> {
        Ok(Self::new(StageConfig::from_template(Self::template_config(), overrides)?))
    }

    /// Shared stage state (configuration and customizers).
    #[must_use]
    pub const fn base(&self) -> &StageBase {
        &self.base
    }

    /// Shared stage state, mutably.
    pub fn base_mut(&mut self) -> &mut StageBase {
        &mut self.base
    }

    /// Append a pre-fit hook; hooks run in insertion order.
    pub fn add_pre_fit_hook<F>(&mut self, hook: F)
    where
        F: Fn(&mut ParameterSet, &mut ProcessContext) -> Result<()> + 'static,
    {
        self.pre_fit_hooks.push(Box::new(hook));
    }

    /// Parameters of the last fit.
    #[must_use]
    pub const fn params(&self) -> &ParameterSet {
        &self.params
    }

    /// Step results keyed `"<name>.<step>"`.
    #[must_use]
    pub const fn fit_results(&self) -> &BTreeMap<String, FitStatus> {
        &self.results
    }

    /// Result of one step (`migrad`, `hesse`, `minos`).
    #[must_use]
    pub fn fit_result(&self, step: &str) -> Option<FitStatus> {
        self.results.get(&self.step_key(step)).copied()
    }

    /// NLL of the last step run.
    #[must_use]
    pub fn nll(&self) -> Option<f64> {
        ["minos", "hesse", "migrad"].iter().find_map(|s| self.fit_result(s)).map(|r| r.nll)
    }

    /// Source key under which the fitted parameters are published.
    #[must_use]
    pub fn params_key(&self) -> String {
        format!("{}.params", self.name())
    }

    fn step_key(&self, step: &str) -> String {
        format!("{}.{step}", self.name())
    }

    fn settings(&self) -> Result<&FitSettings> {
        self.settings.as_ref().ok_or_else(|| Error::InvalidState {
            expected: format!("stage '{}' customized", self.name()),
            found: "not customized".to_string(),
        })
    }

    fn store_path(&self, ctx: &ProcessContext) -> Result<PathBuf> {
        let settings = self.settings()?;
        if let Some(db) = &settings.db {
            return Ok(ctx.work_dir().join(db));
        }
        match ctx.db_player().ok().and_then(|p| p.odb_file()) {
            Some(path) => Ok(path.to_path_buf()),
            None => Err(Error::config(
                self.name(),
                "db",
                "is not set and no dbplayer provides an output store",
            )),
        }
    }

    fn book_model(&mut self, ctx: &mut ProcessContext) -> Result<()> {
        let key = self.settings()?.pdf.clone();
        let obj = ctx.sources_mut()?.get(&key, Some(self.base.name()));
        let model = obj.as_ref().and_then(as_model).ok_or_else(|| Error::MissingDependency {
            stage: self.name().to_string(),
            key,
        })?;
        self.model = Some(model);
        Ok(())
    }

    fn book_data(&mut self, ctx: &mut ProcessContext) -> Result<()> {
        let keys = self.settings()?.data.clone();
        let sources = ctx.sources_mut()?;
        let mut data = Vec::with_capacity(keys.len());
        for key in keys {
            match sources.get(&key, Some(self.base.name())) {
                Some(obj) => data.push(obj),
                None => {
                    return Err(Error::MissingDependency {
                        stage: self.name().to_string(),
                        key,
                    })
                }
            }
        }
        self.data = data;
        Ok(())
    }

    /// Run the fit on explicitly supplied data instead of the configured keys.
    ///
    /// Used by toy loops that feed sampled subsets.
    ///
    /// # Errors
    ///
    /// Same as [`Stage::run`].
    pub fn run_with_data(&mut self, ctx: &mut ProcessContext, data: Vec<Artifact>) -> Result<()> {
        self.book_model(ctx)?;
        self.data = data;
        self.fit_booked(ctx)
    }

    fn fit_booked(&mut self, ctx: &mut ProcessContext) -> Result<()> {
        self.pre_fit(ctx)?;
        self.run_fit_steps()?;
        self.post_fit(ctx)
    }

    fn pre_fit(&mut self, ctx: &mut ProcessContext) -> Result<()> {
        let model = self.model.clone().ok_or_else(|| Error::InvalidState {
            expected: "model booked".to_string(),
            found: "no model".to_string(),
        })?;
        let mut params = model.parameters(&self.data)?;

        let path = self.store_path(ctx)?;
        let settings = self.settings()?;
        let report = init_from_file(&path, &mut params, &settings.aliases)?;
        debug!(stage = self.name(), synced = report.synced.len(), fresh = report.fresh.len(), "initialized from store");

        params.toggle_constant(true, &PatternList::all(), false);
        params.toggle_constant(false, &settings.arg_pattern, false);
        for hook in &self.pre_fit_hooks {
            hook(&mut params, ctx)?;
        }

        self.minimizer = Some(model.minimizer(&self.data)?);
        self.params = params;
        Ok(())
    }

    fn record(&mut self, step: &str, status: FitStatus) -> Result<()> {
        info!(stage = self.name(), step, status = status.status, nll = status.nll, "fit step done");
        self.results.insert(self.step_key(step), status);
        if status.is_hard_failure() {
            return Err(Error::Fit {
                stage: self.name().to_string(),
                step: step.to_string(),
                status: status.status,
            });
        }
        if !status.is_ok() {
            warn!(stage = self.name(), step, status = status.status, "fit did not converge cleanly");
        }
        Ok(())
    }

    fn run_fit_steps(&mut self) -> Result<()> {
        let (hesse, minos) = {
            let settings = self.settings()?;
            (settings.hesse, settings.minos.clone())
        };
        let mut minimizer = self.minimizer.take().ok_or_else(|| Error::InvalidState {
            expected: "minimizer booked".to_string(),
            found: "no minimizer".to_string(),
        })?;

        let status = minimizer.migrad(&mut self.params)?;
        self.record("migrad", status)?;
        if hesse {
            let status = minimizer.hesse(&mut self.params)?;
            self.record("hesse", status)?;
        }
        if let Some(selection) = minos {
            let targets: Vec<String> = self
                .params
                .subset(&selection, false)
                .iter()
                .filter(|p| !p.is_constant())
                .map(|p| p.name().to_string())
                .collect();
            let status = minimizer.minos(&mut self.params, &targets)?;
            self.record("minos", status)?;
        }
        self.minimizer = Some(minimizer);
        Ok(())
    }

    fn post_fit(&mut self, ctx: &ProcessContext) -> Result<()> {
        self.params.toggle_constant(true, &PatternList::all(), false);
        let settings = self.settings()?;
        if settings.save_to_db {
            let path = self.store_path(ctx)?;
            let report = update_to_file(&path, &self.params, &settings.aliases)?;
            debug!(stage = self.name(), written = report.synced.len(), path = %path.display(), "fit results stored");
        }
        Ok(())
    }
}

impl Stage for Fitter {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn customize(&mut self, ctx: &ProcessContext) -> Result<()> {
        self.base.customize(ctx)?;
        self.settings = Some(FitSettings::from_cfg(self.base.cfg(), ctx.bin_label())?);
        Ok(())
    }

    fn run(&mut self, ctx: &mut ProcessContext) -> Result<()> {
        self.book_model(ctx)?;
        self.book_data(ctx)?;
        self.fit_booked(ctx)
    }

    fn publish(&mut self) -> Vec<(String, Artifact)> {
        if self.results.is_empty() {
            return Vec::new();
        }
        vec![(self.params_key(), artifact(self.params.clone()))]
    }

    fn reset(&mut self) {
        self.model = None;
        self.data.clear();
        self.minimizer = None;
        self.params = ParameterSet::new();
        self.results.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_config_is_valid() {
        let fitter = Fitter::from_overrides(json!({"name": "finalFitter"})).unwrap();
        assert_eq!(fitter.name(), "finalFitter");
        let settings = FitSettings::from_cfg(fitter.base().cfg(), "bin1").unwrap();
        assert_eq!(settings.pdf, "f");
        assert_eq!(settings.data, vec!["dataReader.Fit"]);
        assert!(settings.save_to_db);
        assert!(settings.hesse);
        assert!(settings.minos.unwrap().is_empty());
    }

    #[test]
    fn test_db_template_expands_bin_label() {
        let fitter = Fitter::from_overrides(json!({"name": "f", "db": "fitResults_{binLabel}.db"})).unwrap();
        let settings = FitSettings::from_cfg(fitter.base().cfg(), "bin3").unwrap();
        assert_eq!(settings.db.as_deref(), Some("fitResults_bin3.db"));
    }

    #[test]
    fn test_minos_setting_shapes() {
        let cfg = |v: Value| StageConfig::from_value(json!({"name": "f", "FitMinos": v})).unwrap();
        assert!(minos_setting(&cfg(json!(false))).unwrap().is_none());
        assert!(minos_setting(&cfg(json!([false, ["fl"]]))).unwrap().is_none());
        assert_eq!(minos_setting(&cfg(json!([true, ["fl", "afb"]]))).unwrap().unwrap().len(), 2);
        assert!(minos_setting(&cfg(json!("yes"))).is_err());
    }

    #[test]
    fn test_missing_pdf_is_config_error() {
        let cfg = StageConfig::from_value(json!({"name": "bare", "data": "d"})).unwrap();
        let err = FitSettings::from_cfg(&cfg, "bin1").unwrap_err();
        assert!(matches!(err, Error::Config { ref key, .. } if key == "pdf"));
    }

    #[test]
    fn test_run_before_customize_is_invalid_state() {
        let fitter = Fitter::from_overrides(json!({"name": "f"})).unwrap();
        assert!(matches!(fitter.settings(), Err(Error::InvalidState { .. })));
    }
}
