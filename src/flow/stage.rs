//! Stage - one ordered unit of pipeline work

use std::any::Any;
use std::rc::Rc;

use super::{Artifact, ProcessContext};
use crate::config::StageConfig;
use crate::{Error, Result};

/// A pipeline unit driven by [`Process`](super::Process).
///
/// Per sequence execution the process calls `customize`, `run`, then
/// `publish`. `reset` returns the stage to its pre-run state without
/// touching configuration, so a toy loop can re-run it cheaply.
pub trait Stage {
    /// Stage name, used as provenance tag and in error messages.
    fn name(&self) -> &str;

    /// Pull process-level settings into the stage's own configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a required key is missing.
    fn customize(&mut self, _ctx: &ProcessContext) -> Result<()> {
        Ok(())
    }

    /// Perform the unit of work.
    ///
    /// # Errors
    ///
    /// Any fatal condition; the process stops the sequence on it.
    fn run(&mut self, ctx: &mut ProcessContext) -> Result<()>;

    /// Artifacts to register in the source manager, tagged with [`name`](Self::name).
    fn publish(&mut self) -> Vec<(String, Artifact)> {
        Vec::new()
    }

    /// Drop every run-owned state, keeping configuration.
    fn reset(&mut self) {}
}

/// Per-instance configuration hook run at `customize` time.
pub type Customizer = Box<dyn Fn(&mut StageConfig, &ProcessContext) -> Result<()>>;

/// Configuration plus customizer chain shared by concrete stages.
pub struct StageBase {
    cfg: StageConfig,
    customizers: Vec<Customizer>,
}

impl std::fmt::Debug for StageBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageBase")
            .field("cfg", &self.cfg)
            .field("customizers", &self.customizers.len())
            .finish()
    }
}

impl StageBase {
    /// Wrap a stage configuration.
    #[must_use]
    pub fn new(cfg: StageConfig) -> Self {
        Self {
            cfg,
            customizers: Vec::new(),
        }
    }

    /// Stage name from the configuration.
    #[must_use]
    pub fn name(&self) -> &str {
        self.cfg.stage_name()
    }

    /// Current configuration.
    #[must_use]
    pub const fn cfg(&self) -> &StageConfig {
        &self.cfg
    }

    /// Mutable configuration.
    pub fn cfg_mut(&mut self) -> &mut StageConfig {
        &mut self.cfg
    }

    /// Append a customizer; they run in insertion order.
    pub fn add_customizer<F>(&mut self, f: F)
    where
        F: Fn(&mut StageConfig, &ProcessContext) -> Result<()> + 'static,
    {
        self.customizers.push(Box::new(f));
    }

    /// Run every customizer against the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first customizer error.
    pub fn customize(&mut self, ctx: &ProcessContext) -> Result<()> {
        self.customizers.iter().try_for_each(|f| f(&mut self.cfg, ctx))
    }
}

/// Fetch an artifact the stage cannot run without.
///
/// # Errors
///
/// Returns [`Error::MissingDependency`] naming `stage` and `key` when the
/// artifact is absent or of another type.
pub fn require_source<T: Any>(ctx: &mut ProcessContext, stage: &str, key: &str) -> Result<Rc<T>> {
    ctx.sources_mut()?
        .get_as::<T>(key, Some(stage))
        .ok_or_else(|| Error::MissingDependency {
            stage: stage.to_string(),
            key: key.to_string(),
        })
}
