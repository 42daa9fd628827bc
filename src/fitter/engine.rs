//! Fit-engine contract
//!
//! The pipeline never interprets a model's formula. A [`FitModel`] turns
//! datasets into a parameter set and a [`Minimizer`]; every minimizer step
//! reports a [`FitStatus`].

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::flow::{artifact, Artifact};
use crate::param::ParameterSet;
use crate::Result;

/// Outcome of one minimizer step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitStatus {
    /// Engine status code; 0 is a converged fit, negative is a hard failure.
    pub status: i32,
    /// Minimized negative log-likelihood.
    pub nll: f64,
}

impl FitStatus {
    /// Status with code and NLL.
    #[must_use]
    pub const fn new(status: i32, nll: f64) -> Self {
        Self { status, nll }
    }

    /// Converged fit.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.status == 0
    }

    /// Hard failure the fitter refuses to continue after.
    #[must_use]
    pub const fn is_hard_failure(&self) -> bool {
        self.status < 0
    }
}

/// Minimizer bound to one model and dataset.
///
/// Each step updates the parameters it floats in place. Constant parameters
/// must be left untouched.
pub trait Minimizer {
    /// Main minimization.
    ///
    /// # Errors
    ///
    /// Engine-specific failures.
    fn migrad(&mut self, params: &mut ParameterSet) -> Result<FitStatus>;

    /// Symmetric errors from the second derivatives.
    ///
    /// # Errors
    ///
    /// Engine-specific failures.
    fn hesse(&mut self, params: &mut ParameterSet) -> Result<FitStatus>;

    /// Asymmetric errors for the named parameters.
    ///
    /// # Errors
    ///
    /// Engine-specific failures.
    fn minos(&mut self, params: &mut ParameterSet, targets: &[String]) -> Result<FitStatus>;
}

/// A model that can be fitted to datasets.
pub trait FitModel {
    /// Model name.
    fn name(&self) -> &str;

    /// Model parameters for the given datasets, at their default values.
    ///
    /// # Errors
    ///
    /// Returns an error when the datasets do not suit the model.
    fn parameters(&self, data: &[Artifact]) -> Result<ParameterSet>;

    /// Minimizer of the negative log-likelihood over `data`.
    ///
    /// # Errors
    ///
    /// Returns an error when the datasets do not suit the model.
    fn minimizer(&self, data: &[Artifact]) -> Result<Box<dyn Minimizer>>;
}

/// How models are stored in the source manager.
pub type ModelHandle = Box<dyn FitModel>;

/// Wrap a model as an artifact retrievable as [`ModelHandle`].
pub fn model_artifact(model: impl FitModel + 'static) -> Artifact {
    let handle: ModelHandle = Box::new(model);
    artifact(handle)
}

/// Retrieve a model from an artifact made by [`model_artifact`].
#[must_use]
pub fn as_model(obj: &Artifact) -> Option<Rc<ModelHandle>> {
    Rc::clone(obj).downcast::<ModelHandle>().ok()
}
