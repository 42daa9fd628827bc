//! Reference engine: unbinned Gaussian fit with closed-form estimates
//!
//! Data artifacts are `Vec<f64>`; several datasets are concatenated. The
//! model floats `mean` and `sigma` and honours constancy and bounds, which
//! is all the pipeline needs to exercise store sync and toy loops.

use std::f64::consts::PI;

use crate::flow::Artifact;
use crate::param::{Parameter, ParameterSet};
use crate::{Error, Result};

use super::engine::{FitModel, FitStatus, Minimizer};

/// Status reported when the dataset is empty.
pub const STATUS_NO_DATA: i32 = -1;

/// Gaussian model with `mean` and `sigma` parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianModel {
    name: String,
    mean: (f64, f64, f64),
    sigma: (f64, f64, f64),
}

impl GaussianModel {
    /// Model starting at mean 0 in [-10, 10] and sigma 1 in [1e-3, 10].
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mean: (0.0, -10.0, 10.0),
            sigma: (1.0, 1e-3, 10.0),
        }
    }

    /// Default value and bounds of `mean`.
    #[must_use]
    pub fn with_mean(mut self, value: f64, min: f64, max: f64) -> Self {
        self.mean = (value, min, max);
        self
    }

    /// Default value and bounds of `sigma`.
    #[must_use]
    pub fn with_sigma(mut self, value: f64, min: f64, max: f64) -> Self {
        self.sigma = (value, min, max);
        self
    }
}

fn collect_events(data: &[Artifact]) -> Result<Vec<f64>> {
    let mut events = Vec::new();
    for obj in data {
        let sample = obj
            .downcast_ref::<Vec<f64>>()
            .ok_or_else(|| Error::Other("gaussian model expects Vec<f64> datasets".to_string()))?;
        events.extend_from_slice(sample);
    }
    Ok(events)
}

impl FitModel for GaussianModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameters(&self, data: &[Artifact]) -> Result<ParameterSet> {
        collect_events(data)?;
        let (mean, mean_lo, mean_hi) = self.mean;
        let (sigma, sigma_lo, sigma_hi) = self.sigma;
        Ok([
            Parameter::builder("mean", mean).range(mean_lo, mean_hi).constant(false).build(),
            Parameter::builder("sigma", sigma).range(sigma_lo, sigma_hi).constant(false).build(),
        ]
        .into_iter()
        .collect())
    }

    fn minimizer(&self, data: &[Artifact]) -> Result<Box<dyn Minimizer>> {
        Ok(Box::new(GaussianMinimizer {
            events: collect_events(data)?,
        }))
    }
}

/// Closed-form maximum-likelihood minimizer.
#[derive(Debug, Clone)]
pub struct GaussianMinimizer {
    events: Vec<f64>,
}

struct Slot {
    value: f64,
    floating: bool,
    min: f64,
    max: f64,
}

fn current(params: &ParameterSet) -> Result<(f64, f64)> {
    Ok((slot(params, "mean")?.value, slot(params, "sigma")?.value))
}

fn slot(params: &ParameterSet, name: &str) -> Result<Slot> {
    let p = params.find(name).ok_or_else(|| Error::InvalidParameter {
        name: name.to_string(),
        reason: "not in the fitted parameter set".to_string(),
    })?;
    Ok(Slot {
        value: p.value(),
        floating: !p.is_constant(),
        min: p.min().unwrap_or(f64::NEG_INFINITY),
        max: p.max().unwrap_or(f64::INFINITY),
    })
}

impl GaussianMinimizer {
    #[allow(clippy::cast_precision_loss)]
    fn n(&self) -> f64 {
        self.events.len() as f64
    }

    fn nll(&self, mean: f64, sigma: f64) -> f64 {
        let n = self.n();
        let chi2: f64 = self.events.iter().map(|x| (x - mean).powi(2)).sum();
        n * sigma.ln() + chi2 / (2.0 * sigma * sigma) + 0.5 * n * (2.0 * PI).ln()
    }

    fn errors(&self, sigma: f64) -> (f64, f64) {
        let n = self.n();
        (sigma / n.sqrt(), sigma / (2.0 * n).sqrt())
    }
}

impl Minimizer for GaussianMinimizer {
    fn migrad(&mut self, params: &mut ParameterSet) -> Result<FitStatus> {
        if self.events.is_empty() {
            return Ok(FitStatus::new(STATUS_NO_DATA, f64::NAN));
        }
        let mean = slot(params, "mean")?;
        let sigma = slot(params, "sigma")?;

        let mean_hat = if mean.floating {
            (self.events.iter().sum::<f64>() / self.n()).clamp(mean.min, mean.max)
        } else {
            mean.value
        };
        let sigma_hat = if sigma.floating {
            let var = self.events.iter().map(|x| (x - mean_hat).powi(2)).sum::<f64>() / self.n();
            var.sqrt().clamp(sigma.min, sigma.max)
        } else {
            sigma.value
        };

        if let Some(p) = params.find_mut("mean") {
            p.set_value(mean_hat);
        }
        if let Some(p) = params.find_mut("sigma") {
            p.set_value(sigma_hat);
        }
        Ok(FitStatus::new(0, self.nll(mean_hat, sigma_hat)))
    }

    fn hesse(&mut self, params: &mut ParameterSet) -> Result<FitStatus> {
        if self.events.is_empty() {
            return Ok(FitStatus::new(STATUS_NO_DATA, f64::NAN));
        }
        let (mean, sigma) = current(params)?;
        let (mean_err, sigma_err) = self.errors(sigma);
        for (name, err) in [("mean", mean_err), ("sigma", sigma_err)] {
            if let Some(p) = params.find_mut(name).filter(|p| !p.is_constant()) {
                p.set_error(err);
            }
        }
        Ok(FitStatus::new(0, self.nll(mean, sigma)))
    }

    fn minos(&mut self, params: &mut ParameterSet, targets: &[String]) -> Result<FitStatus> {
        if self.events.is_empty() {
            return Ok(FitStatus::new(STATUS_NO_DATA, f64::NAN));
        }
        let (mean, sigma) = current(params)?;
        let (mean_err, sigma_err) = self.errors(sigma);
        for target in targets {
            let err = match target.as_str() {
                "mean" => mean_err,
                "sigma" => sigma_err,
                _ => continue,
            };
            if let Some(p) = params.find_mut(target).filter(|p| !p.is_constant()) {
                p.set_asym_error(-err, err);
            }
        }
        Ok(FitStatus::new(0, self.nll(mean, sigma)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::artifact;

    fn data() -> Vec<Artifact> {
        vec![artifact(vec![1.0_f64, 2.0, 3.0]), artifact(vec![4.0_f64, 5.0])]
    }

    #[test]
    fn test_migrad_estimates_mean_and_sigma() {
        let model = GaussianModel::new("gauss");
        let mut params = model.parameters(&data()).unwrap();
        let mut minimizer = model.minimizer(&data()).unwrap();

        let status = minimizer.migrad(&mut params).unwrap();
        assert!(status.is_ok());
        assert!((params.find("mean").unwrap().value() - 3.0).abs() < 1e-12);
        assert!((params.find("sigma").unwrap().value() - 2.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_constant_parameter_is_untouched() {
        let model = GaussianModel::new("gauss");
        let mut params = model.parameters(&data()).unwrap();
        params.find_mut("mean").unwrap().set_constant(true);
        let mut minimizer = model.minimizer(&data()).unwrap();

        minimizer.migrad(&mut params).unwrap();
        minimizer.hesse(&mut params).unwrap();
        let mean = params.find("mean").unwrap();
        assert_eq!(mean.value(), 0.0);
        assert!(mean.error().is_none());
        assert!(params.find("sigma").unwrap().error().is_some());
    }

    #[test]
    fn test_bounds_clamp_estimate() {
        let model = GaussianModel::new("gauss").with_mean(0.0, -1.0, 1.0);
        let mut params = model.parameters(&data()).unwrap();
        model.minimizer(&data()).unwrap().migrad(&mut params).unwrap();
        assert_eq!(params.find("mean").unwrap().value(), 1.0);
    }

    #[test]
    fn test_minos_sets_asymmetric_errors_on_targets() {
        let model = GaussianModel::new("gauss");
        let mut params = model.parameters(&data()).unwrap();
        let mut minimizer = model.minimizer(&data()).unwrap();
        minimizer.migrad(&mut params).unwrap();
        minimizer.minos(&mut params, &["mean".to_string()]).unwrap();

        let (lo, hi) = params.find("mean").unwrap().asym_error().unwrap();
        assert!(lo < 0.0 && hi > 0.0);
        assert!(params.find("sigma").unwrap().asym_error().is_none());
    }

    #[test]
    fn test_empty_data_is_hard_failure() {
        let model = GaussianModel::new("gauss");
        let empty = vec![artifact(Vec::<f64>::new())];
        let mut params = model.parameters(&empty).unwrap();
        let status = model.minimizer(&empty).unwrap().migrad(&mut params).unwrap();
        assert!(status.is_hard_failure());
    }

    #[test]
    fn test_wrong_data_type_is_error() {
        let model = GaussianModel::new("gauss");
        assert!(model.parameters(&[artifact("not numbers")]).is_err());
    }
}
