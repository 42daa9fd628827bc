//! Fitting Stages
//!
//! - [`Fitter`]: standard fit with store sync, driven by a [`FitModel`]
//! - [`ObjProvider`]: books artifacts no earlier stage produced
//! - [`ToyStudier`]: repeats a fitter over sampled subsets
//! - [`GaussianModel`]: closed-form reference engine for `Vec<f64>` data
//!
//! # Example
//!
//! ```rust,no_run
//! use fitflow::fitter::{model_artifact, Fitter, GaussianModel, ObjProvider};
//! use fitflow::flow::{artifact, DbPlayer, Process, DB_PLAYER};
//! use serde_json::json;
//!
//! # fn example() -> fitflow::Result<()> {
//! let provider = ObjProvider::new("objProvider")
//!     .with_builder("f", |_| Ok(Some(model_artifact(GaussianModel::new("f")))))
//!     .with_builder("dataReader.Fit", |_| Ok(Some(artifact(vec![0.9_f64, 1.1, 1.0]))));
//!
//! let mut process = Process::new("nominal", "output/nominal");
//! process.add_service(DB_PLAYER, Box::new(DbPlayer::new()));
//! process.add_stage(provider);
//! process.add_stage(Fitter::from_overrides(json!({"name": "finalFitter"}))?);
//! process.run()?;
//! # Ok(())
//! # }
//! ```

mod engine;
mod gauss;
mod provider;
mod stage;
mod toy;

pub use engine::{as_model, model_artifact, FitModel, FitStatus, Minimizer, ModelHandle};
pub use gauss::{GaussianMinimizer, GaussianModel, STATUS_NO_DATA};
pub use provider::{Builder, ObjProvider};
pub use stage::{Fitter, PreFitHook};
pub use toy::{
    JsonSummary, RandomSubset, SequentialSubset, SubDataEntries, SubDataSampler, ToyObserver, ToyStudier, WholeSet,
    NLL_SANITY_LIMIT, SUMMARY_KEY,
};
