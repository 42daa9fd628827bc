//! # fitflow: Staged Fitting Pipelines with a Persistent Fit-Result Store
//!
//! fitflow runs physics-analysis fits as a linear sequence of stages
//! (data loading, model building, fitting, toy studies). Stages exchange
//! in-memory artifacts through a source manager and persist parameter
//! results between stages and runs in one store file per physics bin.
//!
//! ## Design Principles
//!
//! - **Explicit context**: stages receive a [`flow::ProcessContext`]; there
//!   is no global registry
//! - **Write what exists**: stored records only hold the attributes a
//!   parameter actually has
//! - **Guaranteed teardown**: services end in reverse order even when a
//!   stage fails, and the working directory is always restored
//! - **One writer per store**: parallelism is one process per bin or batch
//!   job, never threads sharing a store
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use fitflow::kv::{FileStore, OpenMode};
//! use fitflow::param::{AliasMap, Parameter, ParameterSet};
//! use fitflow::sync::{init_from, update_to};
//!
//! let mut params: ParameterSet = [Parameter::builder("fl", 0.5).range(0.0, 1.0).build()]
//!     .into_iter()
//!     .collect();
//!
//! let mut store = FileStore::open("fitResults_bin1.db", OpenMode::ReadWrite)?;
//! init_from(&store, &mut params, &AliasMap::new())?;
//! update_to(&mut store, &params, &AliasMap::new())?;
//! store.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod batch;
pub mod config;
pub mod error;
pub mod fitter;
pub mod flow;
pub mod kv;
pub mod param;
pub mod sync;

pub use error::{Error, Result};
