//! Fit Parameter Schema
//!
//! Data structures exchanged between fitting stages and the fit-result
//! store.
//!
//! ## Schema Overview
//!
//! ```text
//! ParameterSet (1) ──< Parameter (N)        live, owned by one stage run
//!                          │
//!                          │  AliasMap: name -> store key | skip
//!                          ▼
//! store file  (1) ──< ParameterRecord (N)   persisted between stages
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use fitflow::param::{AliasMap, Parameter, ParameterRecord, ParameterSet, Resolution};
//!
//! let mut params = ParameterSet::new();
//! params.insert(Parameter::builder("fl", 0.5).error(0.1).range(0.0, 1.0).build());
//!
//! let aliases = AliasMap::new().rename("fl", "fl_randEffi");
//! assert_eq!(aliases.resolve("fl"), Resolution::Key("fl_randEffi"));
//!
//! let record = ParameterRecord::from_parameter(params.find("fl").unwrap()).unwrap();
//! assert_eq!(record.min(), Some(0.0));
//! ```

mod alias;
mod parameter;
mod pattern;
mod record;

pub use alias::{AliasMap, AliasRule, Resolution};
pub use parameter::{Parameter, ParameterBuilder, ParameterSet};
pub use pattern::{NamePattern, PatternList};
pub use record::{Attr, ParameterRecord, ParameterRecordBuilder};
