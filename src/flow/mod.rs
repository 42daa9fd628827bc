//! Pipeline Flow Control
//!
//! A [`Process`] owns an ordered [`ServiceRegistry`] and a sequence of
//! [`Stage`]s. Stages never reach for global state: everything they need
//! (configuration, services, random source) comes through the
//! [`ProcessContext`] passed to each lifecycle call.
//!
//! ```text
//! Process::run
//!   begin_seq   mkdir + chdir work dir, Service::begin_seq in order
//!   run_seq     for stage in sequence: customize -> run -> publish
//!   end_seq     Service::end_seq in reverse order, restore cwd
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use fitflow::flow::{artifact, Artifact, Process, ProcessContext, Stage};
//!
//! struct Reader;
//!
//! impl Stage for Reader {
//!     fn name(&self) -> &str {
//!         "dataReader"
//!     }
//!
//!     fn run(&mut self, _ctx: &mut ProcessContext) -> fitflow::Result<()> {
//!         Ok(())
//!     }
//!
//!     fn publish(&mut self) -> Vec<(String, Artifact)> {
//!         vec![("dataReader.Fit".to_string(), artifact(vec![0.1_f64, 0.2]))]
//!     }
//! }
//!
//! # fn example() -> fitflow::Result<()> {
//! let mut process = Process::new("demo", "output/demo");
//! process.add_stage(Reader);
//! process.run()?;
//! # Ok(())
//! # }
//! ```

mod dbplayer;
mod files;
mod logger;
mod process;
mod service;
mod source;
mod stage;

pub use dbplayer::{db_file_name, DbPlayer};
pub use files::{FileManager, FileMode};
pub use logger::{Logger, VerbosityLevel, DEFAULT_LOG_FILE};
pub use process::{
    Process, ProcessContext, ProcessEnv, ProcessRecord, ProcessState, DB_PLAYER, FILE_MANAGER, LOGGER,
    SOURCE_MANAGER,
};
pub use service::{Service, ServiceRegistry};
pub use source::{artifact, Artifact, SourceManager};
pub use stage::{require_source, Customizer, Stage, StageBase};
