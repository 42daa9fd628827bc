//! Process - lifecycle driver of one pipeline run
//!
//! States: `Created -> Running -> Ended`. `begin_seq` prepares the work
//! directory and starts services, `run_seq` drives the stage sequence in
//! list order, `end_seq` tears services down in reverse and restores the
//! previous working directory. [`Process::run`] guarantees `end_seq` runs
//! even when a stage fails.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::{DbPlayer, FileManager, Logger, Service, ServiceRegistry, SourceManager, Stage, DEFAULT_LOG_FILE};
use crate::config::ProcessConfig;
use crate::{Error, Result};

/// Registry name of the logger service.
pub const LOGGER: &str = "logger";
/// Registry name of the file manager service.
pub const FILE_MANAGER: &str = "filemanager";
/// Registry name of the source manager service.
pub const SOURCE_MANAGER: &str = "sourcemanager";
/// Registry name of the DB player service.
pub const DB_PLAYER: &str = "dbplayer";

/// Immutable facts about the running process, handed to services.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessEnv {
    name: String,
    work_dir: PathBuf,
    config: ProcessConfig,
}

impl ProcessEnv {
    /// Environment with default configuration.
    #[must_use]
    pub fn new(name: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self::with_config(name, work_dir, ProcessConfig::default())
    }

    /// Environment with explicit configuration.
    #[must_use]
    pub fn with_config(name: impl Into<String>, work_dir: impl Into<PathBuf>, config: ProcessConfig) -> Self {
        Self {
            name: name.into(),
            work_dir: work_dir.into(),
            config,
        }
    }

    /// Process name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Work directory; absolute once the process has begun.
    #[must_use]
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Process configuration.
    #[must_use]
    pub const fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// Label of the active bin.
    #[must_use]
    pub fn bin_label(&self) -> &str {
        self.config.bin_label()
    }
}

/// What stages see of the process: environment, services, random source.
#[derive(Debug)]
pub struct ProcessContext {
    env: ProcessEnv,
    services: ServiceRegistry,
    rng: StdRng,
}

impl ProcessContext {
    /// Context without services, random source seeded from the configuration.
    #[must_use]
    pub fn new(env: ProcessEnv) -> Self {
        let rng = StdRng::seed_from_u64(env.config.seed);
        Self {
            env,
            services: ServiceRegistry::new(),
            rng,
        }
    }

    /// Process environment.
    #[must_use]
    pub const fn env(&self) -> &ProcessEnv {
        &self.env
    }

    /// Process configuration.
    #[must_use]
    pub const fn config(&self) -> &ProcessConfig {
        &self.env.config
    }

    /// Label of the active bin.
    #[must_use]
    pub fn bin_label(&self) -> &str {
        self.env.bin_label()
    }

    /// Work directory.
    #[must_use]
    pub fn work_dir(&self) -> &Path {
        &self.env.work_dir
    }

    /// Registered services.
    #[must_use]
    pub const fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    /// Registered services, mutably.
    pub fn services_mut(&mut self) -> &mut ServiceRegistry {
        &mut self.services
    }

    /// Process random source.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Source manager.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingService`] if it is not registered.
    pub fn sources(&self) -> Result<&SourceManager> {
        self.services.require(SOURCE_MANAGER)
    }

    /// Source manager, mutably.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingService`] if it is not registered.
    pub fn sources_mut(&mut self) -> Result<&mut SourceManager> {
        self.services.require_mut(SOURCE_MANAGER)
    }

    /// File manager, mutably.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingService`] if it is not registered.
    pub fn files_mut(&mut self) -> Result<&mut FileManager> {
        self.services.require_mut(FILE_MANAGER)
    }

    /// DB player.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingService`] if it is not registered.
    pub fn db_player(&self) -> Result<&DbPlayer> {
        self.services.require(DB_PLAYER)
    }

    /// DB player, mutably.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingService`] if it is not registered.
    pub fn db_player_mut(&mut self) -> Result<&mut DbPlayer> {
        self.services.require_mut(DB_PLAYER)
    }
}

/// Lifecycle state of a [`Process`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    /// Constructed, services not started.
    Created,
    /// Services started, stages may run.
    Running,
    /// Torn down; final.
    Ended,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "Created",
            Self::Running => "Running",
            Self::Ended => "Ended",
        };
        f.write_str(s)
    }
}

/// Execution record of a process run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    name: String,
    state: ProcessState,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    failed_stage: Option<String>,
}

impl ProcessRecord {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: ProcessState::Created,
            started_at: None,
            ended_at: None,
            failed_stage: None,
        }
    }

    /// Process name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ProcessState {
        self.state
    }

    /// When `begin_seq` ran.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// When `end_seq` ran.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Name of the stage that stopped the sequence, if any.
    #[must_use]
    pub fn failed_stage(&self) -> Option<&str> {
        self.failed_stage.as_deref()
    }
}

/// One pipeline run: services, stage sequence, lifecycle.
pub struct Process {
    ctx: ProcessContext,
    sequence: Vec<Box<dyn Stage>>,
    record: ProcessRecord,
    prev_dir: Option<PathBuf>,
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("ctx", &self.ctx)
            .field("sequence", &self.sequence.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("record", &self.record)
            .finish()
    }
}

impl Process {
    /// Process with default configuration.
    ///
    /// Registers the logger (to `runtime.log`), the file manager and the
    /// source manager, in that order.
    #[must_use]
    pub fn new(name: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self::with_config(name, work_dir, ProcessConfig::default())
    }

    /// Process with explicit configuration and the default services.
    #[must_use]
    pub fn with_config(name: impl Into<String>, work_dir: impl Into<PathBuf>, config: ProcessConfig) -> Self {
        let env = ProcessEnv::with_config(name, work_dir, config);
        let record = ProcessRecord::new(env.name());
        let mut ctx = ProcessContext::new(env);
        ctx.services.add(LOGGER, Box::new(Logger::to_file(DEFAULT_LOG_FILE)));
        ctx.services.add(FILE_MANAGER, Box::new(FileManager::new()));
        ctx.services.add(SOURCE_MANAGER, Box::new(SourceManager::new()));
        Self {
            ctx,
            sequence: Vec::new(),
            record,
            prev_dir: None,
        }
    }

    /// Process name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.ctx.env.name()
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ProcessState {
        self.record.state
    }

    /// Execution record.
    #[must_use]
    pub const fn record(&self) -> &ProcessRecord {
        &self.record
    }

    /// Stage-facing context.
    #[must_use]
    pub const fn context(&self) -> &ProcessContext {
        &self.ctx
    }

    /// Stage-facing context, mutably.
    pub fn context_mut(&mut self) -> &mut ProcessContext {
        &mut self.ctx
    }

    /// Register a service after the existing ones.
    pub fn add_service(&mut self, name: impl Into<String>, service: Box<dyn Service>) {
        self.ctx.services.add(name, service);
    }

    /// Replace the stage sequence.
    pub fn set_sequence(&mut self, sequence: Vec<Box<dyn Stage>>) {
        self.sequence = sequence;
    }

    /// Append a stage to the sequence.
    pub fn add_stage(&mut self, stage: impl Stage + 'static) {
        self.sequence.push(Box::new(stage));
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.sequence.iter().map(|s| s.name())
    }

    /// Point the process at another work directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] once the process has begun.
    pub fn set_work_dir(&mut self, work_dir: impl Into<PathBuf>) -> Result<()> {
        self.expect_state(ProcessState::Created)?;
        self.ctx.env.work_dir = work_dir.into();
        Ok(())
    }

    /// Replace the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] once the process has begun.
    pub fn set_config(&mut self, config: ProcessConfig) -> Result<()> {
        self.expect_state(ProcessState::Created)?;
        self.ctx.env.config = config;
        Ok(())
    }

    fn expect_state(&self, expected: ProcessState) -> Result<()> {
        if self.record.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidState {
                expected: expected.to_string(),
                found: self.record.state.to_string(),
            })
        }
    }

    /// Enter the work directory and start every service in registration order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless `Created`, IO errors for the
    /// work directory, or the first service setup failure. On a service
    /// failure the process is already `Running` and must still be ended.
    pub fn begin_seq(&mut self) -> Result<()> {
        self.expect_state(ProcessState::Created)?;
        std::fs::create_dir_all(&self.ctx.env.work_dir)?;
        let work_dir = self.ctx.env.work_dir.canonicalize()?;
        self.prev_dir = Some(std::env::current_dir()?);
        std::env::set_current_dir(&work_dir)?;
        self.ctx.env.work_dir = work_dir;
        self.ctx.rng = StdRng::seed_from_u64(self.ctx.env.config.seed);
        self.record.state = ProcessState::Running;
        self.record.started_at = Some(Utc::now());

        let ProcessContext { env, services, .. } = &mut self.ctx;
        services.begin_all(env)?;
        info!(
            process = %env.name,
            work_dir = %env.work_dir.display(),
            bin = env.bin_label(),
            "process started"
        );
        Ok(())
    }

    /// Run every stage in list order: customize, run, publish.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless `Running`, or the first stage
    /// failure; later stages do not run.
    pub fn run_seq(&mut self) -> Result<()> {
        self.expect_state(ProcessState::Running)?;
        let Self {
            ctx, sequence, record, ..
        } = self;
        for stage in sequence.iter_mut() {
            if let Err(e) = run_stage(stage.as_mut(), ctx) {
                error!(stage = stage.name(), error = %e, "stage failed");
                record.failed_stage = Some(stage.name().to_string());
                return Err(e);
            }
        }
        Ok(())
    }

    /// Tear down services last-registered first and restore the working directory.
    ///
    /// Valid from `Created` or `Running`; every service is torn down even if
    /// one fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if already `Ended`, else the first
    /// teardown or directory-restore failure.
    pub fn end_seq(&mut self) -> Result<()> {
        if self.record.state == ProcessState::Ended {
            return Err(Error::InvalidState {
                expected: "Created or Running".to_string(),
                found: ProcessState::Ended.to_string(),
            });
        }
        let teardown = self.ctx.services.end_all();
        let restore = match self.prev_dir.take() {
            Some(dir) => std::env::set_current_dir(&dir).map_err(Error::from),
            None => Ok(()),
        };
        self.record.state = ProcessState::Ended;
        self.record.ended_at = Some(Utc::now());
        debug!(process = %self.ctx.env.name, "process ended");
        teardown.and(restore)
    }

    /// `begin_seq` then `run_seq`, with `end_seq` guaranteed afterwards.
    ///
    /// # Errors
    ///
    /// Returns the first failure; a stage failure takes precedence over a
    /// teardown failure.
    pub fn run(&mut self) -> Result<()> {
        let outcome = self.begin_seq().and_then(|()| self.run_seq());
        let teardown = self.end_seq();
        outcome.and(teardown)
    }
}

fn run_stage(stage: &mut dyn Stage, ctx: &mut ProcessContext) -> Result<()> {
    debug!(stage = stage.name(), "customize");
    stage.customize(ctx)?;
    debug!(stage = stage.name(), "run");
    stage.run(ctx)?;
    let outputs = stage.publish();
    if !outputs.is_empty() {
        let sources = ctx.sources_mut()?;
        for (key, obj) in outputs {
            sources.update(&key, obj, Some(stage.name()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ProcessState::Running.to_string(), "Running");
    }

    #[test]
    fn test_default_services_registered_in_order() {
        let process = Process::new("test", "unused");
        let names: Vec<_> = process.context().services().names().collect();
        assert_eq!(names, vec![LOGGER, FILE_MANAGER, SOURCE_MANAGER]);
        assert_eq!(process.state(), ProcessState::Created);
    }

    #[test]
    fn test_run_seq_before_begin_is_invalid() {
        let mut process = Process::new("test", "unused");
        let err = process.run_seq().unwrap_err();
        assert!(matches!(err, Error::InvalidState { ref found, .. } if found == "Created"));
    }

    #[test]
    fn test_end_twice_is_invalid() {
        let mut process = Process::new("test", "unused");
        process.end_seq().unwrap();
        assert_eq!(process.state(), ProcessState::Ended);
        assert!(process.end_seq().is_err());
        assert!(process.begin_seq().is_err());
    }

    #[test]
    fn test_context_rng_is_seeded() {
        use rand::Rng;
        let cfg = ProcessConfig { seed: 7, ..ProcessConfig::default() };
        let mut a = ProcessContext::new(ProcessEnv::with_config("a", ".", cfg.clone()));
        let mut b = ProcessContext::new(ProcessEnv::with_config("b", ".", cfg));
        assert_eq!(a.rng().gen::<u64>(), b.rng().gen::<u64>());
    }
}
