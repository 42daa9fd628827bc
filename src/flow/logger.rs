//! Logger service
//!
//! Installs a `tracing` subscriber for the lifetime of the process. Being
//! registered first, it is torn down last and captures every other
//! service's teardown messages.

use std::any::Any;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::subscriber::DefaultGuard;
use tracing_subscriber::EnvFilter;

use super::{ProcessEnv, Service};
use crate::Result;

/// Default log file name, created inside the work directory.
pub const DEFAULT_LOG_FILE: &str = "runtime.log";

/// Verbosity levels for the message logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerbosityLevel {
    /// Everything, including lifecycle tracing
    Debug,
    /// Informational messages (default)
    #[default]
    Info,
    /// Warnings and errors
    Warning,
    /// Errors only
    Error,
    /// Nothing
    Silent,
}

impl VerbosityLevel {
    /// `EnvFilter` directive for this level.
    #[must_use]
    pub const fn directive(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error => "error",
            Self::Silent => "off",
        }
    }
}

/// Message logger service.
///
/// `RUST_LOG`, when set, overrides the configured verbosity.
#[derive(Default)]
pub struct Logger {
    log_file: Option<PathBuf>,
    verbosity: VerbosityLevel,
    guard: Option<DefaultGuard>,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("log_file", &self.log_file)
            .field("verbosity", &self.verbosity)
            .field("active", &self.guard.is_some())
            .finish()
    }
}

impl Logger {
    /// Log to stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::default()
    }

    /// Log to a file; relative paths resolve against the work directory.
    #[must_use]
    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        Self {
            log_file: Some(path.into()),
            ..Self::default()
        }
    }

    /// Set the verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: VerbosityLevel) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Configured verbosity level.
    #[must_use]
    pub const fn verbosity(&self) -> VerbosityLevel {
        self.verbosity
    }

    /// Change the verbosity; takes effect at the next `begin_seq`.
    pub fn set_verbosity(&mut self, verbosity: VerbosityLevel) {
        self.verbosity = verbosity;
    }

    /// Whether a subscriber is currently installed.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.guard.is_some()
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.verbosity.directive()))
    }
}

impl Service for Logger {
    fn begin_seq(&mut self, env: &ProcessEnv) -> Result<()> {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(self.filter())
            .with_target(false);
        let guard = match &self.log_file {
            Some(path) => {
                let file = File::create(env.work_dir().join(path))?;
                tracing::subscriber::set_default(builder.with_ansi(false).with_writer(Mutex::new(file)).finish())
            }
            None => tracing::subscriber::set_default(builder.finish()),
        };
        self.guard = Some(guard);
        Ok(())
    }

    fn end_seq(&mut self) -> Result<()> {
        self.guard = None;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_directives() {
        assert_eq!(VerbosityLevel::default(), VerbosityLevel::Info);
        assert_eq!(VerbosityLevel::Warning.directive(), "warn");
        assert_eq!(VerbosityLevel::Silent.directive(), "off");
    }

    #[test]
    fn test_logger_writes_file_in_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let env = ProcessEnv::new("test", dir.path());
        let mut logger = Logger::to_file(DEFAULT_LOG_FILE).with_verbosity(VerbosityLevel::Debug);

        logger.begin_seq(&env).unwrap();
        assert!(logger.is_active());
        tracing::info!("hello from the logger test");
        logger.end_seq().unwrap();
        assert!(!logger.is_active());

        let text = std::fs::read_to_string(dir.path().join(DEFAULT_LOG_FILE)).unwrap();
        assert!(text.contains("hello from the logger test"));
    }
}
