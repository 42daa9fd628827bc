//! Batch tasks on HTCondor
//!
//! Submission and processing are separate steps: `submit` runs on the host
//! and renders (or hands to `condor_submit`) a submit description whose
//! jobs call back into `run <jobId>` on the computing nodes. Each job runs
//! one private pipeline in `task_dir/jobNNNN`, so no two jobs share a store
//! file.

use std::path::{Path, PathBuf};
use std::process::Command;

use clap::Args;
use tracing::{info, warn};

use crate::flow::Process;
use crate::{Error, Result};

/// Default number of jobs per task.
pub const DEFAULT_N_JOBS: u32 = 500;

/// Default HTCondor job flavour.
pub const DEFAULT_QUEUE: &str = "longlunch";

/// Work directory name of a job.
#[must_use]
pub fn job_dir_name(job_id: u32) -> String {
    format!("job{job_id:04}")
}

/// One batch task: where its jobs live and how many there are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchTask {
    name: String,
    task_dir: PathBuf,
    n_jobs: u32,
    queue: String,
    executable: PathBuf,
}

impl BatchTask {
    /// Task with default job count and queue, run by the current executable.
    ///
    /// # Errors
    ///
    /// Returns IO errors when the task directory cannot be created or the
    /// current executable cannot be resolved.
    pub fn new(name: impl Into<String>, task_dir: impl Into<PathBuf>) -> Result<Self> {
        let task_dir = task_dir.into();
        std::fs::create_dir_all(&task_dir)?;
        Ok(Self {
            name: name.into(),
            task_dir: task_dir.canonicalize()?,
            n_jobs: DEFAULT_N_JOBS,
            queue: DEFAULT_QUEUE.to_string(),
            executable: std::env::current_exe()?,
        })
    }

    /// Set the number of jobs.
    #[must_use]
    pub const fn with_n_jobs(mut self, n_jobs: u32) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    /// Set the job flavour.
    #[must_use]
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    /// Set the executable the jobs run.
    #[must_use]
    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = executable.into();
        self
    }

    /// Task name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute task directory.
    #[must_use]
    pub fn task_dir(&self) -> &Path {
        &self.task_dir
    }

    /// Number of jobs.
    #[must_use]
    pub const fn n_jobs(&self) -> u32 {
        self.n_jobs
    }

    /// Job flavour.
    #[must_use]
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Work directory of a job.
    #[must_use]
    pub fn job_dir(&self, job_id: u32) -> PathBuf {
        self.task_dir.join(job_dir_name(job_id))
    }

    /// Apply `submit` overrides.
    pub fn apply(&mut self, args: &SubmitArgs) {
        if let Some(queue) = &args.queue {
            self.queue.clone_from(queue);
        }
        if let Some(n_jobs) = args.n_jobs {
            self.n_jobs = n_jobs;
        }
    }

    /// HTCondor submit description; each job is called with `arguments`
    /// followed by its job id.
    #[must_use]
    pub fn submit_script(&self, arguments: &str) -> String {
        format!(
            "getenv      = True\n\
             log         = condor.log\n\
             output      = condor.out\n\
             error       = condor.err\n\
             +JobFlavour = \"{queue}\"\n\
             \n\
             initialdir           = {task_dir}\n\
             executable           = {executable}\n\
             arguments = {arguments} $(Process)\n\
             queue {n_jobs}\n",
            queue = self.queue,
            task_dir = self.task_dir.display(),
            executable = self.executable.display(),
            n_jobs = self.n_jobs,
        )
    }

    /// Print the submit description, or write it to the task directory and
    /// pass it to `condor_submit`.
    ///
    /// # Errors
    ///
    /// Returns IO errors, or [`Error::Other`] when `condor_submit` fails.
    pub fn submit(&self, arguments: &str, do_submit: bool) -> Result<()> {
        let script = self.submit_script(arguments);
        if !do_submit {
            print!("{script}");
            return Ok(());
        }
        let path = self.task_dir.join(format!("{}.jdl", self.name));
        std::fs::write(&path, &script)?;
        info!(task = %self.name, path = %path.display(), jobs = self.n_jobs, "submitting");
        let status = Command::new("condor_submit").arg(&path).status()?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::Other(format!("condor_submit exited with {status}")))
        }
    }

    /// Run `process` as job `job_id`: point it at the job directory, then
    /// begin, run and end it. Teardown happens even when a stage fails.
    ///
    /// # Errors
    ///
    /// Returns the first lifecycle error.
    pub fn run_job(&self, job_id: u32, process: &mut Process) -> Result<()> {
        if job_id >= self.n_jobs {
            warn!(job_id, n_jobs = self.n_jobs, "job id beyond the submitted range");
        }
        process.set_work_dir(self.job_dir(job_id))?;
        info!(task = %self.name, job_id, "running job");
        process.run()
    }
}

/// `submit` subcommand flags.
#[derive(Args, Debug, Clone, Default)]
pub struct SubmitArgs {
    /// HTCondor job flavour
    #[arg(short, long)]
    pub queue: Option<String>,

    /// Number of jobs
    #[arg(short = 'n', long = "n-jobs")]
    pub n_jobs: Option<u32>,

    /// Submit the jobs; by default only print the submit script
    #[arg(short = 's', long = "submit")]
    pub do_submit: bool,
}

/// `run` subcommand arguments.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Job id; selects the work directory `jobNNNN`
    pub job_id: u32,
}
