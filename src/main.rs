//! fitflow CLI
//!
//! Store utilities (`show`, `merge`, `seed`) and the batch toy-validation
//! task (`submit`, `run`).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::error;
use tracing_subscriber::EnvFilter;

use fitflow::batch::{BatchTask, RunArgs, SubmitArgs};
use fitflow::config::{ProcessConfig, StageConfig};
use fitflow::fitter::{
    model_artifact, Fitter, GaussianModel, ObjProvider, RandomSubset, SubDataEntries, ToyStudier, WholeSet,
};
use fitflow::flow::{artifact, DbPlayer, Process, DB_PLAYER};
use fitflow::kv::{merge, FileStore, MergeMode, OpenMode};

/// fitflow CLI
#[derive(Parser, Debug)]
#[command(name = "fitflow")]
#[command(about = "Staged fitting pipelines with a persistent fit-result store")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Select the q2 bin by key
    #[arg(long, default_value = "summary", global = true)]
    bin_key: String,

    /// Process configuration (JSON)
    #[arg(long, global = true, env = "FITFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Batch task directory
    #[arg(long, default_value = "batchTask", global = true)]
    task_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the records of a store file
    Show {
        /// Store file
        db: PathBuf,

        /// Output the whole store as one JSON object
        #[arg(long)]
        json: bool,
    },

    /// Merge store files into one
    Merge {
        /// Output store
        output: PathBuf,

        /// Input stores, in priority order
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Duplicate handling: overwrite, print or skip
        #[arg(long, default_value = "overwrite")]
        mode: MergeMode,
    },

    /// Copy a baseline store
    Seed {
        /// Source store
        src: PathBuf,

        /// Destination store
        dst: PathBuf,

        /// Replace an existing destination
        #[arg(short, long)]
        force: bool,
    },

    /// Render or submit the toy-validation task
    Submit(SubmitArgs),

    /// Run one toy-validation job
    Run {
        #[command(flatten)]
        job: RunArgs,

        /// Source dataset: JSON array of numbers
        #[arg(long)]
        data: PathBuf,

        /// Directory holding the nominal fit-result store
        #[arg(long)]
        input_dir: Option<PathBuf>,

        /// Number of toy sets
        #[arg(long, default_value_t = 1)]
        toys: u64,

        /// Events per toy set; the whole dataset when absent
        #[arg(long)]
        entries: Option<usize>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    match &cli.command {
        Commands::Show { db, json } => cmd_show(db, *json),
        Commands::Merge { output, inputs, mode } => cmd_merge(output, inputs, *mode),
        Commands::Seed { src, dst, force } => cmd_seed(src, dst, *force),
        Commands::Submit(args) => cmd_submit(&cli, args),
        Commands::Run {
            job,
            data,
            input_dir,
            toys,
            entries,
        } => cmd_run(&cli, job, data, input_dir.as_deref(), *toys, *entries),
    }
}

fn cmd_show(db: &Path, as_json: bool) -> Result<()> {
    let store = FileStore::open(db, OpenMode::Read).with_context(|| format!("opening {}", db.display()))?;
    if as_json {
        let all: serde_json::Map<String, serde_json::Value> = store
            .iter()
            .map(|(k, r)| Ok((k.to_string(), serde_json::to_value(r)?)))
            .collect::<Result<_>>()?;
        println!("{}", serde_json::to_string_pretty(&all)?);
    } else {
        for (key, record) in store.iter() {
            println!("{key}: {}", serde_json::to_string(record)?);
        }
    }
    Ok(())
}

fn cmd_merge(output: &Path, inputs: &[PathBuf], mode: MergeMode) -> Result<()> {
    if !merge(inputs, mode, output)? {
        anyhow::bail!("merge skipped: not every input store exists");
    }
    println!("merged {} stores into {}", inputs.len(), output.display());
    Ok(())
}

fn cmd_seed(src: &Path, dst: &Path, force: bool) -> Result<()> {
    if FileStore::copy(src, dst, force)? {
        println!("seeded {} from {}", dst.display(), src.display());
    } else {
        println!("{} already exists, use --force to replace it", dst.display());
    }
    Ok(())
}

fn task(cli: &Cli) -> Result<BatchTask> {
    BatchTask::new("toyValidation", &cli.task_dir)
        .with_context(|| format!("preparing task directory {}", cli.task_dir.display()))
}

fn cmd_submit(cli: &Cli, args: &SubmitArgs) -> Result<()> {
    let mut task = task(cli)?;
    task.apply(args);
    let arguments = format!("--bin-key {} --task-dir {} run", cli.bin_key, task.task_dir().display());
    task.submit(&arguments, args.do_submit)?;
    Ok(())
}

fn cmd_run(
    cli: &Cli,
    job: &RunArgs,
    data: &Path,
    input_dir: Option<&Path>,
    toys: u64,
    entries: Option<usize>,
) -> Result<()> {
    let task = task(cli)?;
    let mut process = toy_process(cli, job.job_id, data, input_dir, toys, entries)?;
    if let Err(e) = task.run_job(job.job_id, &mut process) {
        let stage = process.record().failed_stage().unwrap_or("<none>").to_string();
        error!(job_id = job.job_id, stage = %stage, error = %e, "job failed");
        return Err(anyhow::Error::new(e).context(format!("job {} failed in stage {stage}", job.job_id)));
    }
    Ok(())
}

fn toy_process(
    cli: &Cli,
    job_id: u32,
    data: &Path,
    input_dir: Option<&Path>,
    toys: u64,
    entries: Option<usize>,
) -> Result<Process> {
    let mut cfg = match &cli.config {
        Some(path) => ProcessConfig::from_json_file(path).with_context(|| format!("reading {}", path.display()))?,
        None => ProcessConfig::new(),
    };
    cfg.bin_key.clone_from(&cli.bin_key);
    cfg.is_batch_job = true;
    cfg.seed = cfg.seed.wrapping_add(u64::from(job_id));

    let mut process = Process::with_config("toyValidation", ".", cfg);
    let player = match input_dir {
        Some(dir) => DbPlayer::with_input_dir(dir.canonicalize()?),
        None => DbPlayer::new(),
    };
    process.add_service(DB_PLAYER, Box::new(player));

    let data_path = data.canonicalize().with_context(|| format!("locating {}", data.display()))?;
    let provider = ObjProvider::new("objProvider")
        .with_builder("f", |_| Ok(Some(model_artifact(GaussianModel::new("f")))))
        .with_builder("dataReader.Fit", move |_| {
            let text = std::fs::read_to_string(&data_path)?;
            let events: Vec<f64> = serde_json::from_str(&text)?;
            Ok(Some(artifact(events)))
        });

    let fitter = Fitter::from_overrides(json!({"name": "toyFitter", "data": "dataReader.Fit"}))?;
    let studier_cfg = StageConfig::from_template(
        ToyStudier::template_config(),
        json!({"name": "toyStudier", "data": "dataReader.Fit", "nSetOfToys": toys}),
    )?;
    let studier = match entries {
        Some(n) => ToyStudier::new(studier_cfg, fitter)
            .with_entries(SubDataEntries::Fixed(n))
            .with_sampler(RandomSubset::<f64>::new()),
        None => ToyStudier::new(studier_cfg, fitter).with_sampler(WholeSet),
    };

    process.add_stage(provider);
    process.add_stage(studier);
    Ok(process)
}
