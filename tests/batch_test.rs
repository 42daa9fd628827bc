//! Tests for batch task rendering and job execution

use std::sync::Mutex;

use fitflow::batch::{job_dir_name, BatchTask, SubmitArgs, DEFAULT_N_JOBS};
use fitflow::flow::{Process, ProcessState};

static CWD_LOCK: Mutex<()> = Mutex::new(());

#[test]
fn test_submit_script_contents() {
    let dir = tempfile::tempdir().unwrap();
    let task = BatchTask::new("toyValidation", dir.path())
        .unwrap()
        .with_n_jobs(20)
        .with_queue("workday")
        .with_executable("/opt/fitflow/bin/fitflow");

    let script = task.submit_script("--bin-key bin2 run");
    assert!(script.contains("+JobFlavour = \"workday\""));
    assert!(script.contains("executable           = /opt/fitflow/bin/fitflow"));
    assert!(script.contains(&format!("initialdir           = {}", task.task_dir().display())));
    assert!(script.contains("arguments = --bin-key bin2 run $(Process)"));
    assert!(script.trim_end().ends_with("queue 20"));
}

#[test]
fn test_submit_script_layout() {
    let dir = tempfile::tempdir().unwrap();
    let task = BatchTask::new("toyValidation", dir.path()).unwrap().with_n_jobs(2);

    let script = task.submit_script("run");
    let lines: Vec<&str> = script.lines().collect();
    assert_eq!(lines.len(), 10);
    assert_eq!(lines[0], "getenv      = True");
    assert_eq!(lines[3], "error       = condor.err");
    assert_eq!(lines[5], "");
    assert_eq!(lines[8], "arguments = run $(Process)");
    assert_eq!(lines[9], "queue 2");
    assert!(script.ends_with('\n'));
}

#[test]
fn test_task_defaults_and_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let mut task = BatchTask::new("toyValidation", dir.path().join("batchTask")).unwrap();
    assert!(task.task_dir().is_absolute());
    assert!(task.task_dir().is_dir());
    assert_eq!(task.n_jobs(), DEFAULT_N_JOBS);

    task.apply(&SubmitArgs {
        queue: None,
        n_jobs: Some(3),
        do_submit: false,
    });
    assert_eq!(task.n_jobs(), 3);
    assert!(task.submit_script("run").contains("queue 3"));
}

#[test]
fn test_run_job_uses_job_directory() {
    let _guard = CWD_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let dir = tempfile::tempdir().unwrap();
    let task = BatchTask::new("toyValidation", dir.path()).unwrap();

    let mut process = Process::new("toyValidation", "unused");
    task.run_job(3, &mut process).unwrap();

    let job_dir = task.job_dir(3);
    assert!(job_dir.ends_with(job_dir_name(3)));
    assert!(job_dir.ends_with("job0003"));
    assert!(job_dir.is_dir());
    assert_eq!(process.context().work_dir(), job_dir.canonicalize().unwrap());
    assert_eq!(process.state(), ProcessState::Ended);
}

#[test]
fn test_run_job_rejects_started_process() {
    let _guard = CWD_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let dir = tempfile::tempdir().unwrap();
    let task = BatchTask::new("toyValidation", dir.path()).unwrap();

    let mut process = Process::new("toyValidation", dir.path());
    process.run().unwrap();
    assert!(task.run_job(0, &mut process).is_err());
}
