//! Asynchronous synthesis job supervision.
//!
//! Synthesis runs take minutes inside a container; the supervisor owns their
//! lifecycle so the agent loop never blocks on one. Jobs are keyed by run id
//! (`synth_NNNN` within a session workspace), hold a bounded log tail, track
//! the current flow stage from stdout, and report `stuck` when a running job
//! stops making progress. At most one non-terminal job may exist per session
//! unless the caller explicitly restarts a stuck one.

pub mod metrics;

pub use metrics::{extract_run_metrics, infer_stage, parse_metrics_text, PpaMetrics};

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::CoreConfig;
use crate::error::{CoreError, Result};
use crate::process::terminate_process_tree;
use crate::spec::DesignSpec;
use crate::workspace::{ArtifactKind, Workspace};

const RUNS_DIRNAME: &str = "synth_runs";
const LOG_TAIL_CAP: usize = 200;
const STATUS_TAIL_LINES: usize = 40;
const POLL_BACKOFF_START_SECS: u64 = 30;
const POLL_BACKOFF_MAX_SECS: u64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Stuck,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Stuck => "stuck",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }
}

/// Parameters for one synthesis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthParams {
    pub top_module: String,
    pub verilog_files: Vec<String>,
    #[serde(default = "default_clock_period")]
    pub clock_period_ns: f64,
    #[serde(default = "default_utilization")]
    pub utilization: u32,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: f64,
    #[serde(default = "default_core_margin")]
    pub core_margin: f64,
    #[serde(default = "default_platform")]
    pub platform: String,
}

fn default_clock_period() -> f64 {
    10.0
}
fn default_utilization() -> u32 {
    5
}
fn default_aspect_ratio() -> f64 {
    1.0
}
fn default_core_margin() -> f64 {
    2.0
}
fn default_platform() -> String {
    "sky130hd".to_string()
}

/// Snapshot returned by `status` and `wait`.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub run_id: String,
    pub session_id: String,
    pub state: JobState,
    pub stage: Option<String>,
    pub last_progress_age_secs: u64,
    pub log_tail: Vec<String>,
    pub exit_code: Option<i32>,
    /// Recommended delay before the next poll; 0 once terminal.
    pub poll_after_secs: u64,
}

struct JobInner {
    run_id: String,
    session_id: String,
    run_dir: PathBuf,
    image: String,
    state: RwLock<JobState>,
    stage: RwLock<Option<String>>,
    last_progress: RwLock<Instant>,
    log_tail: Mutex<VecDeque<String>>,
    exit_code: RwLock<Option<i32>>,
    poll_count: Mutex<u32>,
    cancel: CancellationToken,
    done: Notify,
}

impl JobInner {
    async fn push_log(&self, line: String, stage_names: &[String]) {
        if let Some(stage) = infer_stage(&line, stage_names) {
            *self.stage.write().await = Some(stage.to_string());
        }
        *self.last_progress.write().await = Instant::now();
        let mut tail = self.log_tail.lock().await;
        tail.push_back(line);
        while tail.len() > LOG_TAIL_CAP {
            tail.pop_front();
        }
    }

    async fn set_state(&self, state: JobState) {
        *self.state.write().await = state;
        if state.is_terminal() {
            self.done.notify_waiters();
        }
    }
}

pub struct JobSupervisor {
    config: Arc<CoreConfig>,
    jobs: RwLock<HashMap<String, Arc<JobInner>>>,
    /// session id → run id of the session's non-terminal job.
    slots: Arc<Mutex<HashMap<String, String>>>,
}

impl JobSupervisor {
    pub fn new(config: Arc<CoreConfig>) -> Self {
        Self {
            config,
            jobs: RwLock::new(HashMap::new()),
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start a synthesis job. Fails with `JobConflict` when the session
    /// already has a non-terminal job, unless `restart_stuck` is set and
    /// that job is stuck, in which case the old worker is cancelled first.
    pub async fn start(
        &self,
        workspace: &Workspace,
        params: SynthParams,
        restart_stuck: bool,
    ) -> Result<String> {
        let session_id = workspace.session_id().to_string();

        // Session slot check under the lock so concurrent starts serialize.
        {
            let mut slots = self.slots.lock().await;
            if let Some(existing_run) = slots.get(&session_id).cloned() {
                let existing = self.jobs.read().await.get(&existing_run).cloned();
                match existing {
                    Some(job) => {
                        let state = self.effective_state(&job).await;
                        if state.is_terminal() {
                            slots.remove(&session_id);
                        } else if state == JobState::Stuck && restart_stuck {
                            tracing::warn!(run_id = %existing_run, "restarting stuck synthesis job");
                            job.cancel.cancel();
                            job.set_state(JobState::Cancelled).await;
                            slots.remove(&session_id);
                        } else {
                            return Err(CoreError::JobConflict(format!(
                                "session '{}' already has job '{}' in state {}",
                                session_id,
                                existing_run,
                                state.as_str()
                            )));
                        }
                    }
                    None => {
                        slots.remove(&session_id);
                    }
                }
            }

            // Reserve before any filesystem work, released on failure below.
            slots.insert(session_id.clone(), String::new());
        }

        match self.launch(workspace, params).await {
            Ok(run_id) => {
                self.slots
                    .lock()
                    .await
                    .insert(session_id.clone(), run_id.clone());
                Ok(run_id)
            }
            Err(e) => {
                self.slots.lock().await.remove(&session_id);
                Err(e)
            }
        }
    }

    async fn launch(&self, workspace: &Workspace, params: SynthParams) -> Result<String> {
        if params.verilog_files.is_empty() {
            return Err(CoreError::BadArgs("no verilog files given".into()));
        }
        for file in &params.verilog_files {
            // Existence check up front; the worker only sees staged copies.
            workspace.read_file(file).await?;
        }

        let mut run_id = next_run_id(workspace).await?;
        // Jobs whose directories were never created (spawn failures, tests)
        // still occupy the id space in memory.
        {
            let jobs = self.jobs.read().await;
            while jobs.contains_key(&run_id) {
                let n: u32 = run_id
                    .strip_prefix("synth_")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0);
                run_id = format!("synth_{:04}", n + 1);
            }
        }
        let run_rel = format!("{}/{}", RUNS_DIRNAME, run_id);
        let inputs_rel = format!("{}/inputs", run_rel);

        for file in &params.verilog_files {
            let content = workspace.read_file(file).await?;
            let name = file.rsplit('/').next().unwrap_or(file);
            workspace
                .write_file(
                    &format!("{}/{}", inputs_rel, name),
                    &content,
                    crate::workspace::WriteMode::CreateOrReplace,
                )
                .await?;
        }

        let sdc = self.constraints_for(workspace, &params).await?;
        workspace
            .write_file(
                &format!("{}/constraints.sdc", run_rel),
                sdc.as_bytes(),
                crate::workspace::WriteMode::CreateOrReplace,
            )
            .await?;

        let config_mk = render_config_mk(&params);
        workspace
            .write_file(
                &format!("{}/config.mk", run_rel),
                config_mk.as_bytes(),
                crate::workspace::WriteMode::CreateOrReplace,
            )
            .await?;
        for sub in ["logs", "reports", "results"] {
            workspace
                .write_file(
                    &format!("{}/{}/.keep", run_rel, sub),
                    b"",
                    crate::workspace::WriteMode::CreateOrReplace,
                )
                .await?;
        }

        let run_dir = workspace.root().join(RUNS_DIRNAME).join(&run_id);
        let job = Arc::new(JobInner {
            run_id: run_id.clone(),
            session_id: workspace.session_id().to_string(),
            run_dir: run_dir.clone(),
            image: self.config.synthesis_image.clone(),
            state: RwLock::new(JobState::Queued),
            stage: RwLock::new(None),
            last_progress: RwLock::new(Instant::now()),
            log_tail: Mutex::new(VecDeque::new()),
            exit_code: RwLock::new(None),
            poll_count: Mutex::new(0),
            cancel: CancellationToken::new(),
            done: Notify::new(),
        });

        self.jobs
            .write()
            .await
            .insert(run_id.clone(), job.clone());

        let supervisor_config = self.config.clone();
        let worker_job = job.clone();
        let slots = self.slots.clone();
        let slot_session = job.session_id.clone();
        let slot_run = run_id.clone();
        tokio::spawn(async move {
            run_worker(worker_job, supervisor_config).await;
            let mut slots = slots.lock().await;
            if slots.get(&slot_session) == Some(&slot_run) {
                slots.remove(&slot_session);
            }
        });

        tracing::info!(run_id = %run_id, "synthesis job started");
        Ok(run_id)
    }

    /// Constraints pre-check: SDC from the session's latest spec when it
    /// matches the top module. A spec naming a different module fails the
    /// start outright — synthesizing against the wrong constraints wastes a
    /// half-hour run. The fallback clock applies only when no parseable spec
    /// exists.
    async fn constraints_for(&self, workspace: &Workspace, params: &SynthParams) -> Result<String> {
        if let Some(entry) = workspace.latest_of_kind(ArtifactKind::Spec).await? {
            if let Ok(yaml) = workspace.read_to_string(&entry.path).await {
                if let Ok(spec) = DesignSpec::parse_yaml(&yaml) {
                    if spec.module_name != params.top_module {
                        return Err(CoreError::BadArgs(format!(
                            "spec module '{}' does not match top module '{}'; fix the spec or the top_module parameter",
                            spec.module_name, params.top_module
                        )));
                    }
                    spec.validate()?;
                    return Ok(spec.generate_sdc());
                }
            }
        }
        if params.clock_period_ns <= 0.0 {
            return Err(CoreError::BadArgs(
                "no usable spec and no positive clock period".into(),
            ));
        }
        Ok(format!(
            "create_clock -period {} [get_ports clk]\n",
            params.clock_period_ns
        ))
    }

    async fn get(&self, run_id: &str) -> Result<Arc<JobInner>> {
        self.jobs
            .read()
            .await
            .get(run_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("synthesis run '{}'", run_id)))
    }

    /// Running jobs past the stuck threshold report `Stuck`.
    async fn effective_state(&self, job: &JobInner) -> JobState {
        let state = *job.state.read().await;
        if state == JobState::Running {
            let age = job.last_progress.read().await.elapsed();
            if age > self.config.stuck_threshold {
                return JobState::Stuck;
            }
        }
        state
    }

    pub async fn status(&self, run_id: &str) -> Result<JobStatus> {
        let job = self.get(run_id).await?;
        let state = self.effective_state(&job).await;

        let poll_after_secs = if state.is_terminal() {
            *job.poll_count.lock().await = 0;
            0
        } else {
            let mut count = job.poll_count.lock().await;
            *count += 1;
            (POLL_BACKOFF_START_SECS << (count.saturating_sub(1)).min(10))
                .min(POLL_BACKOFF_MAX_SECS)
        };

        let tail: Vec<String> = {
            let tail = job.log_tail.lock().await;
            tail.iter()
                .rev()
                .take(STATUS_TAIL_LINES)
                .rev()
                .cloned()
                .collect()
        };

        let status = JobStatus {
            run_id: job.run_id.clone(),
            session_id: job.session_id.clone(),
            state,
            stage: job.stage.read().await.clone(),
            last_progress_age_secs: job.last_progress.read().await.elapsed().as_secs(),
            log_tail: tail,
            exit_code: *job.exit_code.read().await,
            poll_after_secs,
        };
        Ok(status)
    }

    /// Block up to `up_to` for a terminal state; returns the current status
    /// either way.
    pub async fn wait(&self, run_id: &str, up_to: Duration) -> Result<JobStatus> {
        let job = self.get(run_id).await?;
        let deadline = Instant::now() + up_to;
        loop {
            if job.state.read().await.is_terminal() {
                break;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let notified = job.done.notified();
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(remaining) => break,
            }
        }
        self.status(run_id).await
    }

    pub async fn cancel(&self, run_id: &str) -> Result<()> {
        let job = self.get(run_id).await?;
        if job.state.read().await.is_terminal() {
            return Ok(());
        }
        tracing::info!(run_id, "cancelling synthesis job");
        job.cancel.cancel();
        Ok(())
    }

    /// PPA metrics; only meaningful once the job succeeded.
    pub async fn metrics(&self, run_id: &str) -> Result<PpaMetrics> {
        let job = self.get(run_id).await?;
        let state = self.effective_state(&job).await;
        match state {
            JobState::Succeeded => Ok(extract_run_metrics(&job.run_dir)),
            JobState::Failed => Err(CoreError::JobFailed {
                exit_code: *job.exit_code.read().await,
            }),
            other => Err(CoreError::JobConflict(format!(
                "run '{}' is {}, metrics require a succeeded run",
                run_id,
                other.as_str()
            ))),
        }
    }

    /// Case-insensitive substring search across the run's logs, reports and
    /// generated files. Capped at 50 matches.
    pub async fn search_logs(&self, run_id: &str, pattern: &str) -> Result<Vec<String>> {
        let job = self.get(run_id).await?;
        let needle = pattern.to_ascii_lowercase();
        let mut matches = Vec::new();

        let mut stack = vec![job.run_dir.clone()];
        while let Some(dir) = stack.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                let ext = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or_default();
                if !matches!(ext, "log" | "rpt" | "txt" | "v" | "json" | "mk" | "sdc") {
                    continue;
                }
                let Ok(text) = std::fs::read_to_string(&path) else {
                    continue;
                };
                let rel = path
                    .strip_prefix(&job.run_dir)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .replace('\\', "/");
                for (line_no, line) in text.lines().enumerate() {
                    if line.to_ascii_lowercase().contains(&needle) {
                        matches.push(format!("File: {} | Line {}: {}", rel, line_no + 1, line.trim()));
                        if matches.len() >= 50 {
                            return Ok(matches);
                        }
                    }
                }
            }
        }
        Ok(matches)
    }

    /// Run directory for a known run id.
    pub async fn run_dir(&self, run_id: &str) -> Result<PathBuf> {
        Ok(self.get(run_id).await?.run_dir.clone())
    }

    #[cfg(test)]
    pub(crate) async fn test_insert_job(
        &self,
        run_id: &str,
        session_id: &str,
        run_dir: PathBuf,
        state: JobState,
    ) -> CancellationToken {
        let job = Arc::new(JobInner {
            run_id: run_id.to_string(),
            session_id: session_id.to_string(),
            run_dir,
            image: String::new(),
            state: RwLock::new(state),
            stage: RwLock::new(None),
            last_progress: RwLock::new(Instant::now()),
            log_tail: Mutex::new(VecDeque::new()),
            exit_code: RwLock::new(None),
            poll_count: Mutex::new(0),
            cancel: CancellationToken::new(),
            done: Notify::new(),
        });
        let cancel = job.cancel.clone();
        self.jobs
            .write()
            .await
            .insert(run_id.to_string(), job.clone());
        if !state.is_terminal() {
            self.slots
                .lock()
                .await
                .insert(session_id.to_string(), run_id.to_string());
        }
        cancel
    }

    #[cfg(test)]
    pub(crate) async fn test_rewind_progress(&self, run_id: &str, by: Duration) {
        if let Ok(job) = self.get(run_id).await {
            *job.last_progress.write().await = Instant::now() - by;
        }
    }

    #[cfg(test)]
    pub(crate) async fn test_set_state(&self, run_id: &str, state: JobState) {
        if let Ok(job) = self.get(run_id).await {
            job.set_state(state).await;
            if state.is_terminal() {
                self.slots.lock().await.remove(&job.session_id);
            }
        }
    }
}

fn render_config_mk(params: &SynthParams) -> String {
    let files: Vec<String> = params
        .verilog_files
        .iter()
        .map(|f| {
            let name = f.rsplit('/').next().unwrap_or(f);
            format!("/workspace/inputs/{}", name)
        })
        .collect();
    format!(
        "export DESIGN_NAME = {}\n\
         export PLATFORM = {}\n\
         export VERILOG_FILES = {}\n\
         export SDC_FILE = /workspace/constraints.sdc\n\
         export CORE_UTILIZATION = {}\n\
         export CORE_ASPECT_RATIO = {}\n\
         export CORE_MARGIN = {}\n",
        params.top_module,
        params.platform,
        files.join(" "),
        params.utilization,
        params.aspect_ratio,
        params.core_margin,
    )
}

/// Allocate the next `synth_NNNN` id under the workspace runs directory.
async fn next_run_id(workspace: &Workspace) -> Result<String> {
    let runs_root = workspace.root().join(RUNS_DIRNAME);
    let mut max_id = 0u32;
    if runs_root.exists() {
        let mut read_dir = tokio::fs::read_dir(&runs_root).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(n) = name
                .strip_prefix("synth_")
                .and_then(|s| s.parse::<u32>().ok())
            {
                max_id = max_id.max(n);
            }
        }
    }
    Ok(format!("synth_{:04}", max_id + 1))
}

/// Worker: runs the container command, streams its output into the job's
/// tail (driving stage/progress tracking), and settles the terminal state.
async fn run_worker(job: Arc<JobInner>, config: Arc<CoreConfig>) {
    job.set_state(JobState::Running).await;

    let mut cmd = Command::new("docker");
    cmd.arg("run")
        .arg("--rm")
        .arg("-v")
        .arg(format!("{}:/workspace", job.run_dir.display()))
        .arg("-w")
        .arg("/OpenROAD-flow-scripts/flow")
        .arg(&job.image)
        .arg("bash")
        .arg("-c")
        .arg(&config.synthesis_command)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            job.push_log(format!("failed to start container: {}", e), &config.stage_names)
                .await;
            job.set_state(JobState::Failed).await;
            return;
        }
    };

    let pid = child.id();
    let log_path = job.run_dir.join("logs").join("flow.log");

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_job = job.clone();
    let stdout_stages = config.stage_names.clone();
    let stdout_log = log_path.clone();
    let stdout_task = tokio::spawn(async move {
        let Some(stdout) = stdout else { return };
        let mut sink = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&stdout_log)
            .await
            .ok();
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(sink) = sink.as_mut() {
                use tokio::io::AsyncWriteExt;
                let _ = sink.write_all(line.as_bytes()).await;
                let _ = sink.write_all(b"\n").await;
            }
            stdout_job.push_log(line, &stdout_stages).await;
        }
    });
    let stderr_job = job.clone();
    let stderr_stages = config.stage_names.clone();
    let stderr_task = tokio::spawn(async move {
        let Some(stderr) = stderr else { return };
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            stderr_job.push_log(line, &stderr_stages).await;
        }
    });

    let mut timed_out = false;
    let mut was_cancelled = false;
    let timeout_sleep = tokio::time::sleep(config.synthesis_timeout);
    tokio::pin!(timeout_sleep);

    // Handlers signal the container's process group and let the wait branch
    // observe the exit; `kill_on_drop` backstops the signal path.
    let outcome = loop {
        tokio::select! {
            biased;
            _ = job.cancel.cancelled(), if !was_cancelled && !timed_out => {
                was_cancelled = true;
                if let Some(pid) = pid {
                    terminate_process_tree(pid, true).await;
                }
            }
            _ = &mut timeout_sleep, if !timed_out && !was_cancelled => {
                timed_out = true;
                job.push_log("synthesis hard timeout reached".to_string(), &config.stage_names).await;
                if let Some(pid) = pid {
                    terminate_process_tree(pid, true).await;
                }
            }
            status = child.wait() => {
                break match status {
                    _ if was_cancelled => JobState::Cancelled,
                    _ if timed_out => JobState::Failed,
                    Ok(status) => {
                        *job.exit_code.write().await = status.code();
                        if status.success() {
                            JobState::Succeeded
                        } else {
                            JobState::Failed
                        }
                    }
                    Err(e) => {
                        job.push_log(format!("wait failed: {}", e), &config.stage_names).await;
                        JobState::Failed
                    }
                };
            }
        }
    };

    let _ = stdout_task.await;
    let _ = stderr_task.await;
    job.set_state(outcome).await;
    tracing::info!(
        run_id = %job.run_id,
        state = outcome.as_str(),
        "synthesis job finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn supervisor() -> (TempDir, JobSupervisor, Workspace) {
        let dir = TempDir::new().unwrap();
        let config = Arc::new(CoreConfig::default());
        let supervisor = JobSupervisor::new(config);
        let workspace = Workspace::new(dir.path(), "s1");
        (dir, supervisor, workspace)
    }

    #[tokio::test]
    async fn second_job_for_session_conflicts() {
        let (dir, supervisor, _ws) = supervisor();
        supervisor
            .test_insert_job("synth_0001", "s1", dir.path().join("run"), JobState::Running)
            .await;

        let workspace = Workspace::new(dir.path(), "s1");
        workspace.ensure_dir().await.unwrap();
        workspace
            .write_file("top.v", b"module top; endmodule", crate::workspace::WriteMode::CreateOrReplace)
            .await
            .unwrap();

        let err = supervisor
            .start(
                &workspace,
                SynthParams {
                    top_module: "top".into(),
                    verilog_files: vec!["top.v".into()],
                    clock_period_ns: 10.0,
                    utilization: 5,
                    aspect_ratio: 1.0,
                    core_margin: 2.0,
                    platform: "sky130hd".into(),
                },
                false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::JobConflict(_)));
    }

    #[tokio::test]
    async fn stuck_job_is_derived_from_progress_age() {
        let (dir, supervisor, _ws) = supervisor();
        supervisor
            .test_insert_job("synth_0001", "s1", dir.path().join("run"), JobState::Running)
            .await;
        supervisor
            .test_rewind_progress("synth_0001", Duration::from_secs(400))
            .await;

        let status = supervisor.status("synth_0001").await.unwrap();
        assert_eq!(status.state, JobState::Stuck);
        assert!(status.last_progress_age_secs >= 400);
    }

    #[tokio::test]
    async fn restart_stuck_cancels_prior_worker() {
        let (dir, supervisor, _ws) = supervisor();
        let cancel = supervisor
            .test_insert_job("synth_0001", "s1", dir.path().join("run"), JobState::Running)
            .await;
        supervisor
            .test_rewind_progress("synth_0001", Duration::from_secs(400))
            .await;

        let workspace = Workspace::new(dir.path(), "s1");
        workspace.ensure_dir().await.unwrap();
        workspace
            .write_file("top.v", b"module top; endmodule", crate::workspace::WriteMode::CreateOrReplace)
            .await
            .unwrap();

        // Without the override the start is refused.
        let params = SynthParams {
            top_module: "top".into(),
            verilog_files: vec!["top.v".into()],
            clock_period_ns: 10.0,
            utilization: 5,
            aspect_ratio: 1.0,
            core_margin: 2.0,
            platform: "sky130hd".into(),
        };
        assert!(supervisor
            .start(&workspace, params.clone(), false)
            .await
            .is_err());

        let run_id = supervisor.start(&workspace, params, true).await.unwrap();
        assert!(cancel.is_cancelled());
        assert_ne!(run_id, "synth_0001");
    }

    #[tokio::test]
    async fn mismatched_spec_module_fails_the_start() {
        let (dir, supervisor, _ws) = supervisor();
        let workspace = Workspace::new(dir.path(), "s1");
        workspace.ensure_dir().await.unwrap();
        workspace
            .write_file("top.v", b"module top; endmodule", crate::workspace::WriteMode::CreateOrReplace)
            .await
            .unwrap();
        // A spec for a different module is a failed pre-check, not a
        // silent fallback.
        workspace
            .write_file(
                "adder_spec.yaml",
                b"adder:\n  description: add\n  clock_period: 10ns\n  ports: []\n",
                crate::workspace::WriteMode::CreateOrReplace,
            )
            .await
            .unwrap();

        let err = supervisor
            .start(
                &workspace,
                SynthParams {
                    top_module: "top".into(),
                    verilog_files: vec!["top.v".into()],
                    clock_period_ns: 10.0,
                    utilization: 5,
                    aspect_ratio: 1.0,
                    core_margin: 2.0,
                    platform: "sky130hd".into(),
                },
                false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::BadArgs(_)));
        assert!(err.to_string().contains("does not match"));
        // The failed start released the session slot.
        let retry = supervisor
            .start(
                &workspace,
                SynthParams {
                    top_module: "adder".into(),
                    verilog_files: vec!["top.v".into()],
                    clock_period_ns: 10.0,
                    utilization: 5,
                    aspect_ratio: 1.0,
                    core_margin: 2.0,
                    platform: "sky130hd".into(),
                },
                false,
            )
            .await;
        assert!(retry.is_ok());
    }

    #[tokio::test]
    async fn wait_returns_on_terminal_state() {
        let (dir, supervisor, _ws) = supervisor();
        supervisor
            .test_insert_job("synth_0002", "s1", dir.path().join("run"), JobState::Running)
            .await;

        let waiter = {
            let status = supervisor.wait("synth_0002", Duration::from_millis(50)).await.unwrap();
            status.state
        };
        assert_eq!(waiter, JobState::Running);

        supervisor
            .test_set_state("synth_0002", JobState::Succeeded)
            .await;
        let status = supervisor
            .wait("synth_0002", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(status.state, JobState::Succeeded);
        assert_eq!(status.poll_after_secs, 0);
    }

    #[tokio::test]
    async fn poll_backoff_doubles_and_caps() {
        let (dir, supervisor, _ws) = supervisor();
        supervisor
            .test_insert_job("synth_0003", "s1", dir.path().join("run"), JobState::Running)
            .await;

        let first = supervisor.status("synth_0003").await.unwrap().poll_after_secs;
        let second = supervisor.status("synth_0003").await.unwrap().poll_after_secs;
        assert_eq!(first, POLL_BACKOFF_START_SECS);
        assert_eq!(second, POLL_BACKOFF_START_SECS * 2);

        for _ in 0..10 {
            supervisor.status("synth_0003").await.unwrap();
        }
        let capped = supervisor.status("synth_0003").await.unwrap().poll_after_secs;
        assert_eq!(capped, POLL_BACKOFF_MAX_SECS);
    }

    #[tokio::test]
    async fn metrics_require_success() {
        let (dir, supervisor, _ws) = supervisor();
        supervisor
            .test_insert_job("synth_0004", "s1", dir.path().join("run"), JobState::Running)
            .await;
        assert!(matches!(
            supervisor.metrics("synth_0004").await.unwrap_err(),
            CoreError::JobConflict(_)
        ));

        supervisor
            .test_set_state("synth_0004", JobState::Failed)
            .await;
        assert!(matches!(
            supervisor.metrics("synth_0004").await.unwrap_err(),
            CoreError::JobFailed { .. }
        ));
    }

    #[tokio::test]
    async fn unknown_run_is_not_found() {
        let (_dir, supervisor, _ws) = supervisor();
        assert!(matches!(
            supervisor.status("synth_9999").await.unwrap_err(),
            CoreError::NotFound(_)
        ));
    }
}
