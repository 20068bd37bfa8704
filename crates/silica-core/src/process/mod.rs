//! Subprocess runner for external EDA commands.
//!
//! Runs a command with a soft and a hard deadline, streams stdout/stderr into
//! bounded ring buffers, and kills the whole process group on hard timeout or
//! cancellation. A nonzero exit is a result, not an error; only a missing
//! executable, a hard timeout, or cancellation fail the call.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, Result};

/// Capture cap per stream.
pub const CAPTURE_MAX_BYTES: usize = 2 * 1024 * 1024;
const CAPTURE_MAX_LINES: usize = 16_000;
const SOFT_KILL_GRACE: Duration = Duration::from_millis(800);

/// What to run and under which limits.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    pub stdin: Option<String>,
    /// Polite-termination deadline. `None` disables the soft phase.
    pub soft_timeout: Option<Duration>,
    /// Force-kill deadline. Always enforced.
    pub hard_timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: Vec::new(),
            stdin: None,
            soft_timeout: None,
            hard_timeout: crate::config::DEFAULT_SUBPROCESS_TIMEOUT,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn hard_timeout(mut self, timeout: Duration) -> Self {
        self.hard_timeout = timeout;
        self
    }

    pub fn soft_timeout(mut self, timeout: Duration) -> Self {
        self.soft_timeout = Some(timeout);
        self
    }
}

/// Outcome of a completed (or force-killed) command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
    pub soft_timeout_fired: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Ring buffer over output lines bounded by both line count and byte size.
/// Oldest lines are evicted first; eviction leaves a marker in the rendered
/// text at the truncation point.
pub(crate) struct BoundedOutputBuffer {
    lines: VecDeque<String>,
    total_bytes: usize,
    dropped_lines: usize,
    max_lines: usize,
    max_bytes: usize,
}

impl BoundedOutputBuffer {
    pub(crate) fn new(max_lines: usize, max_bytes: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            total_bytes: 0,
            dropped_lines: 0,
            max_lines,
            max_bytes,
        }
    }

    pub(crate) fn push_line(&mut self, line: &str) {
        let mut kept = line.to_string();
        if kept.len() > self.max_bytes {
            kept = tail_by_bytes(&kept, self.max_bytes);
        }
        self.total_bytes = self.total_bytes.saturating_add(kept.len());
        self.lines.push_back(kept);

        while self.lines.len() > self.max_lines || self.total_bytes > self.max_bytes {
            match self.lines.pop_front() {
                Some(removed) => {
                    self.total_bytes = self.total_bytes.saturating_sub(removed.len());
                    self.dropped_lines = self.dropped_lines.saturating_add(1);
                }
                None => break,
            }
        }
    }

    pub(crate) fn into_text(self) -> String {
        let mut out = String::new();
        if self.dropped_lines > 0 {
            out.push_str(&format!(
                "[... output truncated: {} earlier line(s) dropped ...]\n",
                self.dropped_lines
            ));
        }
        out.push_str(&self.lines.into_iter().collect::<Vec<_>>().join("\n"));
        out
    }
}

/// Keep the tail of a string within `max_bytes`, preserving UTF-8 boundaries.
pub(crate) fn tail_by_bytes(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut start = text.len().saturating_sub(max_bytes);
    while start < text.len() && !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}

async fn collect_pipe<R>(pipe: Option<R>, buffer: Arc<Mutex<BoundedOutputBuffer>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let Some(pipe) = pipe else {
        return;
    };
    let mut reader = BufReader::new(pipe).lines();
    while let Ok(Some(line)) = reader.next_line().await {
        buffer.lock().await.push_line(&line);
    }
}

#[cfg(unix)]
pub(crate) async fn terminate_process_tree(pid: u32, force: bool) {
    let sig = if force { "-KILL" } else { "-TERM" };
    let pgid = format!("-{}", pid);

    let group_ok = std::process::Command::new("kill")
        .arg(sig)
        .arg(&pgid)
        .status()
        .map(|s| s.success())
        .unwrap_or(false);

    if !group_ok {
        let _ = std::process::Command::new("kill")
            .arg(sig)
            .arg(pid.to_string())
            .status();
    }
}

#[cfg(not(unix))]
pub(crate) async fn terminate_process_tree(_pid: u32, _force: bool) {}

/// Execute a command to completion under the spec's limits.
///
/// Failure modes: `ToolMissing` when the executable cannot be spawned,
/// `Timeout` on hard-deadline expiry, `Cancelled` when the token fires.
pub async fn run_command(spec: CommandSpec, cancel: &CancellationToken) -> Result<CommandOutput> {
    let start = Instant::now();

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(&spec.cwd)
        .env("NO_COLOR", "1")
        .stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    for (key, val) in &spec.env {
        cmd.env(key, val);
    }

    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CoreError::ToolMissing(spec.program.clone())
        } else {
            CoreError::Io(format!("failed to spawn '{}': {}", spec.program, e))
        }
    })?;

    if let Some(payload) = &spec.stdin {
        if let Some(mut stdin) = child.stdin.take() {
            let bytes = payload.clone().into_bytes();
            tokio::spawn(async move {
                let _ = stdin.write_all(&bytes).await;
                let _ = stdin.shutdown().await;
            });
        }
    }

    let pid = child.id();
    let stdout_buf = Arc::new(Mutex::new(BoundedOutputBuffer::new(
        CAPTURE_MAX_LINES,
        CAPTURE_MAX_BYTES,
    )));
    let stderr_buf = Arc::new(Mutex::new(BoundedOutputBuffer::new(
        CAPTURE_MAX_LINES,
        CAPTURE_MAX_BYTES,
    )));

    let stdout_task = tokio::spawn(collect_pipe(child.stdout.take(), stdout_buf.clone()));
    let stderr_task = tokio::spawn(collect_pipe(child.stderr.take(), stderr_buf.clone()));

    let mut soft_fired = false;
    let mut timed_out = false;
    let mut was_cancelled = false;
    let soft_deadline = spec.soft_timeout.unwrap_or(spec.hard_timeout);
    let soft_sleep = sleep(soft_deadline.min(spec.hard_timeout));
    let hard_sleep = sleep(spec.hard_timeout);
    tokio::pin!(soft_sleep);
    tokio::pin!(hard_sleep);

    // Handlers never touch `child` directly; they signal the process group
    // and let the wait branch observe the exit. `kill_on_drop` backstops the
    // signal path.
    let exit_status = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled(), if !was_cancelled && !timed_out => {
                was_cancelled = true;
                if let Some(pid) = pid {
                    tracing::info!(program = %spec.program, pid, "cancellation, killing process group");
                    terminate_process_tree(pid, true).await;
                }
            }
            _ = &mut hard_sleep, if !timed_out && !was_cancelled => {
                timed_out = true;
                if let Some(pid) = pid {
                    tracing::warn!(program = %spec.program, pid, "hard timeout, killing process group");
                    terminate_process_tree(pid, true).await;
                }
                sleep(SOFT_KILL_GRACE).await;
            }
            _ = &mut soft_sleep, if spec.soft_timeout.is_some() && !soft_fired && !timed_out && !was_cancelled => {
                soft_fired = true;
                if let Some(pid) = pid {
                    tracing::warn!(program = %spec.program, pid, "soft timeout, sending SIGTERM to process group");
                    terminate_process_tree(pid, false).await;
                }
            }
            status = child.wait() => {
                break status.map_err(|e| CoreError::Io(e.to_string()))?;
            }
        }
    };

    let _ = stdout_task.await;
    let _ = stderr_task.await;

    if was_cancelled {
        return Err(CoreError::Cancelled);
    }
    if timed_out {
        return Err(CoreError::Timeout(format!(
            "'{}' exceeded the {}s hard timeout",
            spec.program,
            spec.hard_timeout.as_secs()
        )));
    }

    let stdout = Arc::try_unwrap(stdout_buf)
        .map(|m| m.into_inner().into_text())
        .unwrap_or_default();
    let stderr = Arc::try_unwrap(stderr_buf)
        .map(|m| m.into_inner().into_text())
        .unwrap_or_default();

    Ok(CommandOutput {
        exit_code: exit_status.code(),
        stdout,
        stderr,
        elapsed: start.elapsed(),
        soft_timeout_fired: soft_fired,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(program: &str) -> CommandSpec {
        CommandSpec::new(program, std::env::temp_dir())
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let out = run_command(
            spec("sh").args(["-c", "echo hello; exit 3"]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stdout.trim(), "hello");
        assert!(!out.soft_timeout_fired);
    }

    #[tokio::test]
    async fn missing_executable_is_tool_missing() {
        let err = run_command(spec("definitely-not-a-real-binary"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ToolMissing(_)));
    }

    #[tokio::test]
    async fn hard_timeout_kills_the_process() {
        let err = run_command(
            spec("sh")
                .args(["-c", "sleep 30"])
                .hard_timeout(Duration::from_millis(300)),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::Timeout(_)));
    }

    #[tokio::test]
    async fn soft_timeout_terminates_politely() {
        let out = run_command(
            spec("sh")
                .args(["-c", "trap 'exit 7' TERM; sleep 30 & wait"])
                .soft_timeout(Duration::from_millis(200))
                .hard_timeout(Duration::from_secs(10)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(out.soft_timeout_fired);
        assert_eq!(out.exit_code, Some(7));
    }

    #[tokio::test]
    async fn cancellation_kills_the_process() {
        let cancel = CancellationToken::new();
        let child_cancel = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(100)).await;
            child_cancel.cancel();
        });
        let err = run_command(
            spec("sh")
                .args(["-c", "sleep 30"])
                .hard_timeout(Duration::from_secs(60)),
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::Cancelled));
    }

    #[test]
    fn ring_buffer_truncates_with_marker() {
        let mut buf = BoundedOutputBuffer::new(4, 1 << 20);
        for i in 0..10 {
            buf.push_line(&format!("line {}", i));
        }
        let text = buf.into_text();
        assert!(text.contains("output truncated"));
        assert!(text.contains("line 9"));
        assert!(!text.contains("line 0\n"));
    }

    #[test]
    fn ring_buffer_bounds_bytes() {
        let mut buf = BoundedOutputBuffer::new(usize::MAX, 64);
        for _ in 0..100 {
            buf.push_line(&"x".repeat(16));
        }
        let text = buf.into_text();
        assert!(text.len() < 256);
        assert!(text.contains("dropped"));
    }
}
