use std::{
    path::Path,
    process::{ExitStatus, Stdio},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use anyhow::Context;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::Command,
    sync::Notify,
    task::JoinHandle,
};

use crate::{
    config::ExecutionLimits,
    models::{ExecutionResult, ExecutionStatus},
    sandbox::{ExecutionOutcome, ExecutionReport, Invocation, KillReason},
};

pub const KILLED_MESSAGE: &str = "Execution timed out or output size exceeded";

// How long to keep draining pipes after the child is gone. Only matters when
// something outside the process group still holds a pipe open.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Runs one child process under the configured time and output bounds.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    limits: ExecutionLimits,
    env_passthrough: Vec<String>,
}

#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    overflowed: bool,
}

type SharedCapture = Arc<Mutex<Captured>>;

impl ProcessExecutor {
    pub fn new(limits: ExecutionLimits, env_passthrough: Vec<String>) -> Self {
        Self {
            limits,
            env_passthrough,
        }
    }

    pub async fn run(
        &self,
        invocation: &Invocation,
        cwd: &Path,
        input: &str,
    ) -> anyhow::Result<ExecutionReport> {
        let started = Instant::now();

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .current_dir(cwd)
            .env_clear()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for key in &self.env_passthrough {
            if let Some(value) = std::env::var_os(key) {
                cmd.env(key, value);
            }
        }
        cmd.env("HOME", "/tmp").env("USER", "sandbox");
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                tracing::warn!(
                    program = %invocation.program,
                    error = %err,
                    "failed to spawn sandboxed process"
                );
                return Ok(ExecutionReport {
                    result: ExecutionResult {
                        status: ExecutionStatus::Error,
                        stdout: String::new(),
                        stderr: String::new(),
                        execution_time: elapsed_ms(started),
                        error: Some(format!("Failed to start process: {err}")),
                    },
                    outcome: ExecutionOutcome::SpawnFailure,
                });
            }
        };

        // Read now: `Child::id` returns None once the child has been reaped.
        let mut group = ProcessGroupGuard::new(child.id());

        if let Some(mut stdin) = child.stdin.take() {
            let input = input.as_bytes().to_vec();
            tokio::spawn(async move {
                if !input.is_empty() {
                    let _ = stdin.write_all(&input).await;
                }
                let _ = stdin.shutdown().await;
            });
        }

        let overflow = Arc::new(Notify::new());
        let limit = self.limits.max_output_size;
        let stdout = child.stdout.take().context("missing stdout pipe")?;
        let stderr = child.stderr.take().context("missing stderr pipe")?;
        let stdout_buf = SharedCapture::default();
        let stderr_buf = SharedCapture::default();
        let stdout_task = spawn_capture(stdout, limit, stdout_buf.clone(), overflow.clone());
        let stderr_task = spawn_capture(stderr, limit, stderr_buf.clone(), overflow.clone());

        let deadline = tokio::time::sleep(self.limits.max_execution_time);
        tokio::pin!(deadline);

        let (status, mut kill_reason) = tokio::select! {
            status = child.wait() => {
                (Some(status.context("failed waiting for sandboxed process")?), None)
            }
            _ = &mut deadline => (None, Some(KillReason::Timeout)),
            _ = overflow.notified() => (None, Some(KillReason::OutputOverflow)),
        };

        // Takes down anything the program left running in its group as well.
        group.kill();
        let status = match status {
            Some(status) => status,
            None => {
                let _ = child.start_kill();
                child
                    .wait()
                    .await
                    .context("failed reaping killed sandboxed process")?
            }
        };

        drain(stdout_task).await;
        drain(stderr_task).await;
        let stdout = take_capture(&stdout_buf);
        let stderr = take_capture(&stderr_buf);

        if kill_reason.is_none() && (stdout.overflowed || stderr.overflowed) {
            kill_reason = Some(KillReason::OutputOverflow);
        }

        let execution_time = elapsed_ms(started);
        let (outcome, status, error) = classify(status, kill_reason);

        if let Some(reason) = kill_reason {
            tracing::info!(
                program = %invocation.program,
                %reason,
                execution_time,
                "sandboxed process killed"
            );
        }

        Ok(ExecutionReport {
            result: ExecutionResult {
                status,
                stdout: lossy_truncated(stdout.bytes, limit),
                stderr: lossy_truncated(stderr.bytes, limit),
                execution_time,
                error,
            },
            outcome,
        })
    }
}

fn classify(
    status: ExitStatus,
    kill_reason: Option<KillReason>,
) -> (ExecutionOutcome, ExecutionStatus, Option<String>) {
    if let Some(reason) = kill_reason {
        return (
            ExecutionOutcome::Killed(reason),
            ExecutionStatus::Error,
            Some(KILLED_MESSAGE.to_string()),
        );
    }

    match status.code() {
        Some(0) => (
            ExecutionOutcome::Exited { code: 0 },
            ExecutionStatus::Success,
            None,
        ),
        Some(code) => (
            ExecutionOutcome::Exited { code },
            ExecutionStatus::Error,
            Some(format!("Process exited with code {code}")),
        ),
        None => (
            ExecutionOutcome::Signalled,
            ExecutionStatus::Error,
            Some("Process terminated by signal".to_string()),
        ),
    }
}

fn spawn_capture<R>(
    mut reader: R,
    limit: usize,
    buffer: SharedCapture,
    overflow: Arc<Notify>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            let n = match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            let mut captured = match buffer.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let remaining = limit.saturating_sub(captured.bytes.len());
            captured.bytes.extend_from_slice(&chunk[..remaining.min(n)]);
            if n > remaining {
                captured.overflowed = true;
                drop(captured);
                overflow.notify_one();
                break;
            }
        }
    })
}

async fn drain(task: JoinHandle<()>) {
    let abort = task.abort_handle();
    if tokio::time::timeout(DRAIN_GRACE, task).await.is_err() {
        tracing::warn!("output pipe still open after process exit; abandoning reader");
        abort.abort();
    }
}

fn take_capture(buffer: &SharedCapture) -> Captured {
    let mut captured = match buffer.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    std::mem::take(&mut *captured)
}

/// Decodes at most `limit` bytes. Replacement characters can grow the text, so
/// the result is cut back to the last char boundary within `limit`.
fn lossy_truncated(mut bytes: Vec<u8>, limit: usize) -> String {
    bytes.truncate(limit);
    let mut text = String::from_utf8_lossy(&bytes).into_owned();
    if text.len() > limit {
        let mut cut = limit;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Kills the child's process group exactly once: explicitly after the run, or
/// on drop when the run future is cancelled mid-flight.
struct ProcessGroupGuard {
    pid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self { pid }
    }

    fn kill(&mut self) {
        kill_process_group(self.pid.take());
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        if self.pid.is_some() {
            tracing::debug!(pid = ?self.pid, "run cancelled; killing process group");
            self.kill();
        }
    }
}

/// Kills the whole group led by `pid`; the child is spawned with
/// `process_group(0)` so toolchains that fork (cargo, a shell) go down too.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid
        && let Ok(pid) = i32::try_from(pid)
    {
        let pgid = nix::unistd::Pid::from_raw(pid);
        let _ = nix::sys::signal::killpg(pgid, nix::sys::signal::Signal::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}
