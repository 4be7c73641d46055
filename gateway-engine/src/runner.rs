//! C5 — process runner.
//!
//! Launches one external process, drains stdout/stderr into bounded
//! accumulators, enforces a wall-clock deadline, and returns an
//! [`ExecutionResult`]. Grounded directly on the teacher's
//! `tools/git_tools.rs::run_git` (spawn + `tokio::time::timeout` + truncate
//! long output) and `mcp/client.rs` (piped child stdio, reader tasks).

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout, Command};
use tokio::sync::Notify;

use crate::types::ExecutionResult;

const TRUNCATION_SENTINEL: &str = "\n... (output truncated)";

/// One process invocation to run.
pub struct RunSpec<'a> {
    pub program: &'a str,
    pub args: &'a [&'a str],
    pub cwd: Option<&'a Path>,
    pub env: &'a HashMap<String, String>,
    pub deadline: Duration,
    pub max_output_bytes: usize,
}

/// Launch `spec`, capture bounded stdout/stderr, enforce the deadline.
///
/// Any OS-level spawn error is surfaced as a result with `exit_code = -1`,
/// `error = true`, and the message in `stderr` (spec §4.5 point 5) rather
/// than as an `Err` — the caller always gets a reportable result.
pub async fn run(spec: RunSpec<'_>) -> ExecutionResult {
    let t0 = Instant::now();

    let mut command = Command::new(spec.program);
    command
        .args(spec.args)
        .envs(spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(cwd) = spec.cwd {
        command.current_dir(cwd);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            return ExecutionResult {
                stdout: String::new(),
                stderr: format!("failed to launch {}: {}", spec.program, e),
                exit_code: -1,
                duration_ms: t0.elapsed().as_millis() as u64,
                killed: false,
                cached: false,
                phase: None,
                error: true,
            };
        }
    };

    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");
    let max_output_bytes = spec.max_output_bytes;

    // Either drain task notifies this the moment it overflows its cap, so
    // the main loop can request a kill immediately instead of waiting for
    // the full deadline (spec §4.5 point 2).
    let overflow = Arc::new(Notify::new());

    let stdout_task = tokio::spawn(drain_bounded_stdout(stdout, max_output_bytes, overflow.clone()));
    let stderr_task = tokio::spawn(drain_bounded_stderr(stderr, max_output_bytes, overflow.clone()));

    let mut deadline_fired = false;
    let mut overflow_fired = false;

    tokio::select! {
        result = tokio::time::timeout(spec.deadline, child.wait()) => {
            if result.is_err() {
                deadline_fired = true;
            }
        }
        _ = overflow.notified() => {
            overflow_fired = true;
        }
    }

    if deadline_fired || overflow_fired {
        let _ = child.start_kill();
    }
    let wait_status = child.wait().await;

    let (stdout_bytes, stdout_truncated) = stdout_task.await.unwrap_or_default();
    let (stderr_bytes, stderr_truncated) = stderr_task.await.unwrap_or_default();

    let mut stdout_str = String::from_utf8_lossy(&stdout_bytes).trim_end().to_string();
    let mut stderr_str = String::from_utf8_lossy(&stderr_bytes).trim_end().to_string();
    if stdout_truncated {
        stdout_str.push_str(TRUNCATION_SENTINEL);
    }
    if stderr_truncated {
        stderr_str.push_str(TRUNCATION_SENTINEL);
    }

    let killed = deadline_fired || stdout_truncated || stderr_truncated;
    let exit_code = if killed {
        -1
    } else {
        match wait_status {
            Ok(status) => status.code().unwrap_or(-1),
            Err(_) => -1,
        }
    };

    ExecutionResult {
        stdout: stdout_str,
        stderr: stderr_str,
        exit_code,
        duration_ms: t0.elapsed().as_millis() as u64,
        killed,
        cached: false,
        phase: None,
        error: false,
    }
}

/// Drain a stream into an accumulator up to `cap` bytes; on overflow, stop
/// reading, append nothing itself (the caller appends the sentinel), and
/// notify so the caller kills the process. Both stdout and stderr use the
/// same bounded-drain-then-kill policy — the teacher's original
/// stdout-only-kill asymmetry is intentionally not preserved here
/// (spec §9 point 4).
async fn drain_bounded_stdout(mut stream: ChildStdout, cap: usize, overflow: Arc<Notify>) -> (Vec<u8>, bool) {
    drain_bounded(&mut stream, cap, overflow).await
}

async fn drain_bounded_stderr(mut stream: ChildStderr, cap: usize, overflow: Arc<Notify>) -> (Vec<u8>, bool) {
    drain_bounded(&mut stream, cap, overflow).await
}

async fn drain_bounded<R: tokio::io::AsyncRead + Unpin>(
    stream: &mut R,
    cap: usize,
    overflow: Arc<Notify>,
) -> (Vec<u8>, bool) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::with_capacity(4096.min(cap));
    let mut chunk = [0u8; 4096];
    let mut truncated = false;

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let remaining = cap.saturating_sub(buf.len());
                if remaining == 0 {
                    truncated = true;
                    overflow.notify_one();
                    break;
                }
                let take = n.min(remaining);
                buf.extend_from_slice(&chunk[..take]);
                if take < n {
                    truncated = true;
                    overflow.notify_one();
                    break;
                }
            }
            Err(_) => break,
        }
    }

    (buf, truncated)
}
