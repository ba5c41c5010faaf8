//! Bounded subprocess execution with deadlines and cancellation.
//!
//! Every external binary (git, gh, the planner CLI) runs through
//! [`run_command`]. Each output stream is drained on its own thread into a
//! capped buffer so a chatty child can never fill the pipe and deadlock;
//! bytes past the cap are read and discarded.

use crate::error::{Result, TaskctlError};
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

/// Per-stream capture cap.
const MAX_CAPTURE: usize = 10 * 1024 * 1024;

/// Granularity of the cancellation poll while waiting on a child.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Cooperative cancellation handle. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct CmdOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Render a command line the way error messages show it.
pub(crate) fn render(program: &str, args: &[&str]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// Run `program args…`, capturing bounded stdout/stderr.
///
/// Returns the child's output whatever its exit code; callers decide what a
/// failure means. A deadline overrun kills the child and surfaces
/// [`TaskctlError::Timeout`]; a tripped token surfaces
/// [`TaskctlError::Cancelled`]. Neither leaves a running child behind.
pub(crate) fn run_command(
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<CmdOutput> {
    if cancel.is_cancelled() {
        return Err(TaskctlError::Cancelled);
    }

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn()?;
    let stdout = drain(child.stdout.take().expect("stdout piped"));
    let stderr = drain(child.stderr.take().expect("stderr piped"));

    let started = Instant::now();
    let status = loop {
        let remaining = timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            child.kill().ok();
            child.wait().ok();
            join(stdout);
            join(stderr);
            return Err(TaskctlError::Timeout {
                command: render(program, args),
                seconds: timeout.as_secs(),
            });
        }
        if cancel.is_cancelled() {
            child.kill().ok();
            child.wait().ok();
            join(stdout);
            join(stderr);
            return Err(TaskctlError::Cancelled);
        }
        if let Some(status) = child.wait_timeout(remaining.min(POLL_INTERVAL))? {
            break status;
        }
    };

    Ok(CmdOutput {
        stdout: join(stdout),
        stderr: join(stderr),
        exit_code: status.code().unwrap_or(1),
    })
}

fn drain(mut reader: impl Read + Send + 'static) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut captured = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if captured.len() < MAX_CAPTURE {
                        let take = n.min(MAX_CAPTURE - captured.len());
                        captured.extend_from_slice(&chunk[..take]);
                    }
                    // Past the cap: keep reading to EOF so the child never
                    // blocks on a full pipe.
                }
            }
        }
        String::from_utf8_lossy(&captured).into_owned()
    })
}

fn join(handle: JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> CancelToken {
        CancelToken::new()
    }

    #[test]
    fn captures_stdout_and_exit_code() {
        let out = run_command(
            "sh",
            &["-c", "echo hello; exit 0"],
            None,
            Duration::from_secs(10),
            &token(),
        )
        .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn captures_stderr_on_failure() {
        let out = run_command(
            "sh",
            &["-c", "echo oops >&2; exit 3"],
            None,
            Duration::from_secs(10),
            &token(),
        )
        .unwrap();
        assert!(!out.success());
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[test]
    fn timeout_kills_the_child() {
        let err = run_command(
            "sh",
            &["-c", "sleep 30"],
            None,
            Duration::from_millis(200),
            &token(),
        )
        .unwrap_err();
        assert!(matches!(err, TaskctlError::Timeout { .. }));
    }

    #[test]
    fn pre_cancelled_token_short_circuits() {
        let cancel = token();
        cancel.cancel();
        let err = run_command("sh", &["-c", "true"], None, Duration::from_secs(5), &cancel)
            .unwrap_err();
        assert!(matches!(err, TaskctlError::Cancelled));
    }

    #[test]
    fn output_is_bounded() {
        // 32 MiB of output against a 10 MiB cap; must terminate, not deadlock.
        let out = run_command(
            "sh",
            &["-c", "head -c 33554432 /dev/zero | tr '\\0' 'x'"],
            None,
            Duration::from_secs(60),
            &token(),
        )
        .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.len(), MAX_CAPTURE);
    }

    #[test]
    fn render_joins_program_and_args() {
        assert_eq!(render("git", &["push", "origin"]), "git push origin");
    }
}
