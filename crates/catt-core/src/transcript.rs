//! Handshake client invocation and transcript capture.
//!
//! The external client is opaque: it is started with a fixed argument set,
//! fed a single request on stdin, and observed only through the bytes it
//! writes to stdout and stderr.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::RunnerError;

/// Default wait budget for one handshake client invocation.
pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(10);

/// Exit code recorded when the client was killed or terminated by a signal.
pub const TERMINATED_EXIT_CODE: i32 = -1;

const READ_CHUNK: usize = 8 * 1024;

/// Captured output of one handshake client invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    raw: Vec<u8>,
    exit_code: i32,
    timed_out: bool,
}

impl Transcript {
    /// Transcript of a client that exited on its own.
    #[must_use]
    pub fn completed(raw: impl Into<Vec<u8>>, exit_code: i32) -> Self {
        Self {
            raw: raw.into(),
            exit_code,
            timed_out: false,
        }
    }

    /// Transcript of a client that was killed at the deadline.
    #[must_use]
    pub fn timed_out(raw: impl Into<Vec<u8>>) -> Self {
        Self {
            raw: raw.into(),
            exit_code: TERMINATED_EXIT_CODE,
            timed_out: true,
        }
    }

    /// Merged stdout/stderr bytes.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.exit_code
    }

    #[must_use]
    pub const fn is_timed_out(&self) -> bool {
        self.timed_out
    }
}

/// Program plus arguments for one client run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<String>,
}

impl Invocation {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Space-joined command line, as shown in debug narration.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Something that can perform a handshake and hand back its transcript.
///
/// [`ProcessRunner`] is the real implementation; tests substitute scripted
/// clients.
#[async_trait]
pub trait HandshakeClient: Send + Sync {
    /// Run the client once.
    ///
    /// A timeout is not an error: it yields a transcript with
    /// [`Transcript::is_timed_out`] set.
    ///
    /// # Errors
    /// Returns [`RunnerError`] if the client cannot be started or its output
    /// cannot be collected.
    async fn run(
        &self,
        invocation: &Invocation,
        input: &[u8],
        time_limit: Duration,
    ) -> Result<Transcript, RunnerError>;
}

/// Runs the handshake client as a subprocess.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HandshakeClient for ProcessRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        input: &[u8],
        time_limit: Duration,
    ) -> Result<Transcript, RunnerError> {
        let deadline = Instant::now() + time_limit;

        let mut child = {
            let mut cmd = Command::new(invocation.program());
            cmd.args(invocation.args())
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);
            cmd.spawn().map_err(|source| RunnerError::Spawn {
                program: invocation.program().to_path_buf(),
                source,
            })?
        };
        debug!(
            program = %invocation.program().display(),
            args = invocation.args().len(),
            pid = ?child.id(),
            "handshake client started"
        );

        let mut stdin = child
            .stdin
            .take()
            .ok_or(RunnerError::PipeUnavailable("stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(RunnerError::PipeUnavailable("stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or(RunnerError::PipeUnavailable("stderr"))?;

        match tokio::time::timeout_at(deadline, stdin.write_all(input)).await {
            Ok(Ok(())) => {}
            // The client may exit before reading its input; its output still counts.
            Ok(Err(err)) if err.kind() == io::ErrorKind::BrokenPipe => {
                debug!("handshake client closed stdin before reading the request");
            }
            Ok(Err(err)) => return Err(RunnerError::Collect(err)),
            Err(_) => {
                warn!(?time_limit, "handshake client did not accept input in time");
                terminate(&mut child).await;
                return Ok(Transcript::timed_out(Vec::new()));
            }
        }
        // Closing stdin signals end-of-request.
        drop(stdin);

        let mut output = Vec::new();
        let collected = tokio::time::timeout_at(
            deadline,
            collect_merged(&mut child, stdout, stderr, &mut output),
        )
        .await;

        match collected {
            Ok(Ok(status)) => {
                let exit_code = status.code().unwrap_or(TERMINATED_EXIT_CODE);
                debug!(exit_code, bytes = output.len(), "handshake client exited");
                Ok(Transcript::completed(output, exit_code))
            }
            Ok(Err(err)) => Err(RunnerError::Collect(err)),
            Err(_) => {
                warn!(
                    ?time_limit,
                    bytes = output.len(),
                    "handshake client exceeded its time limit; killing it"
                );
                terminate(&mut child).await;
                Ok(Transcript::timed_out(output))
            }
        }
    }
}

/// Kill and reap the child. Returns whether the kill went through.
async fn terminate(child: &mut Child) -> bool {
    match child.kill().await {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, pid = ?child.id(), "could not kill handshake client");
            false
        }
    }
}

/// Drain stdout and stderr into one buffer in arrival order, then reap the
/// child.
async fn collect_merged(
    child: &mut Child,
    mut stdout: ChildStdout,
    mut stderr: ChildStderr,
    output: &mut Vec<u8>,
) -> io::Result<ExitStatus> {
    let mut out_buf = [0u8; READ_CHUNK];
    let mut err_buf = [0u8; READ_CHUNK];
    let mut out_open = true;
    let mut err_open = true;

    while out_open || err_open {
        tokio::select! {
            read = stdout.read(&mut out_buf), if out_open => {
                let n = read?;
                if n == 0 {
                    out_open = false;
                } else {
                    output.extend_from_slice(&out_buf[..n]);
                }
            }
            read = stderr.read(&mut err_buf), if err_open => {
                let n = read?;
                if n == 0 {
                    err_open = false;
                } else {
                    output.extend_from_slice(&err_buf[..n]);
                }
            }
        }
    }

    child.wait().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_joins_program_and_args() {
        let invocation = Invocation::new(
            "/usr/bin/openssl",
            vec!["s_client".into(), "-host".into(), "example.org".into()],
        );
        assert_eq!(
            invocation.command_line(),
            "/usr/bin/openssl s_client -host example.org"
        );
    }

    #[test]
    fn timed_out_transcript_uses_sentinel_exit_code() {
        let transcript = Transcript::timed_out(b"partial".to_vec());
        assert!(transcript.is_timed_out());
        assert_eq!(transcript.exit_code(), TERMINATED_EXIT_CODE);
        assert_ne!(transcript.exit_code(), 0);
        assert_eq!(transcript.raw(), b"partial");
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let invocation = Invocation::new("/nonexistent/catt-handshake-client", Vec::new());
        let err = ProcessRunner::new()
            .run(&invocation, b"GET / HTTP/1.0\r\n\r\n", Duration::from_secs(1))
            .await
            .expect_err("spawn should fail");
        assert!(matches!(err, RunnerError::Spawn { .. }));
        assert!(err.to_string().contains("/nonexistent/catt-handshake-client"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout_stderr_and_exit_code() {
        let invocation = Invocation::new(
            "/bin/sh",
            vec![
                "-c".into(),
                "cat; echo to-stderr 1>&2; exit 3".into(),
            ],
        );
        let transcript = ProcessRunner::new()
            .run(&invocation, b"GET / HTTP/1.0\r\n\r\n", Duration::from_secs(5))
            .await
            .expect("run succeeds");

        let text = String::from_utf8_lossy(transcript.raw());
        assert!(text.contains("GET / HTTP/1.0"));
        assert!(text.contains("to-stderr"));
        assert_eq!(transcript.exit_code(), 3);
        assert!(!transcript.is_timed_out());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn kills_client_at_deadline() {
        let invocation = Invocation::new(
            "/bin/sh",
            vec!["-c".into(), "echo started; exec sleep 30".into()],
        );
        let start = std::time::Instant::now();
        let transcript = ProcessRunner::new()
            .run(&invocation, b"", Duration::from_millis(300))
            .await
            .expect("timeout is not an error");

        assert!(transcript.is_timed_out());
        assert_eq!(transcript.exit_code(), TERMINATED_EXIT_CODE);
        assert!(String::from_utf8_lossy(transcript.raw()).contains("started"));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn terminate_reports_whether_the_kill_went_through() {
        let mut running = Command::new("/bin/sh")
            .args(["-c", "exec sleep 30"])
            .kill_on_drop(true)
            .spawn()
            .expect("spawn sleeper");
        assert!(terminate(&mut running).await);

        let mut reaped = Command::new("/bin/sh")
            .args(["-c", "exit 0"])
            .spawn()
            .expect("spawn shell");
        reaped.wait().await.expect("wait for shell");
        assert!(!terminate(&mut reaped).await);
    }
}
