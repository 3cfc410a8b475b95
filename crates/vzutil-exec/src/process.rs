//! Transport invocation using `tokio::process`
//!
//! Every runner operation ends up here: one external program, its argv, and an
//! optional script on stdin. Non-zero exits become [`RunnerError`]; anything
//! that stops the program from running at all stays a local fault.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, Stderr};
use tokio::process::{ChildStdin, Command};
use tracing::{debug, error, instrument, warn};

use crate::error::{ExecError, RunnerError};
use crate::result::{CommandResult, Verbosity};

const READ_BUFFER_SIZE: usize = 4096;

/// A transport program and its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
}

impl Invocation {
    /// Create an invocation of `program` with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Program and arguments quoted for `sh`, for display and error reports
    #[must_use]
    pub fn command_line(&self) -> String {
        shell_words::join(std::iter::once(&self.program).chain(&self.args))
    }

    /// Run to completion, feeding `stdin` if given
    ///
    /// With [`Verbosity::Verbose`] both output streams are echoed to our stderr
    /// while they are captured.
    ///
    /// # Errors
    /// `ExecError::CommandFailed` on a non-zero exit, `SpawnError`/`IoError`
    /// for local faults.
    pub async fn execute(
        &self,
        stdin: Option<&str>,
        verbosity: Verbosity,
    ) -> Result<CommandResult, ExecError> {
        if verbosity.is_verbose() {
            let mut echo_out = tokio::io::stderr();
            let mut echo_err = tokio::io::stderr();
            self.execute_with(stdin, Some(&mut echo_out), Some(&mut echo_err))
                .await
        } else {
            self.execute_with::<Stderr, Stderr>(stdin, None, None).await
        }
    }

    /// Run to completion, echoing output into the given writers
    #[instrument(skip_all, fields(command = %self.command_line()), level = "debug")]
    pub(crate) async fn execute_with<O, E>(
        &self,
        stdin: Option<&str>,
        echo_out: Option<&mut O>,
        echo_err: Option<&mut E>,
    ) -> Result<CommandResult, ExecError>
    where
        O: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        let start = Instant::now();
        let command = self.command_line();

        debug!(stdin_len = stdin.map_or(0, str::len), "spawning transport");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecError::SpawnError {
                program: self.program.clone(),
                message: e.to_string(),
            })?;

        let child_stdin = child.stdin.take();
        let child_stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecError::IoError("stdout was not piped".to_string()))?;
        let child_stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExecError::IoError("stderr was not piped".to_string()))?;

        // Feed and drain together, a large script would otherwise deadlock
        // against a full output pipe.
        let ((), stdout, stderr) = tokio::try_join!(
            feed(child_stdin, stdin),
            capture(child_stdout, echo_out),
            capture(child_stderr, echo_err),
        )
        .map_err(|e| ExecError::IoError(e.to_string()))?;

        let exit = child
            .wait()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        let duration = start.elapsed();
        let status = exit.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&stdout).into_owned();
        let stderr = String::from_utf8_lossy(&stderr).into_owned();

        debug!(status, duration = ?duration, "transport exited");

        if !exit.success() {
            error!(status, stderr = %stderr.trim(), "transport failed");
            return Err(RunnerError {
                command,
                stdin: stdin.unwrap_or_default().to_string(),
                stdout,
                stderr,
                status,
            }
            .into());
        }

        Ok(CommandResult {
            command,
            status,
            stdout,
            stderr,
            duration,
        })
    }
}

/// Write the script and close the pipe so the target sees EOF
async fn feed(pipe: Option<ChildStdin>, input: Option<&str>) -> io::Result<()> {
    let (Some(mut pipe), Some(input)) = (pipe, input) else {
        return Ok(());
    };
    match pipe.write_all(input.as_bytes()).await {
        // Target exited before reading all of stdin; its exit status is reported instead.
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

/// Read a stream to the end, copying each chunk to `echo` as it arrives
async fn capture<R, W>(mut reader: R, mut echo: Option<&mut W>) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut captured = Vec::new();
    let mut buf = [0u8; READ_BUFFER_SIZE];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        captured.extend_from_slice(&buf[..n]);
        if let Some(w) = echo.as_deref_mut() {
            w.write_all(&buf[..n]).await?;
            w.flush().await?;
        }
    }

    Ok(captured)
}

/// Run `command_line` through `sh -c` attached to our own terminal
///
/// Blocks until the session ends. The exit status is handed back untouched.
///
/// # Errors
/// Only local faults: the shell could not be started.
pub async fn interactive(command_line: &str) -> Result<ExitStatus, ExecError> {
    debug!(command = %command_line, "starting interactive session");

    let status = Command::new("sh")
        .arg("-c")
        .arg(command_line)
        .status()
        .await
        .map_err(|e| ExecError::SpawnError {
            program: "sh".to_string(),
            message: e.to_string(),
        })?;

    if !status.success() {
        warn!(
            command = %command_line,
            status = ?status.code(),
            "interactive session exited non-zero"
        );
    }

    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line() {
        let inv = Invocation::new("scp").args(["-P", "22"]).arg("-r");
        assert_eq!(inv.command_line(), "scp -P 22 -r");
        assert_eq!(inv.program(), "scp");
        assert_eq!(inv.arguments(), ["-P", "22", "-r"]);
    }

    #[tokio::test]
    async fn test_command_line_survives_sh() {
        let inv = Invocation::new("printf").args(["%s|", "a b", "$HOME;x", "it's"]);

        let result = Invocation::new("sh")
            .arg("-c")
            .arg(inv.command_line())
            .execute(None, Verbosity::Quiet)
            .await
            .unwrap();

        assert_eq!(result.stdout, "a b|$HOME;x|it's|");
    }

    #[tokio::test]
    async fn test_stdin_is_passed_through() {
        let result = Invocation::new("cat")
            .execute(Some("abc\ndef"), Verbosity::Quiet)
            .await
            .unwrap();

        assert!(result.success());
        assert_eq!(result.stdout, "abc\ndef");
        assert_eq!(result.command, "cat");
    }

    #[tokio::test]
    async fn test_non_zero_exit_keeps_all_fields() {
        let err = Invocation::new("bash")
            .execute(Some("echo out; echo err >&2; exit 7"), Verbosity::Quiet)
            .await
            .unwrap_err();

        let failure = err.command_failure().unwrap();
        assert_eq!(failure.command, "bash");
        assert_eq!(failure.stdin, "echo out; echo err >&2; exit 7");
        assert_eq!(failure.stdout, "out\n");
        assert_eq!(failure.stderr, "err\n");
        assert_eq!(failure.status, 7);
    }

    #[tokio::test]
    async fn test_missing_stdin_reported_empty() {
        let err = Invocation::new("sh")
            .args(["-c", "exit 3"])
            .execute(None, Verbosity::Quiet)
            .await
            .unwrap_err();

        let failure = err.command_failure().unwrap();
        assert_eq!(failure.stdin, "");
        assert_eq!(failure.command, "sh -c 'exit 3'");
        assert_eq!(failure.status, 3);
    }

    #[tokio::test]
    async fn test_missing_binary_is_local_fault() {
        let err = Invocation::new("vzutil-definitely-not-installed")
            .execute(Some("true"), Verbosity::Quiet)
            .await
            .unwrap_err();

        assert!(err.is_local_fault());
        let ExecError::SpawnError { program, .. } = &err else {
            panic!("expected spawn error, got {err:?}");
        };
        assert_eq!(program, "vzutil-definitely-not-installed");
    }

    #[tokio::test]
    async fn test_echo_streams_and_captures() {
        let mut out = Vec::new();
        let mut err = Vec::new();

        let result = Invocation::new("sh")
            .args(["-c", "echo hello; echo oops >&2"])
            .execute_with(None, Some(&mut out), Some(&mut err))
            .await
            .unwrap();

        assert_eq!(result.stdout, "hello\n");
        assert_eq!(result.stderr, "oops\n");
        assert_eq!(out, b"hello\n");
        assert_eq!(err, b"oops\n");
    }

    #[tokio::test]
    async fn test_large_stdin_does_not_deadlock() {
        let script = "x".repeat(1 << 20);
        let result = Invocation::new("cat")
            .execute(Some(&script), Verbosity::Quiet)
            .await
            .unwrap();

        assert_eq!(result.stdout.len(), script.len());
    }

    #[tokio::test]
    async fn test_early_exit_ignores_unread_stdin() {
        let script = format!("exit 0\n{}", "# padding\n".repeat(100_000));
        let result = Invocation::new("sh")
            .arg("-c")
            .arg("exit 0")
            .execute(Some(&script), Verbosity::Quiet)
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_interactive_returns_exit_status() {
        let status = interactive("exit 4").await.unwrap();
        assert_eq!(status.code(), Some(4));
    }
}
