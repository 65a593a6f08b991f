//! External command invocation.
//!
//! One [`ExternalCommand`] accumulates the arguments of a single tool
//! invocation. A live run clears the accumulated arguments so the instance
//! can be reused.

use std::fmt;
use std::future;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::CommandError;

/// Cancellation and deadline governing external invocations.
#[derive(Debug, Clone, Default)]
pub struct ExecContext {
    /// Cancelled on interrupt or termination.
    token: CancellationToken,
    /// Per-invocation deadline.
    timeout: Option<Duration>,
}

impl ExecContext {
    /// Creates a context bound to `token`.
    #[must_use]
    pub const fn new(token: CancellationToken, timeout: Option<Duration>) -> Self {
        Self { token, timeout }
    }

    /// The cancellation token.
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns true once the context has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Captured output of an invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

/// A single external tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    /// Program name or path.
    program: String,
    /// Accumulated arguments, in order.
    args: Vec<String>,
    /// Skip the launch and report success.
    dry_run: bool,
}

impl ExternalCommand {
    /// Creates an invocation of `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>, dry_run: bool) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dry_run,
        }
    }

    /// Appends arguments after the ones already accumulated.
    pub fn append_args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The program name.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The accumulated arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns true in dry-run mode.
    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Runs the invocation and captures its output.
    ///
    /// In dry-run mode nothing is launched, the outputs are empty and the
    /// accumulated arguments stay in place for display. A live run kills
    /// the child when `ctx` is cancelled or its deadline passes, and always
    /// clears the accumulated arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be launched, exits
    /// unsuccessfully, is cancelled or times out.
    pub async fn run(&mut self, ctx: &ExecContext) -> Result<CommandOutput, CommandError> {
        if self.dry_run {
            debug!("Dry run: {self}");
            return Ok(CommandOutput::default());
        }

        debug!("Running: {self}");
        let args = std::mem::take(&mut self.args);
        let program = self.program.clone();

        if ctx.is_cancelled() {
            return Err(CommandError::Cancelled { program });
        }

        let child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::Launch {
                program: program.clone(),
                source,
            })?;

        // Dropping the pending future drops the child, which kills it.
        let output = tokio::select! {
            output = child.wait_with_output() => output.map_err(|source| CommandError::Launch {
                program: program.clone(),
                source,
            })?,
            () = ctx.token.cancelled() => return Err(CommandError::Cancelled { program }),
            () = deadline(ctx.timeout) => return Err(CommandError::TimedOut { program }),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(CommandError::NonZeroExit {
                program,
                status: output.status.to_string(),
                stdout,
                stderr,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }

    /// Runs the invocation, logging its output.
    ///
    /// # Errors
    ///
    /// Returns the error of [`ExternalCommand::run`] after logging it.
    pub async fn execute(&mut self, ctx: &ExecContext) -> Result<(), CommandError> {
        match self.run(ctx).await {
            Ok(output) => {
                if !output.stderr.trim().is_empty() {
                    warn!("{}: {}", self.program, output.stderr.trim_end());
                }
                if !output.stdout.trim().is_empty() {
                    debug!("{}: {}", self.program, output.stdout.trim_end());
                }
                Ok(())
            }
            Err(e) => {
                error!("{e}");
                Err(e)
            }
        }
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(d) => tokio::time::sleep(d).await,
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_keeps_argument_order() {
        let mut cmd = ExternalCommand::new("docker", false);
        cmd.append_args(["run", "--detach"])
            .append_args(vec![String::from("--name"), String::from("apisix")]);

        assert_eq!(cmd.to_string(), "docker run --detach --name apisix");
    }

    #[tokio::test]
    async fn test_dry_run_does_not_launch() {
        let mut cmd = ExternalCommand::new("/nonexistent/tool", true);
        cmd.append_args(["install", "apisix"]);

        let output = cmd.run(&ExecContext::default()).await.expect("dry run");

        assert_eq!(output, CommandOutput::default());
        assert_eq!(cmd.to_string(), "/nonexistent/tool install apisix");
    }

    #[tokio::test]
    async fn test_launch_failure_names_program() {
        let mut cmd = ExternalCommand::new("/nonexistent/tool", false);
        let err = cmd.run(&ExecContext::default()).await.expect_err("launch");

        assert!(matches!(err, CommandError::Launch { .. }));
        assert!(err.to_string().contains("/nonexistent/tool"));
    }

    #[tokio::test]
    async fn test_cancelled_context_does_not_launch() {
        let token = CancellationToken::new();
        token.cancel();

        let mut cmd = ExternalCommand::new("/nonexistent/tool", false);
        let err = cmd
            .run(&ExecContext::new(token, None))
            .await
            .expect_err("cancelled");
        assert!(matches!(err, CommandError::Cancelled { .. }));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use crate::command::testing::fake_tool;
        use tempfile::TempDir;

        #[tokio::test]
        async fn test_captures_output_and_resets_args() {
            let dir = TempDir::new().expect("tempdir");
            let tool = fake_tool(dir.path(), "tool", "echo \"out:$*\"\necho err >&2\n");

            let mut cmd = ExternalCommand::new(tool.display().to_string(), false);
            cmd.append_args(["a", "b"]);
            let output = cmd.run(&ExecContext::default()).await.expect("run");

            assert_eq!(output.stdout, "out:a b\n");
            assert_eq!(output.stderr, "err\n");
            assert!(cmd.args().is_empty());
        }

        #[tokio::test]
        async fn test_non_zero_exit_carries_stderr() {
            let dir = TempDir::new().expect("tempdir");
            let tool = fake_tool(dir.path(), "tool", "echo boom >&2\nexit 3\n");

            let mut cmd = ExternalCommand::new(tool.display().to_string(), false);
            let err = cmd.run(&ExecContext::default()).await.expect_err("exit 3");

            assert_eq!(err.stderr(), Some("boom\n"));
        }

        #[tokio::test]
        async fn test_timeout_kills_child() {
            let dir = TempDir::new().expect("tempdir");
            let tool = fake_tool(dir.path(), "tool", "sleep 30\n");

            let mut cmd = ExternalCommand::new(tool.display().to_string(), false);
            let ctx = ExecContext::new(CancellationToken::new(), Some(Duration::from_millis(200)));
            let started = std::time::Instant::now();
            let err = cmd.run(&ctx).await.expect_err("timeout");

            assert!(matches!(err, CommandError::TimedOut { .. }));
            assert!(started.elapsed() < Duration::from_secs(10));
        }

        #[tokio::test]
        async fn test_cancellation_kills_child() {
            let dir = TempDir::new().expect("tempdir");
            let tool = fake_tool(dir.path(), "tool", "sleep 30\n");

            let token = CancellationToken::new();
            let canceller = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                canceller.cancel();
            });

            let mut cmd = ExternalCommand::new(tool.display().to_string(), false);
            let err = cmd
                .run(&ExecContext::new(token, None))
                .await
                .expect_err("cancelled");

            assert!(matches!(err, CommandError::Cancelled { .. }));
        }
    }
}
