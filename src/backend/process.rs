//! Subprocess execution seam used by the local backend.
//!
//! [`LocalBackend`](super::LocalBackend) never touches `tokio::process`
//! directly; it hands an [`Invocation`] to a [`ProcessRunner`]. Tests plug in
//! a scripted runner, and platforms without process support simply never
//! select the local backend.

use std::fmt;
use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Program and arguments for one engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Everything a finished engine run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

pub type ProcessFuture<'a> = Pin<Box<dyn Future<Output = io::Result<ProcessOutput>> + Send + 'a>>;

/// Runs an engine to completion.
pub trait ProcessRunner: Send + Sync {
    /// Spawn `invocation` in `cwd`, write `input` to its stdin, close stdin,
    /// and collect stdout, stderr and the exit code.
    ///
    /// A spawn failure is returned as the `io::Error` from the OS.
    fn run<'a>(
        &'a self,
        invocation: &'a Invocation,
        input: &'a [u8],
        cwd: Option<&'a Path>,
    ) -> ProcessFuture<'a>;
}

/// [`ProcessRunner`] backed by `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioProcessRunner;

impl ProcessRunner for TokioProcessRunner {
    fn run<'a>(
        &'a self,
        invocation: &'a Invocation,
        input: &'a [u8],
        cwd: Option<&'a Path>,
    ) -> ProcessFuture<'a> {
        Box::pin(async move {
            let mut command = Command::new(&invocation.program);
            command
                .args(&invocation.args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                // A timed-out render drops this future; take the engine with it.
                .kill_on_drop(true);
            if let Some(dir) = cwd.filter(|d| d.is_dir()) {
                command.current_dir(dir);
            }

            let mut child = command.spawn()?;
            let stdin = child.stdin.take();

            // Feed stdin while draining stdout/stderr so a large diagram
            // cannot fill both pipes and stall.
            let feed = async move {
                if let Some(mut stdin) = stdin {
                    match stdin.write_all(input).await {
                        Ok(()) => {}
                        // The engine may exit before reading everything.
                        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
                        Err(e) => return Err(e),
                    }
                    // Dropping stdin closes the pipe and signals end of input.
                }
                Ok(())
            };
            let (fed, output) = tokio::join!(feed, child.wait_with_output());
            let output = output?;
            fed?;

            Ok(ProcessOutput {
                code: output.status.code(),
                stdout: output.stdout,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_display() {
        let invocation = Invocation {
            program: "java".into(),
            args: vec!["-jar".into(), "/opt/plantuml.jar".into(), "-pipe".into()],
        };
        assert_eq!(invocation.to_string(), "java -jar /opt/plantuml.jar -pipe");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tokio_runner_pipes_stdin_to_stdout() {
        let invocation = Invocation {
            program: "cat".into(),
            args: Vec::new(),
        };
        let output = TokioProcessRunner
            .run(&invocation, b"Alice -> Bob: hello", None)
            .await
            .unwrap();
        assert_eq!(output.code, Some(0));
        assert_eq!(output.stdout, b"Alice -> Bob: hello");
        assert!(output.stderr.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tokio_runner_reports_exit_code_and_stderr() {
        let invocation = Invocation {
            program: "sh".into(),
            args: vec!["-c".into(), "cat >/dev/null; echo 'syntax error' >&2; exit 1".into()],
        };
        let output = TokioProcessRunner
            .run(&invocation, b"@startuml\n???", None)
            .await
            .unwrap();
        assert_eq!(output.code, Some(1));
        assert!(output.stdout.is_empty());
        assert_eq!(output.stderr.trim(), "syntax error");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tokio_runner_uses_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let invocation = Invocation {
            program: "pwd".into(),
            args: Vec::new(),
        };
        let output = TokioProcessRunner
            .run(&invocation, b"", Some(dir.path()))
            .await
            .unwrap();
        let printed = String::from_utf8(output.stdout).unwrap();
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(
            std::path::Path::new(printed.trim()).canonicalize().unwrap(),
            expected
        );
    }

    #[tokio::test]
    async fn test_tokio_runner_missing_program() {
        let invocation = Invocation {
            program: "puml-render-definitely-missing-engine".into(),
            args: Vec::new(),
        };
        let err = TokioProcessRunner
            .run(&invocation, b"", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
