//! Captured-output runner for one-shot service tools (`*-manage`, `*-dbsync`).

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use stackinit_shared::errors::{StackError, StackResult};
use tokio::process::Command;

/// Lines of captured output kept in error messages.
const DIAGNOSTIC_LINES: usize = 20;

/// A command to run to completion.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
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

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Program name plus arguments, for logs and errors.
    pub fn display(&self) -> String {
        let program = self
            .program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string());
        std::iter::once(program)
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Run `spec` to completion with stdout and stderr captured.
///
/// A non-zero exit is logged together with the tail of the captured output
/// and returned as [`StackError::Command`].
pub async fn run_command(spec: &CommandSpec) -> StackResult<CommandOutput> {
    let shown = spec.display();
    tracing::debug!(command = %shown, "Running command");

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &spec.current_dir {
        cmd.current_dir(dir);
    }

    let output = cmd.output().await.map_err(|e| StackError::Command {
        command: shown.clone(),
        message: format!("failed to start {}: {}", spec.program.display(), e),
    })?;

    let result = CommandOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    if !result.status.success() {
        let diagnostics = tail(&result.stderr, &result.stdout);
        tracing::error!(
            command = %shown,
            status = %result.status,
            output = %diagnostics,
            "Command failed"
        );
        return Err(StackError::Command {
            command: shown,
            message: format!("{}: {}", result.status, diagnostics),
        });
    }

    Ok(result)
}

fn tail(stderr: &str, stdout: &str) -> String {
    let source = if stderr.trim().is_empty() { stdout } else { stderr };
    let lines: Vec<&str> = source.lines().collect();
    let start = lines.len().saturating_sub(DIAGNOSTIC_LINES);
    lines[start..].join("\n")
}

/// Prefer the virtualenv's copy of `program`, falling back to `PATH` lookup.
pub fn resolve_program(venv_dir: &Path, program: &str) -> PathBuf {
    let candidate = venv_dir.join("bin").join(program);
    if candidate.is_file() {
        candidate
    } else {
        PathBuf::from(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_run_command_captures_stdout() {
        let spec = CommandSpec::new("sh").args(["-c", "echo hello"]);
        let output = run_command(&spec).await.unwrap();
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_failure_carries_stderr() {
        let spec = CommandSpec::new("sh").args(["-c", "echo broken >&2; exit 3"]);
        let err = run_command(&spec).await.unwrap_err();
        match err {
            StackError::Command { command, message } => {
                assert_eq!(command, "sh -c echo broken >&2; exit 3");
                assert!(message.contains("broken"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_command_error() {
        let spec = CommandSpec::new("/nonexistent/stackinit-tool");
        assert!(matches!(
            run_command(&spec).await,
            Err(StackError::Command { .. })
        ));
    }

    #[test]
    fn test_resolve_program_prefers_venv() {
        let dir = TempDir::new().unwrap();
        let bin = dir.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join("glance-manage"), "").unwrap();

        assert_eq!(
            resolve_program(dir.path(), "glance-manage"),
            bin.join("glance-manage")
        );
        assert_eq!(
            resolve_program(dir.path(), "cinder-manage"),
            PathBuf::from("cinder-manage")
        );
    }

    #[test]
    fn test_tail_keeps_last_lines() {
        let long: String = (0..30).map(|i| format!("line{}\n", i)).collect();
        let tailed = tail("", &long);
        assert!(tailed.starts_with("line10"));
        assert!(tailed.ends_with("line29"));
    }
}
