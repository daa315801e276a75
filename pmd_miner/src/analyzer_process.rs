//! Launches the Analyzer as a sibling process when `--analyzer-cmd` is
//! given, instead of `--analyzer-url` pointing at one already running.
//!
//! A much smaller relative of the teacher's own `process::run_command_capture_with_timeout`:
//! the Analyzer is a long-lived service rather than a one-shot command, so
//! there is no timeout to wait out here, only a port to read off its first
//! line of stdout and a child to kill on drop.

use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};

use crate::error::AnalyzerError;

pub struct AnalyzerProcess {
    child: Child,
    port: u16,
}

impl AnalyzerProcess {
    /// Spawns `command_line` via the shell, and reads its first line of
    /// stdout as the listening port. The teacher's own subprocess code
    /// shells out the same way for commands supplied as a single string
    /// rather than a pre-split argv.
    pub fn spawn(command_line: &str) -> Result<Self, AnalyzerError> {
        let mut command = shell_command(command_line);
        command.stdout(Stdio::piped()).stderr(Stdio::null());
        let mut child = command
            .spawn()
            .map_err(|source| AnalyzerError::Transport(format!("failed to launch analyzer: {source}")))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            AnalyzerError::Transport("analyzer process has no stdout".to_string())
        })?;
        let mut reader = BufReader::new(stdout);
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .map_err(|source| AnalyzerError::Transport(format!("failed to read analyzer port: {source}")))?;
        let port: u16 = line.trim().parse().map_err(|_| {
            AnalyzerError::Transport(format!("analyzer did not print a port on startup: {line:?}"))
        })?;

        Ok(Self { child, port })
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

impl Drop for AnalyzerProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[cfg(unix)]
fn shell_command(command_line: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(command_line);
    command
}

#[cfg(windows)]
fn shell_command(command_line: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(command_line);
    command
}
