//! Subprocess invocation for go toolchain queries.
//!
//! Stdout and stderr are drained on reader threads while the caller waits,
//! so a child writing more than the pipe buffer cannot deadlock us. With a
//! deadline the wait goes through `wait_timeout`; on expiry the child is
//! killed and reaped.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::debug;
use wait_timeout::ChildExt;

use crate::core::error::{AnalyzerError, Result};

/// Captured output of a finished command.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// A command line plus where and how to run it.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dir: None,
            env: Vec::new(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn dir(mut self, dir: Option<&Path>) -> Self {
        self.dir = dir.map(Path::to_path_buf);
        self
    }

    pub fn envs(mut self, env: &[(String, String)]) -> Self {
        self.env.extend(env.iter().cloned());
        self
    }

    /// The command line as a user would type it.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion, or until `timeout` elapses.
    pub fn run(&self, timeout: Option<Duration>) -> Result<CommandOutput> {
        debug!(command = %self.display(), dir = ?self.dir, "running command");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| AnalyzerError::CommandFailed {
            command: self.display(),
            message: e.to_string(),
        })?;

        let stdout_thread = child.stdout.take().map(drain);
        let stderr_thread = child.stderr.take().map(drain);

        let status = match timeout {
            Some(limit) => child.wait_timeout(limit),
            None => child.wait().map(Some),
        }
        .map_err(|e| AnalyzerError::CommandFailed {
            command: self.display(),
            message: format!("failed to wait: {}", e),
        })?;

        let Some(status) = status else {
            let _ = child.kill();
            let _ = child.wait();
            // Pipes close once the child is gone, so the readers finish.
            join(stdout_thread);
            join(stderr_thread);
            return Err(AnalyzerError::CommandTimeout {
                command: self.display(),
                timeout_secs: timeout.map(|t| t.as_secs()).unwrap_or_default(),
            });
        };

        Ok(CommandOutput {
            status,
            stdout: join(stdout_thread),
            stderr: join(stderr_thread),
        })
    }

    /// Run and require a zero exit status; returns stdout.
    pub fn run_checked(&self, timeout: Option<Duration>) -> Result<Vec<u8>> {
        let output = self.run(timeout)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AnalyzerError::CommandFailed {
                command: self.display(),
                message: format!("{}: {}", output.status, stderr.trim()),
            });
        }
        Ok(output.stdout)
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = reader.read_to_end(&mut buffer);
        buffer
    })
}

fn join(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}
