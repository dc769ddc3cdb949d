//! Narrow interface to the external sync program.
//!
//! The runner only needs to start the program, read its output line by line,
//! wait for the exit code and terminate it. Keeping that behind traits lets the
//! runner be tested without spawning real processes.

use super::environment::SyncEnvironment;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Exit code reported when the program was killed by a signal.
pub const SIGNALED_EXIT_CODE: i32 = -1;

/// A started sync program.
#[async_trait]
pub trait SyncProcess: Send {
    /// Next line of combined stdout/stderr, `None` once both streams are closed.
    async fn next_line(&mut self) -> Option<String>;

    /// Wait for the program to exit and return its exit code.
    async fn wait(&mut self) -> Result<i32>;

    /// Kill the program and reap it.
    async fn terminate(&mut self) -> Result<()>;
}

/// Knows how to start the sync program.
#[async_trait]
pub trait SyncLauncher: Send + Sync {
    /// Human readable name of the entry point, used in diagnostics.
    fn entry_point(&self) -> String;

    fn entry_point_exists(&self) -> bool;

    async fn spawn(&self, env: &SyncEnvironment) -> Result<Box<dyn SyncProcess>>;
}

/// Launches the sync program as `<interpreter> <entry_point>` inside `working_dir`.
pub struct CommandLauncher {
    working_dir: PathBuf,
    interpreter: String,
    entry_point: String,
}

impl CommandLauncher {
    pub fn new(
        working_dir: impl Into<PathBuf>,
        interpreter: impl Into<String>,
        entry_point: impl Into<String>,
    ) -> Self {
        Self {
            working_dir: working_dir.into(),
            interpreter: interpreter.into(),
            entry_point: entry_point.into(),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}

#[async_trait]
impl SyncLauncher for CommandLauncher {
    fn entry_point(&self) -> String {
        self.entry_point.clone()
    }

    fn entry_point_exists(&self) -> bool {
        self.working_dir.join(&self.entry_point).is_file()
    }

    async fn spawn(&self, env: &SyncEnvironment) -> Result<Box<dyn SyncProcess>> {
        // One pipe behind both stdout and stderr, so lines arrive in the
        // order the program wrote them.
        let (output_reader, output_writer) =
            std::io::pipe().context("Failed to create output pipe")?;
        let stderr_writer = output_writer
            .try_clone()
            .context("Failed to duplicate output pipe")?;

        let mut command = Command::new(&self.interpreter);
        command
            .arg(&self.entry_point)
            .current_dir(&self.working_dir)
            .envs(env.iter())
            // Without this a Python child block-buffers its piped stdout and the
            // live log only fills up when the run ends.
            .env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::from(output_writer))
            .stderr(Stdio::from(stderr_writer))
            .kill_on_drop(true);

        let spawned = command.spawn();
        // Close our copies of the write end, otherwise the reader never sees EOF.
        drop(command);
        let child = spawned.with_context(|| {
            format!(
                "Failed to start {} {} in {:?}",
                self.interpreter, self.entry_point, self.working_dir
            )
        })?;

        debug!("Spawned sync program with pid {:?}", child.id());

        let (line_tx, line_rx) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("sync-output".to_string())
            .spawn(move || forward_lines(output_reader, line_tx))
            .context("Failed to start output reader")?;

        Ok(Box::new(ChildProcess {
            child,
            lines: line_rx,
        }))
    }
}

/// Blocking line pump, runs on its own thread until the pipe closes or the
/// receiving side is gone.
fn forward_lines<R: Read>(stream: R, tx: mpsc::UnboundedSender<String>) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Error reading sync program output: {}", e);
                break;
            }
        }
    }
}

struct ChildProcess {
    child: Child,
    lines: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl SyncProcess for ChildProcess {
    async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    async fn wait(&mut self) -> Result<i32> {
        let status = self
            .child
            .wait()
            .await
            .context("Failed to wait for sync program")?;
        Ok(status.code().unwrap_or(SIGNALED_EXIT_CODE))
    }

    async fn terminate(&mut self) -> Result<()> {
        if let Err(e) = self.child.start_kill() {
            // Already exited; still reap below.
            debug!("Kill request not delivered: {}", e);
        }
        self.child
            .wait()
            .await
            .context("Failed to reap terminated sync program")?;
        // Stops the reader thread at its next line.
        self.lines.close();
        Ok(())
    }
}
