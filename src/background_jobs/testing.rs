//! In-process stand-ins for the sync program.

use super::environment::SyncEnvironment;
use super::process::{SyncLauncher, SyncProcess};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct FakeLauncher {
    pub entry_point_exists: bool,
    pub fail_spawn: bool,
    pub lines: Vec<String>,
    pub exit_code: i32,
    /// Keep the process alive after its output until it is terminated.
    pub hang: bool,
    pub spawn_count: Arc<AtomicUsize>,
    pub terminated: Arc<AtomicBool>,
    pub last_env: Arc<Mutex<Option<SyncEnvironment>>>,
}

impl FakeLauncher {
    pub fn exiting_with(exit_code: i32, lines: &[&str]) -> Self {
        Self {
            entry_point_exists: true,
            fail_spawn: false,
            lines: lines.iter().map(|l| l.to_string()).collect(),
            exit_code,
            hang: false,
            spawn_count: Arc::new(AtomicUsize::new(0)),
            terminated: Arc::new(AtomicBool::new(false)),
            last_env: Arc::new(Mutex::new(None)),
        }
    }

    pub fn hanging(lines: &[&str]) -> Self {
        Self {
            hang: true,
            ..Self::exiting_with(0, lines)
        }
    }

    pub fn spawns(&self) -> usize {
        self.spawn_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SyncLauncher for FakeLauncher {
    fn entry_point(&self) -> String {
        "index.py".to_string()
    }

    fn entry_point_exists(&self) -> bool {
        self.entry_point_exists
    }

    async fn spawn(&self, env: &SyncEnvironment) -> Result<Box<dyn SyncProcess>> {
        if self.fail_spawn {
            bail!("No such file or directory (os error 2)");
        }
        self.spawn_count.fetch_add(1, Ordering::SeqCst);
        *self.last_env.lock().unwrap() = Some(env.clone());
        Ok(Box::new(FakeProcess {
            lines: self.lines.iter().cloned().collect(),
            exit_code: self.exit_code,
            hang: self.hang,
            terminated: Arc::clone(&self.terminated),
        }))
    }
}

struct FakeProcess {
    lines: VecDeque<String>,
    exit_code: i32,
    hang: bool,
    terminated: Arc<AtomicBool>,
}

#[async_trait]
impl SyncProcess for FakeProcess {
    async fn next_line(&mut self) -> Option<String> {
        match self.lines.pop_front() {
            Some(line) => Some(line),
            None if self.hang => std::future::pending().await,
            None => None,
        }
    }

    async fn wait(&mut self) -> Result<i32> {
        Ok(self.exit_code)
    }

    async fn terminate(&mut self) -> Result<()> {
        self.terminated.store(true, Ordering::SeqCst);
        Ok(())
    }
}
