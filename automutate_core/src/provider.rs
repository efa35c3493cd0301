use crate::mutation::MutationsWave;
use anyhow::{Context, anyhow, bail};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// A `MutationsProvider` produces successive waves of file mutations.
///
/// The run loop calls [`provide`](MutationsProvider::provide) once per
/// iteration and never before the previous wave has been fully applied. A wave
/// without file mutations signals that the source has nothing more to offer.
#[async_trait]
pub trait MutationsProvider: Send + Sync {
    async fn provide(&self) -> Result<MutationsWave, anyhow::Error>;
}

/// Replays a fixed sequence of waves, then returns empty waves forever.
#[derive(Debug, Default)]
pub struct QueuedMutationsProvider {
    waves: Mutex<VecDeque<MutationsWave>>,
}

impl QueuedMutationsProvider {
    pub fn new(waves: impl IntoIterator<Item = MutationsWave>) -> Self {
        Self {
            waves: Mutex::new(waves.into_iter().collect()),
        }
    }

    /// Parses a JSON array of waves, e.g. `[{"fileMutations": {...}}, {}]`.
    pub fn from_json_str(json: &str) -> Result<Self, anyhow::Error> {
        let waves: Vec<MutationsWave> =
            serde_json::from_str(json).context("Failed to parse mutations waves JSON")?;
        Ok(Self::new(waves))
    }

    pub fn from_json_file(path: &Path) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read waves file at {:?}: {}", path, e))?;
        Self::from_json_str(&content)
            .with_context(|| format!("Invalid waves file {}", path.display()))
    }

    pub fn remaining(&self) -> usize {
        self.waves
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl MutationsProvider for QueuedMutationsProvider {
    async fn provide(&self) -> Result<MutationsWave, anyhow::Error> {
        let next = self
            .waves
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        Ok(next.unwrap_or_default())
    }
}

/// How to run the external command behind a [`CommandMutationsProvider`].
#[derive(Debug, Clone)]
pub struct CommandProviderConfig {
    /// Program followed by its arguments.
    pub command: Vec<String>,
    pub timeout: Duration,
    pub working_dir: Option<PathBuf>,
}

/// Runs an external command once per wave and parses its stdout as a
/// [`MutationsWave`] JSON document.
///
/// Empty output is read as a wave without file mutations. A non-zero exit,
/// a timeout or malformed output fails the provider.
#[derive(Debug, Clone)]
pub struct CommandMutationsProvider {
    config: CommandProviderConfig,
}

impl CommandMutationsProvider {
    pub fn new(config: CommandProviderConfig) -> Self {
        Self { config }
    }
}

fn describe_exit(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exited with code {code}");
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("terminated by signal {signal}");
        }
    }
    "exited abnormally".to_string()
}

#[async_trait]
impl MutationsProvider for CommandMutationsProvider {
    async fn provide(&self) -> Result<MutationsWave, anyhow::Error> {
        let Some((program, args)) = self.config.command.split_first() else {
            bail!("Command provider has no command configured");
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.config.working_dir {
            cmd.current_dir(cwd);
        }

        debug!(command = ?self.config.command, "Requesting mutations wave");
        let child = cmd
            .spawn()
            .map_err(|e| anyhow!("Failed to spawn command '{:?}': {}", self.config.command, e))?;

        let output = match tokio::time::timeout(self.config.timeout, child.wait_with_output()).await
        {
            Ok(result) => result.context("Error waiting for command")?,
            Err(_) => bail!(
                "Command '{:?}' timed out after {:?}",
                self.config.command,
                self.config.timeout
            ),
        };

        if !output.status.success() {
            bail!(
                "Command '{:?}' {}: {}",
                self.config.command,
                describe_exit(output.status),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let stdout = String::from_utf8(output.stdout).context("Command output is not UTF-8")?;
        if stdout.trim().is_empty() {
            return Ok(MutationsWave::empty());
        }
        serde_json::from_str(&stdout).context("Command output is not a valid mutations wave")
    }
}
