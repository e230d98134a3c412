//! Running external commands.

use std::{io, process::Stdio, sync::Arc};

use async_trait::async_trait;
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("empty command provided")]
    Empty,
    #[error("io error: {0:?}")]
    Io(#[from] io::Error),
    #[error("non-zero exit status: {}", .0.stderr.trim())]
    NonZero(Output),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl From<std::process::Output> for Output {
    fn from(value: std::process::Output) -> Self {
        Self {
            success: value.status.success(),
            stdout: String::from_utf8_lossy(&value.stdout).to_string(),
            stderr: String::from_utf8_lossy(&value.stderr).to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Runs external programs. Swapped out in tests to avoid touching the host.
#[async_trait]
pub trait Runner: Send + Sync + 'static {
    async fn run(&self, program: &str, args: &[String]) -> Result<Output>;

    /// Runs the command provided as a string, separating args with whitespace.
    async fn by_str(&self, cmd: &str) -> Result<Output> {
        let mut iter = cmd.split_ascii_whitespace();
        let program = iter.next().ok_or(Error::Empty)?;
        let args: Vec<String> = iter.map(String::from).collect();

        self.run(program, &args).await
    }
}

#[async_trait]
impl<R: Runner + ?Sized> Runner for Arc<R> {
    async fn run(&self, program: &str, args: &[String]) -> Result<Output> {
        (**self).run(program, args).await
    }
}

/// Runs commands on the host with [`tokio::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl Runner for SystemRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<Output> {
        let mut cmd = Command::new(program);
        cmd.args(args).stdin(Stdio::null()).stderr(Stdio::piped()).stdout(Stdio::piped()).kill_on_drop(true);

        tracing::debug!(?cmd, "running command");

        let output: Output = cmd.output().await?.into();

        if !output.success {
            tracing::debug!(?output.stderr, ?cmd, "command returned non-zero status");
            return Err(Error::NonZero(output));
        }

        Ok(output)
    }
}
