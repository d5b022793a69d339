// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Compiler instances and their pool.
//!
//! OpenSCAD keeps global state between invocations of its entry point, so an
//! instance is never reused: the pool holds one slot, every checkout gets a
//! fresh private directory, and the instance is destroyed on return.

use crate::abort::AbortSignal;
use crate::error::{RenderError, Result};
use crate::local::sources::SourceCache;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

const STDERR_TAIL_LINES: usize = 20;
const VERIFY_TIMEOUT: Duration = Duration::from_secs(30);
pub const OUTPUT_FILE: &str = "output.stl";

/// Pool of exactly one compiler slot, recycled after every use.
#[derive(Debug)]
pub struct InstancePool {
    binary: PathBuf,
    slot: Arc<Semaphore>,
    active: Mutex<Option<AbortSignal>>,
}

impl InstancePool {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            slot: Arc::new(Semaphore::new(1)),
            active: Mutex::new(None),
        }
    }

    /// Wait for the slot and build a fresh instance populated with `sources`.
    pub async fn checkout(&self, sources: &SourceCache, abort: &AbortSignal) -> Result<CompilerInstance> {
        let permit = tokio::select! {
            biased;
            _ = abort.cancelled() => return Err(RenderError::Cancelled),
            permit = self.slot.clone().acquire_owned() => permit
                .map_err(|_| RenderError::Init("compiler pool closed".into()))?,
        };

        let instance = CompilerInstance::create(&self.binary, sources, permit).await?;
        *self.lock_active() = Some(instance.kill.clone());
        Ok(instance)
    }

    /// Kill whatever instance is running. Returns whether one was.
    pub fn kill_active(&self) -> bool {
        match self.lock_active().take() {
            Some(kill) => {
                kill.abort();
                true
            }
            None => false,
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<AbortSignal>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Line-level compiler output handed to the caller while a job runs.
#[derive(Debug, Clone, PartialEq)]
pub struct CompilerOutput {
    pub percent: Option<f64>,
    pub phase: Option<yantra_core::Phase>,
    pub line: String,
}

/// One sandboxed compiler: a private directory holding the sources.
/// Dropping it deletes the directory and frees the pool slot.
#[derive(Debug)]
pub struct CompilerInstance {
    dir: TempDir,
    binary: PathBuf,
    kill: AbortSignal,
    _permit: OwnedSemaphorePermit,
}

impl CompilerInstance {
    async fn create(binary: &Path, sources: &SourceCache, permit: OwnedSemaphorePermit) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("yantra-scad-").tempdir()?;
        sources.write_into(dir.path()).await?;
        Ok(Self {
            dir,
            binary: binary.to_path_buf(),
            kill: AbortSignal::new(),
            _permit: permit,
        })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Run `--version` to confirm the binary starts.
    pub async fn verify(&self) -> Result<String> {
        let output = tokio::time::timeout(
            VERIFY_TIMEOUT,
            Command::new(&self.binary)
                .arg("--version")
                .current_dir(self.dir())
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| RenderError::Init("compiler did not start in time".into()))?
        .map_err(|e| RenderError::Init(format!("failed to start {}: {}", self.binary.display(), e)))?;

        if !output.status.success() {
            return Err(RenderError::Init(format!(
                "{} --version exited with {}",
                self.binary.display(),
                output.status
            )));
        }
        // OpenSCAD prints its version on stderr
        let text = if output.stderr.is_empty() { output.stdout } else { output.stderr };
        Ok(String::from_utf8_lossy(&text).trim().to_string())
    }

    /// Invoke the compiler with `args` and read back the output file.
    ///
    /// Every stderr line with a phase or worth logging goes to `on_output`.
    pub async fn run<F>(self, args: &[String], mut on_output: F, abort: &AbortSignal) -> Result<Vec<u8>>
    where
        F: FnMut(CompilerOutput),
    {
        let mut child = Command::new(&self.binary)
            .args(args)
            .current_dir(self.dir())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RenderError::Init(format!("failed to start {}: {}", self.binary.display(), e)))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RenderError::Init("compiler stderr unavailable".into()))?;

        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
        let run = async {
            let mut lines = BufReader::new(stderr).lines();
            while let Some(line) = lines.next_line().await? {
                let phase = yantra_core::detect_phase(&line);
                if phase.is_some() || yantra_core::is_log_worthy(&line) {
                    on_output(CompilerOutput {
                        percent: None,
                        phase,
                        line: line.clone(),
                    });
                }
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            child.wait().await
        };

        let outcome: Option<std::io::Result<ExitStatus>> = tokio::select! {
            biased;
            _ = abort.cancelled() => None,
            _ = self.kill.cancelled() => None,
            status = run => Some(status),
        };

        let status = match outcome {
            Some(status) => status?,
            None => {
                let _ = child.kill().await;
                return Err(RenderError::Cancelled);
            }
        };

        if !status.success() {
            return Err(RenderError::Compiler {
                exit_code: status.code(),
                stderr_tail: tail.into_iter().collect::<Vec<_>>().join("\n"),
            });
        }

        tokio::fs::read(self.dir().join(OUTPUT_FILE))
            .await
            .map_err(|e| RenderError::Compiler {
                exit_code: Some(0),
                stderr_tail: format!("no output produced: {}", e),
            })
    }
}
