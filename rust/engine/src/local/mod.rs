// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Local compilation engine: OpenSCAD subprocesses in private directories.
//!
//! Initialization fetches the SCAD sources named by the manifest's modes and
//! proves the compiler starts. It runs once; concurrent callers wait for the
//! same attempt. Cancellation or a crashed compiler clears it so the next
//! render starts clean.
//!
//! [`LocalEngine::cancel`] also advances a cancel epoch. A render captures
//! the epoch when it starts and gives up as soon as it moves, so a cancel
//! issued during initialization or between parts still stops the render.

pub mod instance;
pub mod sources;

use crate::abort::AbortSignal;
use crate::config::ScadSource;
use crate::error::{RenderError, Result};
use bytes::Bytes;
use instance::InstancePool;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use yantra_core::{Manifest, Parameters, Phase};

pub use instance::{CompilerOutput, OUTPUT_FILE};
pub use sources::SourceCache;

/// What to compile for one part.
#[derive(Debug, Clone, Copy)]
pub struct CompileJob<'a> {
    pub scad_file: &'a str,
    pub parameters: &'a Parameters,
    pub render_mode: i64,
}

/// Command line for one part: entry file, `-D` overrides, the part
/// selector, manifold backend and output path.
pub fn compiler_args(job: &CompileJob<'_>) -> Vec<String> {
    let mut args = Vec::with_capacity(job.parameters.len() * 2 + 6);
    args.push(job.scad_file.to_string());
    for (key, value) in job.parameters {
        args.push("-D".into());
        args.push(format!("{}={}", key, value.to_scad_literal()));
    }
    args.push("-D".into());
    args.push(format!("render_mode={}", job.render_mode));
    args.push("--enable=manifold".into());
    args.push("-o".into());
    args.push(OUTPUT_FILE.into());
    args
}

#[derive(Debug)]
pub struct LocalEngine {
    client: reqwest::Client,
    source: ScadSource,
    pool: Option<InstancePool>,
    init_gate: tokio::sync::Mutex<()>,
    sources: Mutex<Option<Arc<SourceCache>>>,
    cancel_epoch: AtomicU64,
}

impl LocalEngine {
    pub fn new(client: reqwest::Client, source: ScadSource, binary: Option<PathBuf>) -> Self {
        Self {
            client,
            source,
            pool: binary.map(InstancePool::new),
            init_gate: tokio::sync::Mutex::new(()),
            sources: Mutex::new(None),
            cancel_epoch: AtomicU64::new(0),
        }
    }

    /// Whether a compiler binary is configured at all.
    pub fn has_compiler(&self) -> bool {
        self.pool.is_some()
    }

    pub fn is_initialized(&self) -> bool {
        self.lock_sources().is_some()
    }

    /// Load sources for every mode of `manifest` and verify the compiler.
    ///
    /// A memoized result is reused as long as it covers the manifest's files.
    pub async fn init(&self, manifest: &Manifest) -> Result<Arc<SourceCache>> {
        let pool = self.pool()?;
        let names = manifest.scad_files();

        if let Some(ready) = self.ready_for(&names) {
            return Ok(ready);
        }
        let _gate = self.init_gate.lock().await;
        if let Some(ready) = self.ready_for(&names) {
            return Ok(ready);
        }

        let started = std::time::Instant::now();
        let sources = SourceCache::load(&self.client, &self.source, &names).await?;
        let version = {
            let probe = pool.checkout(&sources, &AbortSignal::new()).await?;
            probe.verify().await?
        };

        let sources = Arc::new(sources);
        *self.lock_sources() = Some(sources.clone());
        tracing::info!(
            files = sources.len(),
            compiler = %version,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Local engine initialized"
        );
        Ok(sources)
    }

    /// Compile one part in a fresh instance and return the STL bytes.
    pub async fn render_part<F>(
        &self,
        sources: &SourceCache,
        job: CompileJob<'_>,
        mut on_output: F,
        abort: &AbortSignal,
    ) -> Result<Bytes>
    where
        F: FnMut(CompilerOutput),
    {
        let pool = self.pool()?;
        if !sources.contains(job.scad_file) {
            return Err(RenderError::Init(format!("{} was not loaded", job.scad_file)));
        }

        let mut teardown = Teardown {
            engine: self,
            armed: true,
        };
        let instance = pool.checkout(sources, abort).await?;

        on_output(CompilerOutput {
            percent: Some(10.0),
            phase: Some(Phase::Compiling),
            line: "Starting OpenSCAD...".into(),
        });

        let args = compiler_args(&job);
        tracing::debug!(file = %job.scad_file, render_mode = job.render_mode, ?args, "Invoking compiler");
        let result = instance.run(&args, on_output, abort).await;

        if matches!(
            result,
            Ok(_) | Err(RenderError::Compiler { exit_code: Some(_), .. })
        ) {
            teardown.armed = false;
        }
        result.map(Bytes::from)
    }

    /// Current cancel epoch. Compare with [`is_cancelled_since`](Self::is_cancelled_since).
    pub fn cancel_epoch(&self) -> u64 {
        self.cancel_epoch.load(Ordering::SeqCst)
    }

    /// Whether [`cancel`](Self::cancel) was called after `epoch` was read.
    pub fn is_cancelled_since(&self, epoch: u64) -> bool {
        self.cancel_epoch() != epoch
    }

    /// Stop every render in flight, including ones still initializing or
    /// between parts, then tear the engine down.
    pub fn cancel(&self) {
        let epoch = self.cancel_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(epoch, "Local render cancelled");
        self.terminate();
    }

    /// Kill the running instance and forget initialization.
    pub fn terminate(&self) {
        let pool_killed = self.pool.as_ref().map(|p| p.kill_active()).unwrap_or(false);
        let had_sources = self.lock_sources().take().is_some();
        if pool_killed || had_sources {
            tracing::debug!(pool_killed, had_sources, "Local engine terminated");
        }
    }

    fn ready_for(&self, names: &[&str]) -> Option<Arc<SourceCache>> {
        self.lock_sources()
            .as_ref()
            .filter(|cached| cached.covers(names.iter().copied()))
            .cloned()
    }

    fn pool(&self) -> Result<&InstancePool> {
        self.pool.as_ref().ok_or_else(|| {
            RenderError::Init("OpenSCAD binary not found; set OPENSCAD_PATH".into())
        })
    }

    fn lock_sources(&self) -> std::sync::MutexGuard<'_, Option<Arc<SourceCache>>> {
        self.sources.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Tears the engine down if a render does not finish cleanly, including
/// when its future is dropped mid-run.
struct Teardown<'a> {
    engine: &'a LocalEngine,
    armed: bool,
}

impl Drop for Teardown<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.engine.terminate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_follow_compiler_conventions() {
        let mut params = Parameters::new();
        params.insert("width_units".into(), 2.into());
        params.insert("lip".into(), false.into());
        params.insert("label".into(), "A1".into());
        params.insert("mode".into(), "cup".into());

        let args = compiler_args(&CompileJob {
            scad_file: "cup.scad",
            parameters: &params,
            render_mode: 3,
        });
        assert_eq!(
            args,
            vec![
                "cup.scad",
                "-D",
                "label=\"A1\"",
                "-D",
                "lip=false",
                "-D",
                "mode=\"cup\"",
                "-D",
                "width_units=2",
                "-D",
                "render_mode=3",
                "--enable=manifold",
                "-o",
                "output.stl",
            ]
        );
    }

    #[tokio::test]
    async fn missing_binary_is_an_init_error() {
        let engine = LocalEngine::new(
            reqwest::Client::new(),
            ScadSource::Directory(std::env::temp_dir()),
            None,
        );
        assert!(!engine.has_compiler());
        let manifest = Manifest::from_json(
            r#"{"modes":[{"id":"cup","scad_file":"cup.scad","parts":["main"]}],"parts":[{"id":"main"}]}"#,
        )
        .unwrap();
        assert!(matches!(engine.init(&manifest).await, Err(RenderError::Init(_))));
        assert!(!engine.is_initialized());
    }

    #[test]
    fn cancel_advances_the_epoch() {
        let engine = LocalEngine::new(
            reqwest::Client::new(),
            ScadSource::Directory(std::env::temp_dir()),
            None,
        );
        let epoch = engine.cancel_epoch();
        assert!(!engine.is_cancelled_since(epoch));

        engine.terminate();
        assert!(!engine.is_cancelled_since(epoch));

        engine.cancel();
        assert!(engine.is_cancelled_since(epoch));
        assert!(!engine.is_cancelled_since(engine.cancel_epoch()));
    }
}
