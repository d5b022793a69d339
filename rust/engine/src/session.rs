// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Render session: strategy selection, both render paths, and the caches
//! that live for as long as the session does.
//!
//! Renders are not serialized here. A caller that starts a new render while
//! one is in flight should discard the older result; its local `blob:` URLs
//! stop resolving as soon as the newer render begins.

use crate::abort::AbortSignal;
use crate::artifact::{PartArtifact, ProgressSink, RenderUpdate};
use crate::assembly::{AssemblyCache, ASSEMBLY_MODE};
use crate::blob::BlobStore;
use crate::capability::CapabilityDetector;
use crate::config::EngineConfig;
use crate::decode::{DecodedGeometry, Geometry, MeshDecoder};
use crate::error::{RenderError, Result};
use crate::local::{CompileJob, LocalEngine};
use crate::remote::RemoteRenderer;
use futures::future::join_all;
use futures::Stream;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use yantra_core::{
    estimate_render_time, ExecutionStrategy, GeometryKey, Manifest, ParamValue, Parameters, Phase,
    ProgressEvent, RenderRequest,
};

pub struct RenderSession {
    config: EngineConfig,
    capability: CapabilityDetector,
    strategy: Mutex<Option<ExecutionStrategy>>,
    remote: RemoteRenderer,
    local: LocalEngine,
    blobs: Arc<BlobStore>,
    decoder: MeshDecoder,
    assembly: AssemblyCache,
}

impl RenderSession {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("yantra-engine/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let blobs = Arc::new(BlobStore::new());

        Ok(Self {
            capability: CapabilityDetector::new(
                client.clone(),
                config.endpoint(&config.health_path),
                config.probe_timeout,
            ),
            strategy: Mutex::new(None),
            remote: RemoteRenderer::new(
                client.clone(),
                config.api_base.clone(),
                config.endpoint(&config.render_stream_path),
                config.endpoint(&config.render_cancel_path),
            ),
            local: LocalEngine::new(
                client.clone(),
                config.scad_source.clone(),
                config.openscad_path.clone(),
            ),
            decoder: MeshDecoder::new(client, &config.api_base, blobs.clone()),
            assembly: AssemblyCache::new(),
            blobs,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Pick the execution strategy on first use and keep it.
    pub async fn resolve_strategy(&self) -> ExecutionStrategy {
        if let Some(strategy) = *self.lock_strategy() {
            return strategy;
        }
        let detected = match self.config.force_strategy {
            Some(forced) => forced,
            None => {
                if self.capability.is_available().await {
                    ExecutionStrategy::Backend
                } else {
                    ExecutionStrategy::Local
                }
            }
        };
        let strategy = *self.lock_strategy().get_or_insert(detected);
        tracing::info!(strategy = %strategy, "Execution strategy resolved");
        strategy
    }

    /// The resolved strategy, `None` while still detecting.
    pub fn strategy(&self) -> Option<ExecutionStrategy> {
        *self.lock_strategy()
    }

    /// Forget the resolved strategy and the local engine state.
    pub async fn reset(&self) {
        self.capability.reset().await;
        *self.lock_strategy() = None;
        self.local.terminate();
    }

    /// Render every part of `request.mode`.
    ///
    /// Both strategies report through `on_progress` and return the same
    /// artifact shape. Firing `abort` stops progress delivery and fails the
    /// call with [`RenderError::Cancelled`].
    pub async fn render_parts<F>(
        &self,
        request: &RenderRequest,
        manifest: &Manifest,
        on_progress: F,
        abort: AbortSignal,
    ) -> Result<Vec<PartArtifact>>
    where
        F: Fn(ProgressEvent) + Send + Sync + 'static,
    {
        let sink = ProgressSink::new(on_progress, abort);
        self.render_with_sink(request, manifest, &sink).await
    }

    /// Like [`render_parts`](Self::render_parts) with a prepared sink.
    pub async fn render_with_sink(
        &self,
        request: &RenderRequest,
        manifest: &Manifest,
        sink: &ProgressSink,
    ) -> Result<Vec<PartArtifact>> {
        let generation = self.blobs.begin_generation();
        self.execute(request, manifest, sink, generation).await
    }

    /// Render as a stream of progress updates ending in the artifact list.
    /// Dropping the stream cancels the render.
    pub fn render_stream(
        self: Arc<Self>,
        request: RenderRequest,
        manifest: Arc<Manifest>,
    ) -> impl Stream<Item = Result<RenderUpdate>> + Send + 'static {
        async_stream::stream! {
            let abort = AbortSignal::new();
            let _abort_on_drop = AbortOnDrop(abort.clone());
            let (tx, mut rx) = mpsc::unbounded_channel();
            let sink = ProgressSink::new(move |event| { let _ = tx.send(event); }, abort);

            let render = self.render_with_sink(&request, &manifest, &sink);
            tokio::pin!(render);

            let result = loop {
                let step = tokio::select! {
                    biased;
                    Some(event) = rx.recv() => Step::Progress(event),
                    result = &mut render => Step::Finished(result),
                };
                match step {
                    Step::Progress(event) => yield Ok(RenderUpdate::Progress(event)),
                    Step::Finished(result) => break result,
                }
            };

            while let Ok(event) = rx.try_recv() {
                yield Ok(RenderUpdate::Progress(event));
            }
            match result {
                Ok(parts) => yield Ok(RenderUpdate::Completed(parts)),
                Err(e) => yield Err(e),
            }
        }
    }

    /// Best-effort cancel of whatever is rendering.
    pub async fn cancel_render(&self) {
        match self.resolve_strategy().await {
            ExecutionStrategy::Backend => self.remote.cancel().await,
            ExecutionStrategy::Local => self.local.cancel(),
        }
    }

    /// Estimated render time in seconds under the resolved strategy.
    pub fn estimate_render_time(&self, mode: &str, params: &Parameters, manifest: &Manifest) -> f64 {
        estimate_render_time(manifest, mode, params, self.strategy())
    }

    /// Decode a mesh artifact on the session's decode worker.
    pub async fn decode(&self, url: &str) -> Result<Arc<Geometry>> {
        self.decoder.decode(url).await
    }

    /// Decoded parts of the assembly mode. Parameter sets that differ only in
    /// non-geometric parameters share one cache entry.
    pub async fn assembly_geometries(
        &self,
        params: &Parameters,
        manifest: &Manifest,
    ) -> Result<Arc<[DecodedGeometry]>> {
        let key = GeometryKey::new(params, manifest.geometry_keys());
        if let Some(hit) = self.assembly.get(&key) {
            tracing::debug!(key = %key, "Assembly cache hit");
            return Ok(hit);
        }

        let mut request = RenderRequest::new(ASSEMBLY_MODE, params.clone());
        if let Some(slug) = manifest.project_slug() {
            request = request.with_project(slug);
        }
        let sink = ProgressSink::noop(AbortSignal::new());
        let artifacts = self
            .execute(&request, manifest, &sink, self.blobs.generation())
            .await?;

        let decoded = join_all(artifacts.iter().map(|artifact| async move {
            self.decoder.decode(&artifact.url).await.map(|geometry| DecodedGeometry {
                kind: artifact.kind.clone(),
                geometry,
            })
        }))
        .await;
        let parts = decoded.into_iter().collect::<Result<Vec<_>>>()?;

        tracing::debug!(key = %key, parts = parts.len(), "Assembly geometry cached");
        Ok(self.assembly.insert(key, parts))
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    pub fn decoder(&self) -> &MeshDecoder {
        &self.decoder
    }

    pub fn local(&self) -> &LocalEngine {
        &self.local
    }

    pub fn assembly_cache(&self) -> &AssemblyCache {
        &self.assembly
    }

    async fn execute(
        &self,
        request: &RenderRequest,
        manifest: &Manifest,
        sink: &ProgressSink,
        generation: u64,
    ) -> Result<Vec<PartArtifact>> {
        let strategy = self.resolve_strategy().await;
        let started = Instant::now();
        tracing::info!(mode = %request.mode, strategy = %strategy, generation, "Render started");

        let result = match strategy {
            ExecutionStrategy::Backend => self.remote.render(request, sink).await,
            ExecutionStrategy::Local => self.render_local(request, manifest, sink, generation).await,
        };

        let aborted = sink.abort_signal().is_aborted();
        let result = match result {
            Err(e) if aborted && !e.is_cancelled() => {
                tracing::debug!(error = %e, "Error after abort reported as cancellation");
                Err(RenderError::Cancelled)
            }
            Ok(parts) if parts.is_empty() => Err(RenderError::Protocol(format!(
                "mode '{}' produced no parts",
                request.mode
            ))),
            other => other,
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(parts) => {
                tracing::info!(mode = %request.mode, parts = parts.len(), elapsed_ms, "Render finished")
            }
            Err(e) if e.is_cancelled() => {
                tracing::info!(mode = %request.mode, elapsed_ms, "Render cancelled")
            }
            Err(e) => {
                tracing::warn!(mode = %request.mode, error = %e, elapsed_ms, "Render failed")
            }
        }
        result
    }

    async fn render_local(
        &self,
        request: &RenderRequest,
        manifest: &Manifest,
        sink: &ProgressSink,
        generation: u64,
    ) -> Result<Vec<PartArtifact>> {
        let abort = sink.abort_signal();
        let epoch = self.local.cancel_epoch();
        let mode = manifest.mode(&request.mode)?;
        let stopped = || abort.is_aborted() || self.local.is_cancelled_since(epoch);

        let sources = tokio::select! {
            biased;
            _ = abort.cancelled() => {
                self.local.terminate();
                return Err(RenderError::Cancelled);
            }
            sources = self.local.init(manifest) => sources?,
        };

        let mut params = request.parameters.clone();
        params.insert("mode".into(), ParamValue::from(request.mode.as_str()));

        let total = mode.parts.len();
        let share = 1.0 / total as f64;
        let mut artifacts = Vec::with_capacity(total);

        for (index, part_id) in mode.parts.iter().enumerate() {
            if stopped() {
                self.local.terminate();
                return Err(RenderError::Cancelled);
            }
            let Some(part) = manifest.part(part_id) else {
                continue;
            };

            let base = (index as f64 * share * 100.0).round();
            sink.emit(ProgressEvent {
                percent: Some(base),
                phase: Some(Phase::Compiling),
                part: Some(part_id.clone()),
                log: Some(format!("[{}] Starting... ({}/{})", part_id, index + 1, total)),
            });

            let job = CompileJob {
                scad_file: &mode.scad_file,
                parameters: &params,
                render_mode: part.render_mode,
            };
            let on_output = |output: crate::local::CompilerOutput| {
                sink.emit(ProgressEvent {
                    percent: Some(base + (share * output.percent.unwrap_or(50.0)).round()),
                    phase: output.phase,
                    part: Some(part_id.clone()),
                    log: Some(output.line),
                });
            };
            let stl = self.local.render_part(&sources, job, on_output, abort).await?;
            if self.local.is_cancelled_since(epoch) {
                return Err(RenderError::Cancelled);
            }

            let url = self.blobs.insert(generation, stl.clone());
            artifacts.push(PartArtifact::local(part_id.clone(), url, stl));

            let done = ((index + 1) as f64 * share * 100.0).round();
            sink.emit(ProgressEvent {
                percent: Some(done),
                phase: Some(Phase::Done),
                part: Some(part_id.clone()),
                log: Some(format!("[{}] Done ({}%)", part_id, done)),
            });
        }

        Ok(artifacts)
    }

    fn lock_strategy(&self) -> std::sync::MutexGuard<'_, Option<ExecutionStrategy>> {
        self.strategy.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

enum Step {
    Progress(ProgressEvent),
    Finished(Result<Vec<PartArtifact>>),
}

struct AbortOnDrop(AbortSignal);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
