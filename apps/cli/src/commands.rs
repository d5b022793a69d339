// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::args::{parameters, EngineArgs, EstimateArgs, RenderArgs};
use anyhow::{bail, Context, Result};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use yantra_core::{estimate_render_time, Manifest, ProgressState, RenderRequest};
use yantra_engine::{RenderSession, RenderUpdate};
use yantra_geometry::{
    encode_binary_stl, estimate_print, measure, MaterialCatalog, MeshBuffers, PrintOverrides,
};

fn load_manifest(path: &Path) -> Result<Manifest> {
    Manifest::from_path(path).with_context(|| format!("failed to load manifest {}", path.display()))
}

pub async fn render(args: RenderArgs) -> Result<()> {
    let manifest = Arc::new(load_manifest(&args.manifest)?);
    let params = parameters(&args.params);
    let mut request = RenderRequest::new(args.mode.as_str(), params.clone());
    if let Some(slug) = manifest.project_slug() {
        request = request.with_project(slug);
    }

    let session = Arc::new(RenderSession::new(args.engine.config())?);
    let strategy = session.resolve_strategy().await;
    tracing::info!(
        mode = %args.mode,
        strategy = %strategy,
        estimate_s = session.estimate_render_time(&args.mode, &params, &manifest),
        "Rendering"
    );

    let updates = session.clone().render_stream(request, manifest.clone());
    tokio::pin!(updates);
    let mut state = ProgressState::default();

    let parts = loop {
        let update = tokio::select! {
            update = updates.next() => update,
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Interrupted, cancelling render");
                session.cancel_render().await;
                bail!("render cancelled");
            }
        };
        match update {
            Some(Ok(RenderUpdate::Progress(event))) => {
                state.apply(&event);
                if let Some(line) = &event.log {
                    tracing::info!(
                        percent = state.percent,
                        phase = state.phase.map(|p| p.as_str()).unwrap_or("-"),
                        "{}",
                        line.trim()
                    );
                }
            }
            Some(Ok(RenderUpdate::Completed(parts))) => break parts,
            Some(Err(e)) => return Err(e).context("render failed"),
            None => bail!("render ended without producing parts"),
        }
    };

    tokio::fs::create_dir_all(&args.out)
        .await
        .with_context(|| format!("failed to create {}", args.out.display()))?;

    let catalog = MaterialCatalog::with_manifest(&manifest.materials);
    let overrides = PrintOverrides {
        layer_height: args.layer_height,
        infill: args.infill,
        speed: None,
    };

    for part in &parts {
        let geometry = session
            .decode(&part.url)
            .await
            .with_context(|| format!("failed to decode part '{}'", part.kind))?;
        let path = write_part(&args.out, &part.kind, &geometry.mesh)?;
        println!(
            "{}\t{}\t{} triangles",
            part.kind,
            path.display(),
            geometry.mesh.triangle_count()
        );

        if args.analyze {
            let metrics = measure(&geometry.mesh)
                .with_context(|| format!("failed to measure part '{}'", part.kind))?;
            let print = estimate_print(
                metrics.volume_mm3,
                &metrics.dimensions,
                catalog.resolve(&args.material),
                &overrides,
            );
            println!(
                "  {:.1} x {:.1} x {:.1} mm, {:.1} cm3, {}h {}m, {:.1} g, {:.2} m, {:.2} ({})",
                metrics.dimensions.width,
                metrics.dimensions.depth,
                metrics.dimensions.height,
                metrics.volume_mm3 / 1000.0,
                print.hours,
                print.minutes,
                print.grams,
                print.meters,
                print.cost,
                print.material,
            );
        }
    }
    Ok(())
}

/// Write `mesh` as binary STL to `<dir>/<kind>.stl`.
pub fn write_part(dir: &Path, kind: &str, mesh: &MeshBuffers) -> Result<PathBuf> {
    let name: String = kind
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let path = dir.join(format!("{}.stl", name));
    std::fs::write(&path, encode_binary_stl(mesh, kind))
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

pub fn estimate(args: EstimateArgs) -> Result<()> {
    let manifest = load_manifest(&args.manifest)?;
    manifest.mode(&args.mode)?;
    let seconds = estimate_render_time(&manifest, &args.mode, &parameters(&args.params), args.strategy);
    println!("{:.0}", seconds);
    Ok(())
}

pub async fn probe(args: EngineArgs) -> Result<()> {
    let session = RenderSession::new(args.config())?;
    let strategy = session.resolve_strategy().await;
    let config = session.config();
    println!("{}", serde_json::json!({
        "strategy": strategy,
        "api_base": config.api_base,
        "openscad": config.openscad_path,
        "local_compiler": session.local().has_compiler(),
    }));
    Ok(())
}

pub fn materials(manifest: Option<PathBuf>) -> Result<()> {
    let catalog = match manifest {
        Some(path) => MaterialCatalog::with_manifest(&load_manifest(&path)?.materials),
        None => MaterialCatalog::default(),
    };
    for (id, name) in catalog.list() {
        println!("{}\t{}", id, name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use yantra_geometry::decode_stl;

    #[test]
    fn parts_are_written_as_binary_stl() {
        let dir = tempfile::tempdir().unwrap();
        let mesh = MeshBuffers::new(vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0], None);

        let path = write_part(dir.path(), "lid/top", &mesh).unwrap();
        assert_eq!(path, dir.path().join("lid_top.stl"));

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 84 + 50);
        assert_eq!(decode_stl(&bytes).unwrap().triangle_count(), 1);
    }
}
