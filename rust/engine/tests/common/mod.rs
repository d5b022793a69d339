// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use yantra_core::{Manifest, ProgressEvent};

pub const GRIDFINITY: &str = r#"{
    "project": { "slug": "gridfinity", "name": "Gridfinity" },
    "modes": [
        { "id": "cup", "scad_file": "cup.scad", "parts": ["main"],
          "estimate": { "formula_vars": ["width_units", "depth_units"] } },
        { "id": "lid", "scad_file": "lid.scad", "parts": ["lid", "handle"],
          "estimate": { "base_units": 4 } },
        { "id": "assembly", "scad_file": "cup.scad", "parts": ["bottom", "top"] }
    ],
    "parts": [
        { "id": "main", "render_mode": 0 },
        { "id": "lid", "render_mode": 1 },
        { "id": "handle", "render_mode": 2 },
        { "id": "bottom", "render_mode": 3 },
        { "id": "top", "render_mode": 4 }
    ],
    "parameters": [
        { "id": "width_units", "type": "slider" },
        { "id": "depth_units", "type": "slider" },
        { "id": "show_labels", "type": "checkbox" }
    ],
    "estimate_constants": { "base_time": 5, "per_unit": 1.5, "per_part": 2, "wasm_multiplier": 4 }
}"#;

pub fn manifest() -> Manifest {
    Manifest::from_json(GRIDFINITY).unwrap()
}

pub type Recorded = Arc<Mutex<Vec<ProgressEvent>>>;

/// Progress callback that records every event it receives.
pub fn recorder() -> (impl Fn(ProgressEvent) + Send + Sync + 'static, Recorded) {
    let seen: Recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let seen = seen.clone();
        move |event: ProgressEvent| seen.lock().unwrap().push(event)
    };
    (sink, seen)
}

pub fn logs(seen: &Recorded) -> Vec<String> {
    seen.lock()
        .unwrap()
        .iter()
        .filter_map(|e| e.log.clone())
        .collect()
}

/// A binary STL holding a single triangle.
pub fn triangle_stl() -> Vec<u8> {
    let mesh = yantra_geometry::MeshBuffers::new(
        vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        None,
    );
    yantra_geometry::encode_binary_stl(&mesh, "fixture")
}

/// Join `data:` frames into an SSE body.
pub fn sse_body(frames: &[&str]) -> String {
    frames.iter().map(|f| format!("data: {}\n\n", f)).collect()
}

/// Directory holding the SCAD entry files named by [`GRIDFINITY`].
pub fn scad_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("cup.scad"), "cube([42 * width_units, 42, 7]);").unwrap();
    std::fs::write(dir.path().join("lid.scad"), "cube([42, 42, 2]);").unwrap();
    dir
}

/// How the fake compiler behaves after logging its first lines.
#[derive(Debug, Clone, Copy)]
pub enum FakeCompiler {
    Succeeds,
    Fails,
    Hangs,
    BrokenInstall,
}

/// Write a shell script standing in for `openscad`. Every render appends its
/// arguments, one per line followed by `--`, to the returned log file. Every
/// `--version` call appends a line to `version.log` next to the script.
#[cfg(unix)]
pub fn fake_openscad(dir: &Path, behaviour: FakeCompiler) -> (PathBuf, PathBuf) {
    use std::os::unix::fs::PermissionsExt;

    let script = dir.join("openscad");
    let args_log = dir.join("args.log");
    let version_log = dir.join("version.log");

    let version = match behaviour {
        FakeCompiler::BrokenInstall => "echo 'error while loading shared libraries' >&2; exit 127",
        _ => "echo 'OpenSCAD version 2021.01' >&2; exit 0",
    };
    let after_compile = match behaviour {
        FakeCompiler::Fails => "echo 'ERROR: Parser error in file cup.scad, line 3' >&2; exit 1",
        FakeCompiler::Hangs => "sleep 30",
        _ => ":",
    };

    let body = format!(
        r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "version" >> "{version_log}"
  {version}
fi
printf '%s\n' "$@" >> "{log}"
echo "--" >> "{log}"
echo "Parsing design (AST generation)..." >&2
echo "ECHO: noise" >&2
echo "Compiling design (CSG Tree generation)..." >&2
{after_compile}
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; fi
  shift
done
cat > "$out" <<'STL'
solid fake
facet normal 0 0 1
outer loop
vertex 0 0 0
vertex 1 0 0
vertex 0 1 0
endloop
endfacet
endsolid fake
STL
echo "Rendering Polygon Mesh using Manifold..." >&2
echo "Total rendering time: 0:00:00.010" >&2
exit 0
"#,
        version = version,
        after_compile = after_compile,
        log = args_log.display(),
        version_log = version_log.display(),
    );

    std::fs::write(&script, body).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    (script, args_log)
}

/// Argument lists of every compiler run recorded so far.
pub fn recorded_runs(args_log: &Path) -> Vec<Vec<String>> {
    let text = std::fs::read_to_string(args_log).unwrap_or_default();
    text.split("--\n")
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| chunk.lines().map(str::to_string).collect())
        .collect()
}

/// Number of `--version` calls made against the fake compiler in `dir`.
pub fn recorded_version_checks(dir: &Path) -> usize {
    std::fs::read_to_string(dir.join("version.log"))
        .map(|text| text.lines().count())
        .unwrap_or(0)
}
