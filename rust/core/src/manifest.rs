// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Project manifest: render modes, parts, parameters and estimate constants.
//!
//! The manifest is owned by the project, not by the render pipeline. Only the
//! fields the pipeline consumes are modelled; everything else in the JSON is
//! ignored.

use crate::error::{Error, Result};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Parameter type whose values never change geometry.
pub const NON_GEOMETRIC_PARAMETER_TYPE: &str = "checkbox";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub project: Option<ProjectInfo>,
    pub modes: Vec<ModeConfig>,
    pub parts: Vec<PartDef>,
    #[serde(default)]
    pub parameters: Vec<ParameterDef>,
    #[serde(default)]
    pub estimate_constants: Option<EstimateConstants>,
    #[serde(default)]
    pub materials: Vec<MaterialDef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub slug: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// A render mode: which SCAD entry file to compile and which parts it yields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeConfig {
    pub id: String,
    pub scad_file: String,
    pub parts: Vec<String>,
    #[serde(default)]
    pub estimate: Option<ModeEstimate>,
}

/// Per-mode estimate formula.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModeEstimate {
    /// Parameters whose values are multiplied to form the unit count.
    #[serde(default)]
    pub formula_vars: Option<Vec<String>>,
    /// Fixed unit count, used when no formula is given. Non-numeric values
    /// fall back to 1.
    #[serde(default)]
    pub base_units: Option<Value>,
}

/// A named output of a mode, selected in the SCAD source via `render_mode`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartDef {
    pub id: String,
    #[serde(default)]
    pub render_mode: i64,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDef {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl ParameterDef {
    pub fn affects_geometry(&self) -> bool {
        self.kind != NON_GEOMETRIC_PARAMETER_TYPE
    }
}

/// Cost constants for render-time estimation, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateConstants {
    pub base_time: f64,
    pub per_unit: f64,
    pub per_part: f64,
    /// Slow-down factor applied when renders run on the local compiler.
    #[serde(rename = "wasm_multiplier", default)]
    pub local_multiplier: Option<f64>,
}

/// Printing material declared by the project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialDef {
    pub id: String,
    pub name: String,
    /// g/cm³
    pub density: f64,
    #[serde(default)]
    pub print_speed_factor: Option<f64>,
    pub cost_per_kg: f64,
}

impl Manifest {
    pub fn from_json(json: &str) -> Result<Self> {
        let manifest: Manifest = serde_json::from_str(json)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Every part referenced by a mode must be declared.
    fn validate(&self) -> Result<()> {
        if self.modes.is_empty() {
            return Err(Error::InvalidManifest("no render modes declared".into()));
        }
        for mode in &self.modes {
            for part in &mode.parts {
                if self.part(part).is_none() {
                    return Err(Error::UnknownPart {
                        mode: mode.id.clone(),
                        part: part.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn mode(&self, id: &str) -> Result<&ModeConfig> {
        self.modes
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| Error::UnknownMode(id.to_string()))
    }

    pub fn part(&self, id: &str) -> Option<&PartDef> {
        self.parts.iter().find(|p| p.id == id)
    }

    /// SCAD entry files referenced by any mode, deduplicated, in first-seen order.
    pub fn scad_files(&self) -> Vec<&str> {
        let mut seen = FxHashSet::default();
        self.modes
            .iter()
            .map(|m| m.scad_file.as_str())
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// Ids of parameters that influence geometry.
    pub fn geometry_keys(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .filter(|p| p.affects_geometry())
            .map(|p| p.id.as_str())
            .collect()
    }

    pub fn project_slug(&self) -> Option<&str> {
        self.project.as_ref().map(|p| p.slug.as_str())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
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
}
