// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Print-time and filament estimates from part volume and extent.
//!
//! This is a slicer-free heuristic: roughly 30% of the part volume is shell,
//! the rest is filled at the requested infill ratio, and print time is
//! travel distance over nozzle speed plus 10% overhead.

use crate::analysis::Dimensions;
use std::f64::consts::PI;
use yantra_core::MaterialDef;

const FILAMENT_DIAMETER_MM: f64 = 1.75;
const SHELL_FRACTION: f64 = 0.3;
const DEFAULT_INFILL: f64 = 0.20;
const OVERHEAD_FACTOR: f64 = 1.1;
const BASE_SPEED_MM_S: f64 = 50.0;

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialProfile {
    pub name: String,
    /// g/cm³
    pub density: f64,
    /// mm/s
    pub speed: f64,
    /// mm
    pub layer_height: f64,
    pub cost_per_kg: f64,
    /// mm
    pub nozzle_diameter: f64,
}

impl MaterialProfile {
    fn builtin(name: &str, density: f64, speed: f64, cost_per_kg: f64) -> Self {
        Self {
            name: name.to_string(),
            density,
            speed,
            layer_height: 0.2,
            cost_per_kg,
            nozzle_diameter: 0.4,
        }
    }

    fn from_manifest(def: &MaterialDef) -> Self {
        Self {
            name: def.name.clone(),
            density: def.density,
            speed: BASE_SPEED_MM_S * def.print_speed_factor.unwrap_or(1.0),
            layer_height: 0.2,
            cost_per_kg: def.cost_per_kg,
            nozzle_diameter: 0.4,
        }
    }
}

/// Built-in material profiles merged with project-declared ones.
#[derive(Debug, Clone)]
pub struct MaterialCatalog {
    /// Lookup order; first id match wins
    entries: Vec<(String, MaterialProfile)>,
}

impl Default for MaterialCatalog {
    fn default() -> Self {
        Self {
            entries: vec![
                ("pla".into(), MaterialProfile::builtin("PLA", 1.24, 50.0, 20.0)),
                ("petg".into(), MaterialProfile::builtin("PETG", 1.27, 40.0, 22.0)),
                ("abs".into(), MaterialProfile::builtin("ABS", 1.04, 45.0, 18.0)),
                ("tpu".into(), MaterialProfile::builtin("TPU", 1.21, 25.0, 35.0)),
            ],
        }
    }
}

impl MaterialCatalog {
    /// Catalog with manifest materials taking priority over built-ins.
    pub fn with_manifest(materials: &[MaterialDef]) -> Self {
        let mut catalog = Self::default();
        for def in materials {
            catalog.entries.retain(|(id, _)| id != &def.id);
        }
        let custom = materials
            .iter()
            .map(|def| (def.id.clone(), MaterialProfile::from_manifest(def)));
        catalog.entries.splice(0..0, custom);
        catalog
    }

    pub fn get(&self, id: &str) -> Option<&MaterialProfile> {
        self.entries.iter().find(|(key, _)| key == id).map(|(_, p)| p)
    }

    /// Unknown ids fall back to PLA.
    pub fn resolve(&self, id: &str) -> &MaterialProfile {
        self.get(id)
            .or_else(|| self.get("pla"))
            .unwrap_or_else(|| &self.entries[0].1)
    }

    /// `(id, display name)` pairs, custom materials first
    pub fn list(&self) -> Vec<(&str, &str)> {
        self.entries
            .iter()
            .map(|(id, p)| (id.as_str(), p.name.as_str()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PrintOverrides {
    pub layer_height: Option<f64>,
    /// 0..=1
    pub infill: Option<f64>,
    pub speed: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrintEstimate {
    pub hours: u64,
    pub minutes: u64,
    pub grams: f64,
    pub meters: f64,
    pub cost: f64,
    pub material: String,
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

pub fn estimate_print(
    volume_mm3: f64,
    dims: &Dimensions,
    material: &MaterialProfile,
    overrides: &PrintOverrides,
) -> PrintEstimate {
    let layer_height = overrides.layer_height.unwrap_or(material.layer_height);
    let infill = overrides.infill.unwrap_or(DEFAULT_INFILL);
    let speed = overrides.speed.unwrap_or(material.speed);

    let printed_volume =
        volume_mm3 * SHELL_FRACTION + volume_mm3 * (1.0 - SHELL_FRACTION) * infill;

    let grams = printed_volume / 1000.0 * material.density;
    let cross_section = PI * (FILAMENT_DIAMETER_MM / 2.0).powi(2);
    let meters = printed_volume / cross_section / 1000.0;
    let cost = grams / 1000.0 * material.cost_per_kg;

    let layers = dims.height / layer_height;
    let perimeter_per_layer = 2.0 * (dims.width + dims.depth);
    let infill_travel_per_layer =
        dims.width * dims.depth * infill / material.nozzle_diameter * 0.5;
    let total_travel_mm = (perimeter_per_layer + infill_travel_per_layer) * layers;
    let total_seconds = total_travel_mm / speed * OVERHEAD_FACTOR;

    PrintEstimate {
        hours: (total_seconds / 3600.0).floor() as u64,
        minutes: ((total_seconds % 3600.0) / 60.0).round() as u64,
        grams: round_to(grams, 1),
        meters: round_to(meters, 2),
        cost: round_to(cost, 2),
        material: material.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cube_dims() -> Dimensions {
        Dimensions {
            width: 20.0,
            depth: 20.0,
            height: 20.0,
        }
    }

    #[test]
    fn test_pla_cube_estimate() {
        let catalog = MaterialCatalog::default();
        let estimate = estimate_print(
            8000.0,
            &cube_dims(),
            catalog.resolve("pla"),
            &PrintOverrides::default(),
        );

        // printed volume = 2400 + 5600 * 0.2 = 3520 mm³
        assert_relative_eq!(estimate.grams, 4.4);
        assert_relative_eq!(estimate.cost, 0.09);
        assert_relative_eq!(estimate.meters, 1.46);
        assert_eq!(estimate.material, "PLA");
        // 100 layers * (80 + 100) mm / 50 mm/s * 1.1 = 396 s
        assert_eq!(estimate.hours, 0);
        assert_eq!(estimate.minutes, 7);
    }

    #[test]
    fn test_unknown_material_falls_back_to_pla() {
        let catalog = MaterialCatalog::default();
        assert_eq!(catalog.resolve("unobtainium").name, "PLA");
    }

    #[test]
    fn test_manifest_materials_override_builtins() {
        let defs = vec![MaterialDef {
            id: "pla".into(),
            name: "House PLA".into(),
            density: 1.25,
            print_speed_factor: Some(1.2),
            cost_per_kg: 15.0,
        }];
        let catalog = MaterialCatalog::with_manifest(&defs);
        let pla = catalog.resolve("pla");
        assert_eq!(pla.name, "House PLA");
        assert_relative_eq!(pla.speed, 60.0);
        assert_eq!(catalog.list()[0], ("pla", "House PLA"));
        assert_eq!(catalog.list().len(), 4);
    }
}
