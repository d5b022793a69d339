// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Render-time estimation from manifest cost constants.

use crate::manifest::{Manifest, ModeConfig};
use crate::params::Parameters;
use crate::strategy::ExecutionStrategy;

/// Local slow-down applied when the manifest does not declare one.
pub const DEFAULT_LOCAL_MULTIPLIER: f64 = 3.0;

/// Work units for a mode: the product of its formula variables (missing or
/// zero values count as 1), else its fixed `base_units`, else 1.
pub fn estimate_units(mode: &ModeConfig, params: &Parameters) -> f64 {
    let Some(estimate) = &mode.estimate else {
        return 1.0;
    };

    if let Some(vars) = &estimate.formula_vars {
        return vars
            .iter()
            .map(|var| {
                params
                    .get(var)
                    .and_then(|v| v.as_f64())
                    .filter(|v| *v != 0.0 && v.is_finite())
                    .unwrap_or(1.0)
            })
            .product();
    }

    estimate
        .base_units
        .as_ref()
        .and_then(|v| v.as_f64())
        .unwrap_or(1.0)
}

/// Estimated render time in seconds.
///
/// `base_time + units * per_unit + part_count * per_part`, multiplied by the
/// manifest's local penalty when renders run locally. Returns 0 when the
/// manifest has no constants or the mode is unknown.
pub fn estimate_render_time(
    manifest: &Manifest,
    mode: &str,
    params: &Parameters,
    strategy: Option<ExecutionStrategy>,
) -> f64 {
    let Some(constants) = &manifest.estimate_constants else {
        return 0.0;
    };
    let Ok(mode_config) = manifest.mode(mode) else {
        return 0.0;
    };

    let units = estimate_units(mode_config, params);
    let part_count = mode_config.parts.len() as f64;
    let estimate = constants.base_time + units * constants.per_unit + part_count * constants.per_part;

    match strategy {
        Some(ExecutionStrategy::Local) => {
            estimate * constants.local_multiplier.unwrap_or(DEFAULT_LOCAL_MULTIPLIER)
        }
        _ => estimate,
    }
}
