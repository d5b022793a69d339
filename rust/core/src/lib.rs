// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Yantra4D Core
//!
//! Shared data model for the parametric render pipeline. Everything here is
//! pure: no network, no processes, no global state.
//!
//! ## Overview
//!
//! - **Manifest**: render modes, parts, parameter definitions and estimate
//!   constants as declared by a project
//! - **Requests**: a mode plus an opaque parameter set
//! - **Progress**: the compiler log classifier and sparse progress events
//!   shared by the remote and local execution strategies
//! - **Estimation**: render-time estimates from manifest cost constants
//! - **Cache keys**: stable keys over geometry-affecting parameters
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use yantra_core::{detect_phase, Manifest, Parameters, Phase, RenderRequest};
//!
//! let manifest = Manifest::from_path("projects/gridfinity/project.json")?;
//! let mut params = Parameters::new();
//! params.insert("width_units".into(), 2.into());
//! let request = RenderRequest::new("cup", params);
//!
//! assert_eq!(detect_phase("Compiling primitives..."), Some(Phase::Compiling));
//! ```

pub mod cache_key;
pub mod error;
pub mod estimate;
pub mod manifest;
pub mod params;
pub mod progress;
pub mod strategy;

pub use cache_key::GeometryKey;
pub use error::{Error, Result};
pub use estimate::{estimate_render_time, estimate_units, DEFAULT_LOCAL_MULTIPLIER};
pub use manifest::{
    EstimateConstants, Manifest, MaterialDef, ModeConfig, ModeEstimate, ParameterDef, PartDef,
    ProjectInfo,
};
pub use params::{ParamValue, Parameters, RenderRequest};
pub use progress::{detect_phase, is_log_worthy, Phase, ProgressEvent, ProgressState};
pub use strategy::ExecutionStrategy;
