// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Render progress: phases, the compiler log classifier, and sparse progress
//! events.
//!
//! Both execution strategies feed compiler output through [`detect_phase`] and
//! [`is_log_worthy`], so progress looks the same whichever one ran.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse compiler stage inferred from log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Compiling,
    Cgal,
    Geometry,
    Rendering,
    /// Emitted by the orchestrator when a part has finished.
    Done,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Compiling => "compiling",
            Phase::Cgal => "cgal",
            Phase::Geometry => "geometry",
            Phase::Rendering => "rendering",
            Phase::Done => "done",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map one raw compiler log line to a phase. First match wins.
pub fn detect_phase(line: &str) -> Option<Phase> {
    if line.contains("Compiling") {
        Some(Phase::Compiling)
    } else if line.contains("CGAL") {
        Some(Phase::Cgal)
    } else if line.contains("Rendering") || line.contains("Geometries") {
        Some(Phase::Rendering)
    } else if line.contains("Parsing") {
        Some(Phase::Geometry)
    } else {
        None
    }
}

const LOG_WORTHY_MARKERS: &[&str] = &[
    "Compiling",
    "Parsing",
    "CGAL",
    "Geometries",
    "Rendering",
    "Total",
    "Simple:",
];

/// Whether a compiler line carries enough signal to show the user.
pub fn is_log_worthy(line: &str) -> bool {
    LOG_WORTHY_MARKERS.iter().any(|marker| line.contains(marker))
}

/// A sparse, additive progress update. Consumers merge the fields that are
/// present into their running state; no field is guaranteed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
}

impl ProgressEvent {
    pub fn percent(percent: f64) -> Self {
        Self {
            percent: Some(percent),
            ..Default::default()
        }
    }

    pub fn phase(phase: Phase) -> Self {
        Self {
            phase: Some(phase),
            ..Default::default()
        }
    }

    pub fn log(line: impl Into<String>) -> Self {
        Self {
            log: Some(line.into()),
            ..Default::default()
        }
    }

    pub fn with_part(mut self, part: impl Into<String>) -> Self {
        self.part = Some(part.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.percent.is_none() && self.phase.is_none() && self.part.is_none() && self.log.is_none()
    }
}

/// Running progress state assembled from a sequence of events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressState {
    pub percent: f64,
    pub phase: Option<Phase>,
    pub part: Option<String>,
    pub log: Vec<String>,
}

impl ProgressState {
    pub fn apply(&mut self, event: &ProgressEvent) {
        if let Some(percent) = event.percent {
            self.percent = percent;
        }
        if let Some(phase) = event.phase {
            self.phase = Some(phase);
        }
        if let Some(part) = &event.part {
            self.part = Some(part.clone());
        }
        if let Some(line) = &event.log {
            self.log.push(line.clone());
        }
    }
}
