// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parameter values and render requests.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;

/// A single user-facing parameter value.
///
/// Values are opaque to the render pipeline; only the compiler interprets
/// them. Numbers keep their JSON representation so `2` stays `2` and is not
/// widened to `2.0` on the compiler command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(Number),
    Text(String),
}

impl ParamValue {
    /// Numeric view used by estimate formulas.
    ///
    /// Booleans count as 0/1 and numeric strings are parsed; anything else
    /// yields `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            ParamValue::Number(n) => n.as_f64(),
            ParamValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Render as an OpenSCAD literal for a `-D key=value` definition.
    pub fn to_scad_literal(&self) -> String {
        match self {
            ParamValue::Bool(true) => "true".to_string(),
            ParamValue::Bool(false) => "false".to_string(),
            ParamValue::Number(n) => n.to_string(),
            ParamValue::Text(s) => {
                let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{}\"", escaped)
            }
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ParamValue::Bool(b) => Value::Bool(*b),
            ParamValue::Number(n) => Value::Number(n.clone()),
            ParamValue::Text(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Number(n) => write!(f, "{}", n),
            ParamValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Number(Number::from(value))
    }
}

impl From<f64> for ParamValue {
    /// Non-finite floats have no JSON form and collapse to `0`.
    fn from(value: f64) -> Self {
        ParamValue::Number(Number::from_f64(value).unwrap_or_else(|| Number::from(0)))
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

/// Parameter set keyed by parameter id. Ordered so command lines and cache
/// keys are deterministic.
pub type Parameters = BTreeMap<String, ParamValue>;

/// One render invocation: a mode plus the parameters to compile it with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    pub mode: String,
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

impl RenderRequest {
    pub fn new(mode: impl Into<String>, parameters: Parameters) -> Self {
        Self {
            mode: mode.into(),
            parameters,
            project: None,
        }
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Wire body for the remote render endpoints: the parameters flattened
    /// into one object with `mode` (and `project`, when set) alongside.
    /// `mode` wins over a parameter that happens to share its name.
    pub fn to_payload(&self) -> Value {
        let mut body = Map::new();
        for (key, value) in &self.parameters {
            body.insert(key.clone(), value.to_json());
        }
        body.insert("mode".to_string(), Value::String(self.mode.clone()));
        if let Some(project) = &self.project {
            body.insert("project".to_string(), Value::String(project.clone()));
        }
        Value::Object(body)
    }
}
