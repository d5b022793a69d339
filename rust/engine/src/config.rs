// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Engine configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;
use yantra_core::ExecutionStrategy;

/// Where the local engine reads SCAD sources from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScadSource {
    /// Base URL; each file is fetched as `<base><file>`.
    Http(String),
    /// Directory on disk.
    Directory(PathBuf),
}

impl ScadSource {
    /// Values starting with `http://` or `https://` are URLs, anything else a path.
    pub fn parse(value: &str) -> Self {
        if value.starts_with("http://") || value.starts_with("https://") {
            let mut base = value.to_string();
            if !base.ends_with('/') {
                base.push('/');
            }
            ScadSource::Http(base)
        } else {
            ScadSource::Directory(PathBuf::from(value))
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL of the remote render service.
    pub api_base: String,
    /// Health probe path.
    pub health_path: String,
    /// Render stream path (SSE).
    pub render_stream_path: String,
    /// Cancel path.
    pub render_cancel_path: String,
    /// Timeout for the capability probe.
    pub probe_timeout: Duration,
    /// Local OpenSCAD binary, if one was found.
    pub openscad_path: Option<PathBuf>,
    /// SCAD source location for local renders.
    pub scad_source: ScadSource,
    /// Pin the execution strategy and skip the probe.
    pub force_strategy: Option<ExecutionStrategy>,
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let api_base = std::env::var("YANTRA_API_BASE")
            .unwrap_or_else(|_| "http://localhost:5000".into())
            .trim_end_matches('/')
            .to_string();

        Self {
            health_path: std::env::var("YANTRA_HEALTH_PATH")
                .unwrap_or_else(|_| "/api/health".into()),
            render_stream_path: "/api/render-stream".into(),
            render_cancel_path: "/api/render-cancel".into(),
            probe_timeout: Duration::from_millis(
                std::env::var("YANTRA_PROBE_TIMEOUT_MS")
                    .unwrap_or_else(|_| "2000".into())
                    .parse()
                    .unwrap_or(2000),
            ),
            openscad_path: std::env::var("OPENSCAD_PATH")
                .map(PathBuf::from)
                .ok()
                .or_else(|| which::which("openscad").ok()),
            scad_source: std::env::var("YANTRA_SCAD_SOURCE")
                .map(|v| ScadSource::parse(&v))
                .unwrap_or_else(|_| ScadSource::Http(format!("{}/scad/", api_base))),
            force_strategy: std::env::var("YANTRA_STRATEGY")
                .ok()
                .and_then(|v| v.parse().ok()),
            api_base,
        }
    }

    /// Configuration pointing at `api_base`, with nothing read from the
    /// environment.
    pub fn new(api_base: impl Into<String>) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        Self {
            health_path: "/api/health".into(),
            render_stream_path: "/api/render-stream".into(),
            render_cancel_path: "/api/render-cancel".into(),
            probe_timeout: Duration::from_secs(2),
            openscad_path: None,
            scad_source: ScadSource::Http(format!("{}/scad/", api_base)),
            force_strategy: None,
            api_base,
        }
    }

    pub fn with_openscad(mut self, path: impl Into<PathBuf>) -> Self {
        self.openscad_path = Some(path.into());
        self
    }

    pub fn with_scad_source(mut self, source: ScadSource) -> Self {
        self.scad_source = source;
        self
    }

    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.force_strategy = Some(strategy);
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scad_source_detects_urls() {
        assert_eq!(
            ScadSource::parse("https://cdn.example.com/scad"),
            ScadSource::Http("https://cdn.example.com/scad/".into())
        );
        assert_eq!(
            ScadSource::parse("./projects/gridfinity"),
            ScadSource::Directory(PathBuf::from("./projects/gridfinity"))
        );
    }

    #[test]
    fn endpoints_join_without_double_slash() {
        let config = EngineConfig::new("http://render.local:5000/");
        assert_eq!(config.endpoint(&config.health_path), "http://render.local:5000/api/health");
        assert_eq!(
            config.scad_source,
            ScadSource::Http("http://render.local:5000/scad/".into())
        );
    }
}
