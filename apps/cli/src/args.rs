// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command line arguments.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use yantra_core::{ExecutionStrategy, ParamValue, Parameters};
use yantra_engine::{EngineConfig, ScadSource};

#[derive(Debug, Parser)]
#[command(name = "yantra-render", version, about = "Render Yantra4D projects from the command line")]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "YANTRA_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Render every part of a mode and write the meshes to disk
    Render(RenderArgs),
    /// Print the estimated render time of a mode
    Estimate(EstimateArgs),
    /// Detect which execution strategy would be used
    Probe(EngineArgs),
    /// List print materials, including those declared by a manifest
    Materials {
        /// Project manifest
        manifest: Option<PathBuf>,
    },
}

/// Engine overrides layered over the environment.
#[derive(Debug, Clone, Default, Args)]
pub struct EngineArgs {
    /// Base URL of the render service
    #[arg(long)]
    pub api_base: Option<String>,

    /// OpenSCAD binary for local renders
    #[arg(long, env = "OPENSCAD_PATH")]
    pub openscad: Option<PathBuf>,

    /// SCAD sources: an http(s) base URL or a directory
    #[arg(long)]
    pub scad_source: Option<String>,

    /// Skip detection and use `backend` or `local`
    #[arg(long, value_parser = parse_strategy)]
    pub strategy: Option<ExecutionStrategy>,
}

impl EngineArgs {
    pub fn config(&self) -> EngineConfig {
        let env = EngineConfig::from_env();
        let mut config = match &self.api_base {
            Some(base) => EngineConfig {
                openscad_path: env.openscad_path,
                force_strategy: env.force_strategy,
                probe_timeout: env.probe_timeout,
                ..EngineConfig::new(base.as_str())
            },
            None => env,
        };
        if let Some(path) = &self.openscad {
            config = config.with_openscad(path);
        }
        if let Some(source) = &self.scad_source {
            config = config.with_scad_source(ScadSource::parse(source));
        }
        if let Some(strategy) = self.strategy {
            config = config.with_strategy(strategy);
        }
        config
    }
}

#[derive(Debug, Args)]
pub struct RenderArgs {
    /// Project manifest (JSON)
    pub manifest: PathBuf,

    /// Mode to render
    #[arg(short, long)]
    pub mode: String,

    /// Parameter override, repeatable
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, ParamValue)>,

    /// Directory the meshes are written to
    #[arg(short, long, default_value = ".")]
    pub out: PathBuf,

    /// Measure each part and estimate printing it
    #[arg(long)]
    pub analyze: bool,

    /// Material used by `--analyze`
    #[arg(long, default_value = "pla")]
    pub material: String,

    /// Infill fraction used by `--analyze`
    #[arg(long)]
    pub infill: Option<f64>,

    /// Layer height in mm used by `--analyze`
    #[arg(long)]
    pub layer_height: Option<f64>,

    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Debug, Args)]
pub struct EstimateArgs {
    /// Project manifest (JSON)
    pub manifest: PathBuf,

    #[arg(short, long)]
    pub mode: String,

    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, ParamValue)>,

    /// Apply the local slow-down
    #[arg(long, value_parser = parse_strategy)]
    pub strategy: Option<ExecutionStrategy>,
}

pub fn parameters(pairs: &[(String, ParamValue)]) -> Parameters {
    pairs.iter().cloned().collect()
}

/// `key=value`, where the value is read as a boolean, an integer, a
/// float, or else a string.
pub fn parse_param(raw: &str) -> Result<(String, ParamValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing parameter name in '{}'", raw));
    }

    let value = match value {
        "true" => ParamValue::from(true),
        "false" => ParamValue::from(false),
        v => match (v.parse::<i64>(), v.parse::<f64>()) {
            (Ok(int), _) => ParamValue::from(int),
            (_, Ok(float)) if float.is_finite() => ParamValue::from(float),
            _ => ParamValue::from(v),
        },
    };
    Ok((key.to_string(), value))
}

fn parse_strategy(raw: &str) -> Result<ExecutionStrategy, String> {
    raw.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_are_typed() {
        assert_eq!(parse_param("width_units=2").unwrap().1, ParamValue::from(2i64));
        assert_eq!(parse_param("lip=false").unwrap().1, ParamValue::from(false));
        assert_eq!(parse_param("wall=1.2").unwrap().1, ParamValue::from(1.2));
        assert_eq!(parse_param("label=A1").unwrap().1, ParamValue::from("A1"));
        assert_eq!(parse_param("label=").unwrap().1, ParamValue::from(""));
        assert_eq!(parse_param("note=a=b").unwrap(), ("note".into(), ParamValue::from("a=b")));
        assert!(parse_param("width_units").is_err());
        assert!(parse_param("=3").is_err());
    }

    #[test]
    fn render_command_line() {
        let cli = Cli::parse_from([
            "yantra-render",
            "render",
            "project.json",
            "-m",
            "cup",
            "-p",
            "width_units=3",
            "-p",
            "show_labels=true",
            "--strategy",
            "local",
            "--analyze",
        ]);
        let Command::Render(args) = cli.command else {
            panic!("expected render");
        };
        assert_eq!(args.mode, "cup");
        assert_eq!(args.params.len(), 2);
        assert!(args.analyze);
        assert_eq!(args.material, "pla");
        assert_eq!(args.engine.strategy, Some(ExecutionStrategy::Local));
        assert_eq!(parameters(&args.params).get("width_units"), Some(&ParamValue::from(3i64)));
    }

    #[test]
    fn api_base_override_moves_the_scad_source() {
        let args = EngineArgs {
            api_base: Some("http://render.example:8080/".into()),
            ..EngineArgs::default()
        };
        let config = args.config();
        assert_eq!(config.api_base, "http://render.example:8080");
        assert!(matches!(
            config.scad_source,
            ScadSource::Http(ref url) if url == "http://render.example:8080/scad/"
        ));
    }
}
