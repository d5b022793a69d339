// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! yantra-render - render Yantra4D projects from the command line.
//!
//! # Commands
//!
//! - `render <manifest> -m <mode> [-p key=value]...` - render a mode, write
//!   each part as `<out>/<part>.stl`, optionally with `--analyze`
//! - `estimate <manifest> -m <mode>` - estimated render time in seconds
//! - `probe` - which execution strategy this machine would use
//! - `materials [manifest]` - print materials available to `--analyze`
//!
//! Engine settings come from `YANTRA_*` environment variables; see
//! `EngineConfig::from_env`.

use clap::Parser;

mod args;
mod commands;

use args::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,yantra_engine=debug".into());
    if cli.json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .pretty()
            .init();
    }

    match cli.command {
        Command::Render(args) => commands::render(args).await,
        Command::Estimate(args) => commands::estimate(args),
        Command::Probe(args) => commands::probe(args).await,
        Command::Materials { manifest } => commands::materials(manifest),
    }
}
