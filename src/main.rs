//! cityseg: street-scene semantic segmentation on Burn.
//!
//! Layers, outermost first:
//!   cli → application → data / ml → infra, with domain shared by all.
//! Set `RUST_LOG` to widen logging, e.g. `RUST_LOG=cityseg=debug,burn=info`.
#![recursion_limit = "256"]

mod application;
mod cli;
mod data;
mod domain;
mod infra;
mod ml;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("cityseg=info".parse()?);
    tracing_subscriber::fmt().with_env_filter(filter).init();

    cli::Cli::parse().run()
}
