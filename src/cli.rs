//! Command-line interface

use clap::Parser;

/// Multi-tenant agent hosting service
#[derive(Debug, Clone, Parser, Default)]
#[command(name = "aviary", version, about)]
pub struct Cli {
    /// Bind address, overrides configuration
    #[arg(long)]
    pub host: Option<String>,

    /// Listen port, overrides configuration
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory of agent config files, overrides configuration
    #[arg(long)]
    pub agents_dir: Option<String>,

    /// Public base URL advertised on discovery cards
    #[arg(long)]
    pub public_url: Option<String>,

    /// Log level filter (error, warn, info, debug, trace)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Settings file to load (without extension), defaults to `aviary`
    #[arg(long)]
    pub config: Option<String>,
}
