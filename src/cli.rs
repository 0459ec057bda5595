//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Statistics API server and cache-aware client
#[derive(Parser, Debug)]
#[command(name = "statcache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "STATCACHE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "STATCACHE_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "STATCACHE_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "STATCACHE_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "STATCACHE_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the API server (default)
    Serve,

    /// Fetch one endpoint through the client caches and print the JSON
    Fetch {
        /// Endpoint relative to the API base URL, e.g. `/departements/details`
        #[arg(required = true)]
        endpoint: String,

        /// Query parameter as `key=value` (repeatable)
        #[arg(short, long = "query", value_parser = parse_key_value)]
        query: Vec<(String, String)>,

        /// Skip both cache tiers
        #[arg(long)]
        no_cache: bool,
    },

    /// Client cache management
    #[command(subcommand)]
    Cache(CacheCommand),
}

/// Cache subcommands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCommand {
    /// Print entry counts per tier
    Stats,
    /// Drop every cached response
    Clear,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}
