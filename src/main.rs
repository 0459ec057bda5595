//! statcache - statistics API server and cache-aware client

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use statcache::{
    cli::{CacheCommand, Cli, Command},
    client::{ApiClient, ClientHooks, RequestOptions, WorkerMessage},
    config::Config,
    server::StatServer,
    setup_tracing,
};

/// Hooks for the one-shot CLI client: there is no worker, and the next
/// invocation already runs the new build.
struct CliHooks;

impl ClientHooks for CliHooks {
    fn notify_worker(&self, message: &WorkerMessage) {
        info!(?message, "Build changed, client cache invalidated");
    }

    fn reload(&self) {
        info!("Build changed, caches rebuilt on next run");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::Fetch {
            endpoint,
            query,
            no_cache,
        }) => run_fetch(&config, &endpoint, query, no_cache).await,
        Some(Command::Cache(cmd)) => run_cache_command(&config, cmd).await,
        Some(Command::Serve) | None => run_server(config).await,
    }
}

fn client(config: &Config) -> Option<ApiClient> {
    match ApiClient::from_config(&config.client, Arc::new(CliHooks)) {
        Ok(client) => Some(client),
        Err(e) => {
            error!("Failed to create client: {e}");
            None
        }
    }
}

/// Run one request through the client stack
async fn run_fetch(
    config: &Config,
    endpoint: &str,
    query: Vec<(String, String)>,
    no_cache: bool,
) -> ExitCode {
    let Some(client) = client(config) else {
        return ExitCode::FAILURE;
    };

    let options = query
        .into_iter()
        .fold(RequestOptions::new(), |options, (key, value)| {
            options.query(key, value)
        });

    match client.request(endpoint, &options, !no_cache).await {
        Some(payload) => match serde_json::to_string_pretty(&payload) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("❌ Failed to serialize response: {e}");
                ExitCode::FAILURE
            }
        },
        None => {
            eprintln!("❌ No data for {endpoint}");
            ExitCode::FAILURE
        }
    }
}

/// Run client cache management commands
async fn run_cache_command(config: &Config, cmd: CacheCommand) -> ExitCode {
    let Some(client) = client(config) else {
        return ExitCode::FAILURE;
    };

    match cmd {
        CacheCommand::Stats => {
            client.version_check().await;
            match serde_json::to_string_pretty(&client.cache_stats()) {
                Ok(json) => {
                    println!("{json}");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("❌ Failed to serialize stats: {e}");
                    ExitCode::FAILURE
                }
            }
        }
        CacheCommand::Clear => {
            let before = client.cache_stats();
            client.clear_cache();
            println!("✅ Cleared {} cached response(s)", before.total);
            ExitCode::SUCCESS
        }
    }
}

/// Run the API server
async fn run_server(config: Config) -> ExitCode {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        dataset = %config.dataset.path.display(),
        preload = config.preload.enabled,
        "Starting statcache server"
    );

    let server = match StatServer::new(config).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create server: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Server shutdown complete");
    ExitCode::SUCCESS
}
