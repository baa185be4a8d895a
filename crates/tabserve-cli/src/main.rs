//! tabserve - HTTP prediction server for tabular classification models

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

use tabserve_cli::api;
use tabserve_cli::config::{Config, Overrides};
use tabserve_core::ServingState;

#[derive(Parser)]
#[command(name = "tabserve")]
#[command(version)]
#[command(about = "tabserve - Serve a trained tabular classifier over HTTP", long_about = None)]
struct Cli {
    /// Path to configuration file (YAML or TOML)
    #[arg(short, long, global = true, env = "TABSERVE_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    serve: ServeArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct ServeArgs {
    /// Server port
    #[arg(short, long, global = true, env = "PORT")]
    port: Option<u16>,

    /// Bind address
    #[arg(long, global = true, env = "TABSERVE_BIND")]
    bind: Option<String>,

    /// API key required in the X-API-KEY header (empty disables auth)
    #[arg(long, global = true, env = "API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Directory holding model.json and model_card.json
    #[arg(long, global = true, env = "TABSERVE_ARTIFACTS")]
    artifacts_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "TABSERVE_LOG")]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the prediction server (default)
    Serve,

    /// Load and validate the artifacts, then exit
    Check,

    /// Print an example configuration file
    Config {
        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ConfigFormat {
    Yaml,
    Toml,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Config { format }) = cli.command {
        match format {
            ConfigFormat::Yaml => print!("{}", Config::example_yaml()),
            ConfigFormat::Toml => print!("{}", Config::example_toml()),
        }
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.merge(Overrides {
        port: cli.serve.port,
        bind: cli.serve.bind,
        api_key: cli.serve.api_key,
        artifacts_dir: cli.serve.artifacts_dir,
        log_level: cli.serve.log_level,
    });

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level()?)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(path) = &cli.config {
        info!("Loaded configuration from {}", path.display());
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Check => {
            tabserve_cli::check_artifacts(&config.artifacts.paths())?;
        }
        Commands::Serve => run_server(config).await?,
        Commands::Config { .. } => {}
    }

    Ok(())
}

async fn run_server(config: Config) -> Result<()> {
    let state = ServingState::load(&config.artifacts.paths())
        .context("failed to load model artifacts")?;

    let auth_config = config.auth_config();
    if auth_config.is_required() {
        info!("API key authentication enabled");
    } else {
        info!("API key authentication disabled");
    }

    let routes = api::api_routes(
        Arc::new(state),
        Arc::new(auth_config),
        config.server.max_body_bytes,
    );

    let bind = &config.server.bind;
    let bind_addr: std::net::IpAddr = bind
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address '{}': {}", bind, e))?;

    let (addr, server) = warp::serve(routes)
        .try_bind_with_graceful_shutdown((bind_addr, config.server.port), async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .with_context(|| format!("failed to bind {}:{}", bind, config.server.port))?;

    info!("Server listening on {}", addr);
    server.await;
    info!("Server stopped");

    Ok(())
}
