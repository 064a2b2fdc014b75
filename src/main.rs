//! ADN Defense Service
//!
//! Command-line entry point: run the HTTP service for one node, evaluate a
//! single request from a file or stdin, or print the default configuration.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    ADN DEFENSE NODE                      │
//! ├──────────────────────────────────────────────────────────┤
//! │  POST /v3/evaluate  ←── event batches (contract v3)      │
//! │  Node state         ←── one per node, single writer      │
//! │  Action executor    ←── lockdown enter / lift            │
//! │  GET /metrics       ←── Prometheus                       │
//! └──────────────────────────────────────────────────────────┘
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use adn_defense::api::{self, Metrics};
use adn_defense::{AdnV3, NodeDefenseState, ServiceConfig, CONTRACT_VERSION};

/// ADN - fail-closed node defense
#[derive(Parser, Debug)]
#[command(name = "adn-defense")]
#[command(author = "ADN Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fail-closed node defense: risk, lockdown and RPC policy", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP defense service
    Serve {
        /// Path to configuration file
        #[arg(short, long, default_value = "adn.toml")]
        config: PathBuf,

        /// HTTP API port (overrides config)
        #[arg(long)]
        api_port: Option<u16>,

        /// Node name shown in status output (overrides config)
        #[arg(long)]
        node_name: Option<String>,
    },

    /// Evaluate one request and print the response JSON
    Evaluate {
        /// Request file, or `-` for stdin
        #[arg(short, long, default_value = "-")]
        request: String,

        /// Path to configuration file
        #[arg(short, long, default_value = "adn.toml")]
        config: PathBuf,
    },

    /// Print the default configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so `evaluate` output stays pipeable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve { config, api_port, node_name } => {
            let config = load_config(&config)?
                .with_api_port(api_port)
                .with_node_name(node_name);
            serve(config).await
        }

        Commands::Evaluate { request, config } => {
            let config = load_config(&config)?;
            evaluate_once(&config, &request)
        }

        Commands::Config => {
            print!("{}", ServiceConfig::default().to_toml()?);
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> anyhow::Result<ServiceConfig> {
    let config = if path.exists() {
        ServiceConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?
    } else {
        warn!("Config file {} not found, using defaults", path.display());
        ServiceConfig::default()
    };

    config.validate()?;
    Ok(config)
}

async fn serve(config: ServiceConfig) -> anyhow::Result<()> {
    info!("🛡️ ADN Defense Service v{}", env!("CARGO_PKG_VERSION"));
    info!("⚙️  Configuration:");
    info!("   Node: {}", config.node_name);
    info!("   Component: {} (contract v{})", config.component, CONTRACT_VERSION);
    info!("   API port: {}", config.api_port);
    info!(
        "   Thresholds: partial={} lockdown={}",
        config.defense.partial_lock_threshold, config.defense.lockdown_threshold
    );
    info!("   Event window: {}", config.defense.max_active_events);

    let shared_config = Arc::new(config);
    let metrics = Arc::new(Metrics::new());

    let api_handle = tokio::spawn(api::run_api_server(shared_config, metrics));

    info!("✅ Service started");
    info!("   Press Ctrl+C to shutdown gracefully");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Shutdown signal received");
        }
        result = api_handle => {
            error!("HTTP API exited: {:?}", result);
        }
    }

    info!("👋 ADN Defense Service shutting down");
    Ok(())
}

/// Evaluate against a fresh node state
fn evaluate_once(config: &ServiceConfig, request: &str) -> anyhow::Result<()> {
    let text = if request == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(request).with_context(|| format!("reading request {}", request))?
    };

    let mut state = NodeDefenseState::new();

    let engine = AdnV3::new(config.defense.clone()).with_component(config.component.clone());
    let response = engine.evaluate_json(&text, &mut state);

    // ERROR decisions are still a successful run: the envelope carries them
    println!("{}", serde_json::to_string_pretty(&response)?);

    info!(
        "Evaluated {}: risk={}, lockdown={}",
        response.request_id.as_deref().unwrap_or("-"),
        state.risk_level,
        state.lockdown_state
    );
    Ok(())
}
