//! `mediator-server`: loads the built-in units and rules and serves them over
//! HTTP until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use mediator_core::Logging;
use mediator_server::network::{NetworkConfig, NetworkModule, RoutePolicy};
use mediator_server::service::{ServerConfig, UnitDeps, UnitRegistry};
use mediator_server::storage::engines::HashMapStorage;
use mediator_server::syncs::all_syncs;
use mediator_server::units::catalog;
use mediator_server::Engine;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "mediator-server", about = "Action-dispatch and synchronization server")]
struct Args {
    /// Bind address
    #[arg(long, env = "MEDIATOR_HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "MEDIATOR_PORT", default_value_t = 8000)]
    port: u16,

    /// Prefix for every operation route
    #[arg(long, env = "MEDIATOR_BASE_URL", default_value = "/api")]
    base_url: String,

    /// How long a mediated request may stay pending, in milliseconds
    #[arg(long, env = "MEDIATOR_REQUEST_TIMEOUT_MS", default_value_t = 10_000)]
    request_timeout_ms: u64,

    /// Engine diagnostics: off, trace or verbose
    #[arg(long, env = "MEDIATOR_LOGGING", default_value = "trace")]
    logging: Logging,

    #[arg(long, env = "MEDIATOR_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// JSON file replacing the built-in passthrough policy
    #[arg(long, env = "MEDIATOR_PASSTHROUGH")]
    passthrough: Option<PathBuf>,

    /// Allowed CORS origin; repeat for several
    #[arg(long = "cors-origin", env = "MEDIATOR_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    cors_origins: Vec<String>,

    /// Upper bound on actions processed per reaction chain
    #[arg(long, env = "MEDIATOR_MAX_REACTIONS", default_value_t = 10_000)]
    max_reactions: usize,
}

impl Args {
    fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            logging: self.logging,
            max_reactions_per_flow: self.max_reactions,
            ..ServerConfig::default()
        }
    }

    fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            base_path: self.base_url.clone(),
            cors_origins: self.cors_origins.clone(),
            request_timeout: self.request_timeout(),
            ..NetworkConfig::default()
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "cannot listen for Ctrl-C; stop the process to exit");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let server_config = Arc::new(args.server_config());
    let network_config = args.network_config();
    let policy = match &args.passthrough {
        Some(path) => RoutePolicy::load(path)?,
        None => RoutePolicy::builtin(&network_config.base()),
    };

    let registry = Arc::new(UnitRegistry::new());
    let deps = UnitDeps::new(Arc::new(HashMapStorage::new()), Arc::clone(&server_config));
    let report = catalog().load(&deps, &registry);
    for (unit, reason) in &report.skipped {
        warn!(unit = %unit, reason = %reason, "unit not loaded");
    }

    let engine = Engine::new(registry, &server_config);
    let rules = engine.register(all_syncs());
    info!(rules, logging = %server_config.logging, "synchronizations registered");

    let mut module = NetworkModule::new(network_config, engine, policy)?;
    module.start().await?;
    module.serve(ctrl_c()).await
}
