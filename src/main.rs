//! Control Hub - Rust implementation
//!
//! Runs the automation engine with console connections, a sled-backed control
//! store and an optional REPL.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use control_hub::cli;
use control_hub::config::{AppConfig, ConfigWatcher};
use control_hub::controller::{Controller, ControllerSettings, CONTROLS_PREFIX};
use control_hub::engine::{EngineActor, EngineHandle};
use control_hub::host::{
    ConnectionRegistry, ConsoleModuleHost, ConsoleSurfaces, EngineServices, GridLocationResolver,
    ModuleDispatch,
};
use control_hub::persistence::{StoreActor, StoreHandle};

/// Connection registered when the configuration names none
const DEFAULT_CONNECTION: &str = "console";

/// Control Hub - buttons, action sets, feedbacks and triggers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Start the interactive REPL
    #[arg(long)]
    repl: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("Starting Control Hub v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let (config_watcher, config) = load_config(&args.config).await?;

    let store = open_store(&config).await?;
    let handle = start_engine(&config, &store).await?;

    run_app(handle.clone(), config, config_watcher, args.repl, shutdown_signal()).await;

    info!("Shutting down...");
    if let Err(e) = handle.shutdown().await {
        warn!("Engine shutdown failed: {}", e);
    }
    if let Err(e) = store.flush().await {
        warn!("Final store flush failed: {:#}", e);
    }
    store.shutdown();

    info!("Control Hub shutdown complete");
    Ok(())
}

/// Watch the config file when it exists, otherwise run on defaults
async fn load_config(path: &str) -> Result<(Option<ConfigWatcher>, AppConfig)> {
    if !Path::new(path).exists() {
        warn!("Config file {} not found, using defaults", path);
        return Ok((None, AppConfig::default()));
    }
    let (watcher, config) = ConfigWatcher::new(path.to_string()).await?;
    info!("Configuration loaded successfully with hot-reload enabled");
    Ok((Some(watcher), config))
}

async fn open_store(config: &AppConfig) -> Result<StoreHandle> {
    let db_path = &config.persistence.db_path;
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create store directory: {}", parent.display()))?;
        }
    }
    StoreActor::spawn(db_path, config.persistence.debounce_ms)
}

fn build_registry(config: &AppConfig) -> ConnectionRegistry {
    let registry = ConnectionRegistry::new();
    if config.connections.is_empty() {
        registry.register(Arc::new(ConsoleModuleHost::new(DEFAULT_CONNECTION)));
    }
    for connection in &config.connections {
        let host = connection
            .advanced_feedbacks
            .iter()
            .fold(ConsoleModuleHost::new(&connection.id), |host, id| {
                host.with_advanced_feedback(id)
            });
        registry.register(Arc::new(host));
        if let Some(label) = &connection.label {
            info!("   '{}' is {}", connection.id, label);
        }
    }
    registry
}

async fn start_engine(config: &AppConfig, store: &StoreHandle) -> Result<EngineHandle> {
    let surfaces = Arc::new(ConsoleSurfaces);
    let services = EngineServices {
        modules: ModuleDispatch::new(Arc::new(build_registry(config))),
        navigator: surfaces.clone(),
        store: Arc::new(store.clone()),
        resolver: Arc::new(GridLocationResolver::new(config.grid.clone())),
        mirror: surfaces.clone(),
        renderer: surfaces,
    };

    let mut controller = Controller::new(services, ControllerSettings::from(&config.engine));

    let documents = store
        .load_prefix(CONTROLS_PREFIX)
        .await
        .context("Failed to load stored controls")?;
    controller.load_documents(documents.into_iter().map(|(key, doc)| {
        let id = key
            .strip_prefix(CONTROLS_PREFIX)
            .map(str::to_string)
            .unwrap_or(key);
        (id, doc)
    }));

    let handle = EngineActor::spawn(
        controller,
        Duration::from_millis(config.engine.tick_interval_ms),
    );
    handle.signal_ready();
    Ok(handle)
}

async fn next_reload(watcher: &mut Option<ConfigWatcher>) -> Option<AppConfig> {
    match watcher {
        Some(watcher) => watcher.next_config().await,
        None => std::future::pending().await,
    }
}

async fn run_app(
    handle: EngineHandle,
    mut config: AppConfig,
    mut config_watcher: Option<ConfigWatcher>,
    repl: bool,
    shutdown: impl std::future::Future<Output = ()>,
) {
    let repl_done = async {
        if repl {
            cli::run_repl(handle.clone()).await
        } else {
            std::future::pending().await
        }
    };

    info!("✅ Ready to process events!");
    tokio::pin!(shutdown, repl_done);

    loop {
        tokio::select! {
            Some(new_config) = next_reload(&mut config_watcher) => {
                info!("📝 Configuration file changed, applying engine settings...");
                if new_config.grid != config.grid {
                    warn!("⚠️  Grid changes take effect after restart");
                }
                if new_config.engine.tick_interval_ms != config.engine.tick_interval_ms {
                    warn!("⚠️  Tick interval changes take effect after restart");
                }
                if new_config.connections != config.connections
                    || new_config.persistence != config.persistence
                {
                    warn!("⚠️  Connection and store changes take effect after restart");
                }
                handle.update_settings(ControllerSettings::from(&new_config.engine));
                config = new_config;
            }
            result = &mut repl_done => {
                if let Err(e) = result {
                    warn!("REPL failed: {:#}", e);
                }
                break;
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping event loop");
                break;
            }
        }
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
}
