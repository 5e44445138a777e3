pub mod api;
pub mod cli;
pub mod config;
pub mod constants;
pub mod domain;
pub mod services;
pub mod state;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use anyhow::Context;
use cli::{Cli, Commands};
pub use config::Config;
use services::LogSink;
use state::SharedState;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Loads `path` when given, otherwise the first config file found on the search path.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) if path.exists() => Config::load_from_path(path),
        Some(path) => {
            let mut config = Config::default();
            config.credentials.apply_env_overrides();
            eprintln!(
                "Config file {} not found, using defaults",
                path.display()
            );
            Ok(config)
        }
        None => Config::load(),
    }
}

pub async fn run(cli: Cli, mut config: Config) -> anyhow::Result<()> {
    if matches!(cli.command, Some(Commands::Init)) {
        return cli::cmd_init(cli.config.as_deref());
    }

    config.validate()?;

    let daemon = matches!(cli.command, None | Some(Commands::Daemon));

    let prometheus_handle = if daemon && config.observability.metrics_enabled {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        Some(handle)
    } else {
        None
    };

    init_tracing(&config)?;
    if prometheus_handle.is_some() {
        info!("Prometheus metrics recorder initialized");
    }

    match cli.command {
        None | Some(Commands::Daemon) => {
            let config_path = cli
                .config
                .clone()
                .unwrap_or_else(Config::resolve_path);
            run_daemon(config, config_path, prometheus_handle).await
        }
        Some(Commands::Run(overrides)) => {
            overrides.apply(&mut config);
            cli::cmd_run(config).await
        }
        Some(Commands::Scan(overrides)) => {
            overrides.apply(&mut config);
            cli::cmd_scan(&config).await
        }
        Some(Commands::Init) => Ok(()),
    }
}

fn init_tracing(config: &Config) -> anyhow::Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let json = config.general.log_format.eq_ignore_ascii_case("json");
    let json_layer = json.then(|| tracing_subscriber::fmt::layer().json());
    let fmt_layer = (!json).then(tracing_subscriber::fmt::layer);

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(fmt_layer);

    if config.observability.loki_enabled {
        let url = url::Url::parse(&config.observability.loki_url).context("Invalid Loki URL")?;

        let (layer, task) = tracing_loki::builder()
            .label("app", "subtitlarr")?
            .extra_field("env", "production")?
            .build_url(url)?;

        tokio::spawn(task);

        registry.with(layer).init();
        info!(
            "Loki logging initialized at {}",
            config.observability.loki_url
        );
    } else {
        registry.init();
    }

    Ok(())
}

async fn run_daemon(
    config: Config,
    config_path: std::path::PathBuf,
    prometheus_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
) -> anyhow::Result<()> {
    info!(
        "Subtitlarr v{} starting in daemon mode...",
        env!("CARGO_PKG_VERSION")
    );

    let startup_delay = Duration::from_secs(config.scheduler.startup_delay_seconds);
    let server = config.server.clone();
    let shared = Arc::new(SharedState::new(config, Some(config_path))?);

    let sink_handle = LogSink::new(shared.event_bus.clone()).start_listener();
    let scheduler_handle = shared.scheduler.spawn(startup_delay);

    let server_handle: Option<tokio::task::JoinHandle<()>> = if server.enabled {
        let port = server.port;
        info!("Starting Web API on port {}", port);

        let app = api::router(api::create_app_state(shared.clone(), prometheus_handle)).await;
        let addr = format!("0.0.0.0:{port}");
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;

        Some(tokio::spawn(async move {
            info!("Web Server running at http://0.0.0.0:{}", port);
            if let Err(e) = axum::serve(listener, app).await {
                error!("Web server error: {}", e);
            }
        }))
    } else {
        None
    };

    info!("Daemon running. Press Ctrl+C to stop.");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received");
        }
        Err(e) => {
            error!("Error listening for shutdown: {}", e);
        }
    }

    scheduler_handle.abort();
    if let Some(handle) = server_handle {
        handle.abort();
    }
    sink_handle.abort();
    info!("Daemon stopped");

    Ok(())
}
