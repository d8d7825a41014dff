pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod entities;
pub mod scheduler;
pub mod services;
pub mod state;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub use config::Config;
use scheduler::Scheduler;
use state::SharedState;

pub async fn run() -> anyhow::Result<()> {
    let config = Config::load()?;
    config.validate()?;

    let prometheus_handle = if config.observability.metrics_enabled {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        Some(handle)
    } else {
        None
    };

    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let fmt_layer = tracing_subscriber::fmt::layer();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    if config.observability.loki_enabled {
        let url = url::Url::parse(&config.observability.loki_url).context("Invalid Loki URL")?;

        let (layer, task) = tracing_loki::builder()
            .label("app", "vestra")?
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

    let args = cli::Cli::parse();

    match args.command {
        Some(cli::Commands::Daemon) | None => run_daemon(config, prometheus_handle).await,

        Some(cli::Commands::CreateAdmin {
            username,
            email,
            password,
        }) => cmd_create_admin(config, &username, &email, &password).await,

        Some(cli::Commands::ResetPassword { identifier }) => {
            cmd_reset_password(config, &identifier).await
        }

        Some(cli::Commands::Sweep) => cmd_sweep(config).await,
    }
}

async fn run_daemon(
    config: Config,
    prometheus_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
) -> anyhow::Result<()> {
    info!(
        "Vestra v{} starting in daemon mode...",
        env!("CARGO_PKG_VERSION")
    );

    let shared = Arc::new(SharedState::new(config.clone()).await?);
    let api_state = api::create_app_state(shared.clone(), prometheus_handle).await?;

    let mut scheduler_handle = if config.scheduler.enabled {
        let scheduler = Scheduler::new(Arc::clone(&shared), config.scheduler.clone());
        Some(scheduler.start().await?)
    } else {
        None
    };

    let server_handle: Option<tokio::task::JoinHandle<()>> = if config.server.enabled {
        let port = config.server.port;
        info!("Starting Web API on port {}", port);

        let app = api::router(api_state).await;
        let addr = format!("0.0.0.0:{}", port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        Some(tokio::spawn(async move {
            info!("API server running at http://0.0.0.0:{}", port);
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

    if let Some(scheduler) = scheduler_handle.as_mut() {
        scheduler.shutdown().await.ok();
    }
    if let Some(handle) = server_handle {
        handle.abort();
    }
    info!("Daemon stopped");

    Ok(())
}

async fn cmd_create_admin(
    config: Config,
    username: &str,
    email: &str,
    password: &str,
) -> anyhow::Result<()> {
    let shared = SharedState::new(config).await?;

    match shared
        .auth_service
        .register(username, email, password, true)
        .await
    {
        Ok(user_id) => {
            println!("Administrator '{username}' created (id: {user_id})");
            Ok(())
        }
        Err(e) => anyhow::bail!("Failed to create administrator: {e}"),
    }
}

async fn cmd_reset_password(config: Config, identifier: &str) -> anyhow::Result<()> {
    let ttl_minutes = config.security.reset_token_ttl_minutes;
    let shared = SharedState::new(config).await?;

    match shared.auth_service.request_password_reset(identifier).await {
        Ok(Some(token)) => {
            println!("Reset token for '{identifier}' (valid {ttl_minutes} minutes):");
            println!("{token}");
            println!();
            println!("Complete the reset with POST /api/auth/password/reset");
            Ok(())
        }
        Ok(None) => {
            println!("No account found for '{identifier}'");
            Ok(())
        }
        Err(e) => anyhow::bail!("Failed to generate reset token: {e}"),
    }
}

async fn cmd_sweep(config: Config) -> anyhow::Result<()> {
    let shared = SharedState::new(config).await?;

    match shared.auth_service.sweep().await {
        Ok(stats) => {
            println!(
                "Sweep complete: {} sessions expired, {} pruned, {} audit events pruned",
                stats.sessions_expired, stats.sessions_pruned, stats.audit_events_pruned
            );
            Ok(())
        }
        Err(e) => anyhow::bail!("Sweep failed: {e}"),
    }
}
