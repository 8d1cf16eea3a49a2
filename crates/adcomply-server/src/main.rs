//! AdComply Server
//!
//! Evaluates ad campaign artifacts against platform rules, content
//! moderation models and regional regulations, and reports violations.

use adcomply_server::{create_router, AdComplyConfig, AppState, ComplianceEngine};
use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "adcomply-server")]
#[command(about = "AdComply compliance evaluation service", long_about = None)]
struct Cli {
    /// Configuration file path (YAML or JSON)
    #[arg(short, long, default_value = "config/adcomply.yaml")]
    config: String,

    /// Listen address
    #[arg(short = 'l', long, default_value = "0.0.0.0")]
    listen: String,

    /// Listen port
    #[arg(short = 'P', long, default_value = "8080")]
    port: u16,

    /// Delivery environment (overrides the configuration file)
    #[arg(short, long, env = "ADCOMPLY_ENVIRONMENT")]
    environment: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);
    info!("Starting AdComply server");

    let mut config = AdComplyConfig::load(&cli.config)?;
    if let Some(environment) = cli.environment {
        config.environment = environment;
    }
    config.validate()?;
    info!(
        environment = %config.environment,
        rules_file = ?config.policy_checker.rules_file,
        recipients = config.compliance_reporter.alert_recipients.len(),
        "Configuration loaded"
    );
    for recipient in config.compliance_reporter.unroutable_recipients() {
        warn!(recipient, "Alert recipient has no delivery channel; set smtp_config for email recipients");
    }

    let metrics_handle = init_metrics()?;

    let engine = Arc::new(ComplianceEngine::from_config(&config).await?);
    let background = engine.spawn_background();
    info!("Compliance engine initialized");

    let addr: SocketAddr = format!("{}:{}", cli.listen, cli.port).parse()?;
    let app = create_router(AppState::new(Arc::clone(&engine), metrics_handle));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            warn!("Shutdown signal received, stopping server...");
        })
        .await?;

    engine.shutdown();
    for task in background {
        if let Err(e) = task.await {
            warn!(error = %e, "Background task ended abnormally");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("adcomply=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("adcomply=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!("adcomply_checks_total", "Artifacts evaluated, by outcome");
    metrics::describe_histogram!(
        "adcomply_check_latency_us",
        metrics::Unit::Microseconds,
        "End-to-end evaluation latency of one artifact"
    );
    metrics::describe_counter!("adcomply_violations_total", "Violations found, by source");
    metrics::describe_counter!("adcomply_cache_hits_total", "Evaluation cache hits, by cache");
    metrics::describe_counter!("adcomply_cache_misses_total", "Evaluation cache misses, by cache");
    metrics::describe_counter!("adcomply_moderation_unscored_total", "Moderation categories left unscored");
    metrics::describe_counter!("adcomply_rule_reloads_total", "Rule reloads, by outcome");
    metrics::describe_counter!("adcomply_regulatory_refresh_total", "Regulation refreshes, by outcome");
    metrics::describe_gauge!("adcomply_regulatory_stale", "1 while regulations are stale");
    metrics::describe_counter!("adcomply_alerts_total", "Alerts raised, by tier");
    metrics::describe_counter!("adcomply_notifications_total", "Notification deliveries, by kind and outcome");
    metrics::describe_counter!("adcomply_reports_generated_total", "Reports generated, by period");
    metrics::describe_counter!("adcomply_incidents_total", "Operational incidents, by kind");

    info!("Metrics exporter initialized");
    Ok(handle)
}
