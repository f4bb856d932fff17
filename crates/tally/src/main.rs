mod bootstrap_helpers;
mod startup;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tally_channels::UpdateSource;
use tally_cli::Cli;
use tally_runtime::{
    spawn_service, HealthMonitor, ScheduledReporter, ServiceHandle, UpdateReconciler,
};

use crate::bootstrap_helpers::init_tracing;
use crate::startup::{
    build_app_context, gateway_config, health_monitor_config, reconciler_config, reporter_config,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    run_cli(cli).await
}

async fn run_cli(cli: Cli) -> Result<()> {
    let (context, telegram) = build_app_context(&cli)?;
    let mut services: Vec<ServiceHandle> = Vec::new();

    match telegram {
        Some(client) => {
            let config = reconciler_config(&cli);
            if config.allowed_chat_ids.is_empty() {
                tracing::warn!(
                    "no chat allowlist configured; commands from every chat are accepted"
                );
            }
            let source: Arc<dyn UpdateSource> = client;
            let reconciler = UpdateReconciler::new(
                source,
                Arc::clone(&context.dispatcher),
                context.notifier.clone(),
                config,
                Arc::clone(&context.reconciler_health),
            );
            services.push(spawn_service("update-reconciler", move |shutdown_rx| {
                reconciler.run(shutdown_rx)
            })?);
        }
        None => tracing::info!("no Telegram bot token configured; chat commands disabled"),
    }

    let reporter = ScheduledReporter::new(
        Arc::clone(&context.store),
        Arc::clone(&context.summarizer),
        context.notifier.clone(),
        reporter_config(&cli),
    )
    .context("failed to build scheduled reporter")?;
    services.push(spawn_service("scheduled-reporter", move |shutdown_rx| {
        reporter.run(shutdown_rx)
    })?);

    if let Some(config) = health_monitor_config(&cli) {
        let monitor = HealthMonitor::new(
            Arc::clone(&context.metrics),
            context.notifier.clone(),
            config,
        );
        services.push(spawn_service("health-monitor", move |shutdown_rx| {
            monitor.run(shutdown_rx)
        })?);
    }

    let gateway_result = tally_gateway::run_gateway_server(
        gateway_config(&cli)?,
        context,
        async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                tracing::error!(%error, "failed to listen for shutdown signal");
            }
            tracing::info!("shutdown requested");
        },
    )
    .await;

    for service in services.iter_mut() {
        if let Err(error) = service.shutdown().await {
            tracing::error!(
                service = service.name(),
                error = %format!("{error:#}"),
                "service stopped with error"
            );
        }
    }
    gateway_result
}
