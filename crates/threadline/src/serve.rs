// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `threadline serve` command implementation.
//!
//! Opens SQLite storage, registers the configured channel adapters, builds
//! the Anthropic runner, and starts the gateway, cron scheduler, and queue
//! worker. Everything stops on SIGINT/SIGTERM; in-flight channel replies and
//! scheduled runs get a bounded drain before storage closes.

use std::sync::Arc;
use std::time::Duration;

use threadline_agent::shutdown;
use threadline_agent::{
    ChannelRegistry, ChannelRegistryBuilder, InboundPipeline, Orchestrator, OrchestratorSettings,
    TaskManager, TaskWorker,
};
use threadline_anthropic::AnthropicRunner;
use threadline_config::ThreadlineConfig;
use threadline_core::{StorageAdapter, TaskExecutor, ThreadlineError};
use threadline_email::EmailChannel;
use threadline_gateway::{GatewayState, ServerConfig};
use threadline_notify::Notifier;
use threadline_slack::SlackChannel;
use threadline_storage::SqliteStorage;
use tracing::{debug, error, info, warn};

/// How long shutdown waits for channel replies and scheduled runs still in flight.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Error recorded on tasks a previous process left running.
const INTERRUPTED_REASON: &str = "interrupted by shutdown before completion";

/// Registers every channel adapter whose credentials are configured.
fn build_registry(config: &ThreadlineConfig) -> Result<Arc<ChannelRegistry>, ThreadlineError> {
    let mut builder = ChannelRegistryBuilder::new();

    if config.slack.bot_token.is_some() {
        let slack = SlackChannel::new(&config.slack).map_err(|e| {
            error!(error = %e, "failed to initialize Slack channel");
            e
        })?;
        builder.register(Arc::new(slack))?;
        info!("slack channel registered");
    } else {
        info!("slack channel skipped (no bot_token configured)");
    }

    if config.email.api_key.is_some() {
        let email = EmailChannel::new(&config.email).map_err(|e| {
            error!(error = %e, "failed to initialize email channel");
            e
        })?;
        builder.register(Arc::new(email))?;
        info!("email channel registered");
    } else {
        info!("email channel skipped (no api_key configured)");
    }

    Ok(builder.build())
}

/// Runs the `threadline serve` command.
pub async fn run_serve(config: ThreadlineConfig) -> Result<(), ThreadlineError> {
    init_tracing(&config.agent.log_level);
    info!(name = %config.agent.name, "starting threadline serve");

    // Fail-closed: the API would reject every call without a token.
    if config.gateway.enabled && config.gateway.bearer_token.is_none() {
        return Err(ThreadlineError::Security(
            "gateway enabled but no bearer token configured. Set gateway.bearer_token \
             or THREADLINE_GATEWAY_BEARER_TOKEN."
                .to_string(),
        ));
    }

    let storage = {
        let storage = SqliteStorage::new(config.storage.clone());
        storage.initialize().await?;
        Arc::new(storage)
    };
    let storage_dyn: Arc<dyn StorageAdapter> = storage.clone();

    let interrupted = storage.fail_interrupted_tasks(INTERRUPTED_REASON).await?;
    if interrupted > 0 {
        warn!(count = interrupted, "marked interrupted tasks as failed");
    }

    let registry = build_registry(&config)?;

    let runner = Arc::new(AnthropicRunner::new(&config).map_err(|e| {
        error!(error = %e, "failed to initialize Anthropic runner");
        eprintln!(
            "error: Anthropic API key required. Set via config (anthropic.api_key) or the ANTHROPIC_API_KEY env var"
        );
        e
    })?);

    let orchestrator = Arc::new(Orchestrator::new(
        runner,
        storage_dyn.clone(),
        OrchestratorSettings::from_config(&config.agent),
    ));
    let pipeline = Arc::new(InboundPipeline::new(registry.clone(), orchestrator.clone()));

    let notifier = Arc::new(Notifier::from_config(&config.notifications)?);
    let scheduler = Arc::new(threadline_cron::from_config(&config.scheduler));
    let mut task_manager =
        TaskManager::new(orchestrator.clone(), notifier, &config.worker.queue_name);
    if config.scheduler.enabled {
        task_manager = task_manager.with_scheduler(scheduler.clone());
    }
    let tasks = Arc::new(task_manager);

    let cancel = shutdown::install_signal_handler();
    let mut background = tokio::task::JoinSet::new();

    if config.scheduler.enabled {
        scheduler.load_scheduled_tasks(storage_dyn.as_ref()).await?;
        let executor: Arc<dyn TaskExecutor> = tasks.clone();
        background.spawn(
            scheduler
                .clone()
                .run(executor, storage_dyn.clone(), cancel.clone()),
        );
    } else {
        debug!("scheduler disabled by configuration");
    }

    if config.worker.enabled {
        let worker = Arc::new(TaskWorker::from_config(
            &config.worker,
            storage_dyn.clone(),
            tasks.clone(),
        ));
        background.spawn(worker.run(cancel.clone()));
    } else {
        debug!("worker disabled by configuration");
    }

    if config.gateway.enabled {
        let state = GatewayState::new(
            pipeline.clone(),
            orchestrator.clone(),
            tasks.clone(),
            config.gateway.bearer_token.clone(),
        );
        let server_config = ServerConfig::from(&config.gateway);
        let gateway_cancel = cancel.clone();
        background.spawn(async move {
            if let Err(e) =
                threadline_gateway::start_server(&server_config, state, gateway_cancel.clone()).await
            {
                error!(error = %e, "gateway stopped with error");
                gateway_cancel.cancel();
            }
        });
        info!(
            host = config.gateway.host.as_str(),
            port = config.gateway.port,
            channels = registry.len(),
            "gateway started"
        );
    } else {
        debug!("gateway disabled by configuration");
    }

    cancel.cancelled().await;
    info!("shutting down");

    while background.join_next().await.is_some() {}
    shutdown::drain(pipeline.tracker(), "replies", DRAIN_TIMEOUT).await;
    shutdown::drain(scheduler.tracker(), "scheduled runs", DRAIN_TIMEOUT).await;
    registry.shutdown().await;

    storage.close().await?;
    info!("threadline serve shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("threadline={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
