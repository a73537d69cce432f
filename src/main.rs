use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ferret::config::{AppConfig, MethodTable};
use ferret::ingest::{
    BlockProcessor, ConsumerExit, ConsumerStats, EthWebSocketClient, RetryPolicy, StreamConsumer,
};
use ferret::transport::AlertBus;
use ferret::util::display::print_spam_alert;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

struct ServiceOrchestrator {
    shutdown_tx: broadcast::Sender<()>,
    client: Arc<EthWebSocketClient>,
    display_task: Option<JoinHandle<()>>,
    consumer_task: Option<JoinHandle<(ConsumerExit, ConsumerStats)>>,
}

impl ServiceOrchestrator {
    fn new(client: Arc<EthWebSocketClient>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self {
            shutdown_tx,
            client,
            display_task: None,
            consumer_task: None,
        }
    }

    #[instrument(skip_all)]
    fn start(&mut self, config: &AppConfig, methods: MethodTable) {
        let bus = AlertBus::default();

        // Console renderer
        let mut alerts = bus.subscribe();
        let mut display_shutdown = self.shutdown_tx.subscribe();
        self.display_task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = alerts.recv() => match received {
                        Ok(alert) => print_spam_alert(&alert),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("⚠️ Alert display lagged, {} alerts dropped", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = display_shutdown.recv() => break,
                }
            }
            debug!("Alert display stopped");
        }));

        // Block stream consumer
        let processor =
            BlockProcessor::from_config(config, Arc::new(methods), self.client.clone(), bus);
        let mut consumer = StreamConsumer::new(
            self.client.clone(),
            processor,
            RetryPolicy::from_config(&config.websocket),
        );
        let consumer_shutdown = self.shutdown_tx.subscribe();
        self.consumer_task = Some(tokio::spawn(async move {
            let exit = consumer.run(consumer_shutdown).await;
            (exit, consumer.stats().clone())
        }));

        info!("✅ Spam monitor started");
    }

    /// Resolves when the consumer task ends on its own.
    async fn consumer_finished(&mut self) -> Option<(ConsumerExit, ConsumerStats)> {
        let task = self.consumer_task.as_mut()?;
        let outcome = task.await;
        self.consumer_task = None;
        match outcome {
            Ok(result) => Some(result),
            Err(e) => {
                error!("❌ Block stream consumer task failed: {}", e);
                None
            }
        }
    }

    #[instrument(skip(self))]
    async fn shutdown_all(&mut self) {
        info!("🛑 Shutting down");
        let _ = self.shutdown_tx.send(());

        if let Some(task) = self.consumer_task.take() {
            match task.await {
                Ok((exit, stats)) => log_consumer_summary(exit, &stats),
                Err(e) => error!("❌ Block stream consumer task failed: {}", e),
            }
        }
        if let Some(task) = self.display_task.take() {
            if let Err(e) = task.await {
                error!("❌ Alert display task failed: {}", e);
            }
        }

        self.client.disconnect().await;
        info!("✅ All services shut down");
    }
}

fn log_consumer_summary(exit: ConsumerExit, stats: &ConsumerStats) {
    info!(
        exit = ?exit,
        blocks_processed = stats.blocks_processed,
        blocks_skipped = stats.blocks_skipped,
        alerts_emitted = stats.alerts_emitted,
        reconnect_attempts = stats.reconnect_attempts,
        "📊 Block stream consumer finished"
    );
}

fn init_tracing() -> Result<WorkerGuard> {
    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::daily("logs", "ferret.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true)
        .compact();

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .json()
        .with_current_span(false)
        .with_span_list(true);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = init_tracing()?;

    info!("🦦 Ferret - EVM Spam Transaction Monitor");
    info!("======================================");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = AppConfig::load_from_file(&config_path)
        .with_context(|| format!("failed to load settings from {config_path}"))?;
    let methods = MethodTable::load_from_file(&config.methods_file).with_context(|| {
        format!("failed to load method table from {}", config.methods_file.display())
    })?;

    info!(
        url = %config.websocket.url,
        block_range = config.monitor.block_range,
        min_consecutive_blocks = config.monitor.min_consecutive_blocks,
        tracked_methods = methods.len(),
        ignored_addresses = config.erc20.ignored_addresses.len(),
        "⚙️ Configuration loaded"
    );

    let client = Arc::new(EthWebSocketClient::new(config.websocket.clone()));
    let mut orchestrator = ServiceOrchestrator::new(client);
    orchestrator.start(&config, methods);
    info!("Press Ctrl+C to stop");

    tokio::select! {
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("🛑 Shutdown signal received");
        }
        finished = orchestrator.consumer_finished() => {
            if let Some((exit, stats)) = finished {
                log_consumer_summary(exit, &stats);
            }
            error!("❌ Block stream stopped; monitor is idle until Ctrl+C");
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        }
    }

    orchestrator.shutdown_all().await;
    info!("👋 Ferret shutdown complete");
    Ok(())
}
