use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, instrument, warn};

use crate::core::{BlockHeader, ChainError};
use crate::ingest::client::{BlockSubscription, ChainClient};
use crate::ingest::processor::BlockProcessor;
use crate::ingest::websocket::WebSocketConfig;
use crate::transport::AlertSink;

/// Linear reconnection backoff: attempt `n` waits `n * retry_delay_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &WebSocketConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay_ms: config.retry_delay_ms,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_delay_ms.saturating_mul(u64::from(attempt)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Disconnected,
    Connecting,
    Subscribed,
    Backoff { attempt: u32 },
    Exhausted,
}

/// Why [`StreamConsumer::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerExit {
    Shutdown,
    Exhausted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub blocks_processed: u64,
    pub blocks_skipped: u64,
    pub alerts_emitted: u64,
    pub reconnect_attempts: u64,
}

enum Wake {
    Shutdown,
    Event(Option<Result<BlockHeader, ChainError>>),
}

/// Keeps a new-heads subscription alive and feeds every announced block to
/// the processor, one block at a time.
pub struct StreamConsumer<C: ?Sized, S> {
    client: Arc<C>,
    processor: BlockProcessor<C, S>,
    policy: RetryPolicy,
    state: ConsumerState,
    retry_count: u32,
    stats: ConsumerStats,
}

impl<C, S> StreamConsumer<C, S>
where
    C: ChainClient + ?Sized,
    S: AlertSink,
{
    pub fn new(client: Arc<C>, processor: BlockProcessor<C, S>, policy: RetryPolicy) -> Self {
        Self {
            client,
            processor,
            policy,
            state: ConsumerState::Disconnected,
            retry_count: 0,
            stats: ConsumerStats::default(),
        }
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    pub fn stats(&self) -> &ConsumerStats {
        &self.stats
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Drives the subscription until shutdown is signalled or reconnection
    /// attempts run out.
    #[instrument(skip_all, fields(max_retries = self.policy.max_retries))]
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) -> ConsumerExit {
        let mut subscription: Option<BlockSubscription> = None;

        loop {
            match self.state {
                ConsumerState::Disconnected | ConsumerState::Connecting => {
                    self.state = ConsumerState::Connecting;
                    info!("🔗 Subscribing to new blocks");

                    let result = tokio::select! {
                        _ = shutdown.recv() => return self.stop(subscription.take()),
                        result = self.client.subscribe_new_blocks() => result,
                    };
                    match result {
                        Ok(active) => {
                            info!("✅ Subscribed to new blocks");
                            subscription = Some(active);
                            self.state = ConsumerState::Subscribed;
                        }
                        Err(e) => {
                            error!(error = %e, "❌ Failed to subscribe to new blocks");
                            self.begin_backoff();
                        }
                    }
                }

                ConsumerState::Subscribed => {
                    let Some(active) = subscription.as_mut() else {
                        self.state = ConsumerState::Disconnected;
                        continue;
                    };

                    let wake = tokio::select! {
                        _ = shutdown.recv() => Wake::Shutdown,
                        event = active.next() => Wake::Event(event),
                    };

                    match wake {
                        Wake::Shutdown => return self.stop(subscription.take()),
                        Wake::Event(Some(Ok(header))) => {
                            if let Err(e) = self.handle_block(header.number).await {
                                warn!(block = header.number, error = %e, "⚠️ Connection lost while fetching block");
                                Self::drop_subscription(subscription.take());
                                self.begin_backoff();
                            }
                        }
                        Wake::Event(Some(Err(e))) => {
                            warn!(error = %e, "⚠️ Block subscription error");
                            Self::drop_subscription(subscription.take());
                            self.begin_backoff();
                        }
                        Wake::Event(None) => {
                            warn!("⚠️ Block subscription ended");
                            subscription = None;
                            self.begin_backoff();
                        }
                    }
                }

                ConsumerState::Backoff { attempt } => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        "🔄 Reconnecting in {:?} (attempt {}/{})",
                        delay, attempt, self.policy.max_retries
                    );
                    tokio::select! {
                        _ = shutdown.recv() => return self.stop(None),
                        _ = sleep(delay) => self.state = ConsumerState::Connecting,
                    }
                }

                ConsumerState::Exhausted => {
                    error!(
                        retries = self.retry_count,
                        "❌ Max reconnection attempts reached, giving up"
                    );
                    return ConsumerExit::Exhausted;
                }
            }
        }
    }

    /// Fetches and processes one block. Only transport-class fetch failures
    /// are returned; anything else skips the block.
    async fn handle_block(&mut self, block_number: u64) -> Result<(), ChainError> {
        let block = match self.client.get_block_with_transactions(block_number).await {
            Ok(block) => block,
            Err(e) if e.is_transport() => return Err(e),
            Err(e) => {
                warn!(block = block_number, error = %e, "⚠️ Skipping block");
                self.stats.blocks_skipped += 1;
                return Ok(());
            }
        };
        self.retry_count = 0;

        let report = self.processor.process_block(&block, block_number).await;
        self.stats.blocks_processed += 1;
        self.stats.alerts_emitted += report.alerts as u64;
        debug!(
            block = block_number,
            alerts = report.alerts,
            failed = report.failed,
            "Block processed"
        );
        Ok(())
    }

    fn begin_backoff(&mut self) {
        if self.retry_count < self.policy.max_retries {
            self.retry_count += 1;
            self.stats.reconnect_attempts += 1;
            self.state = ConsumerState::Backoff {
                attempt: self.retry_count,
            };
        } else {
            self.state = ConsumerState::Exhausted;
        }
    }

    fn drop_subscription(subscription: Option<BlockSubscription>) {
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
    }

    fn stop(&mut self, subscription: Option<BlockSubscription>) -> ConsumerExit {
        info!("🛑 Block stream consumer shutting down");
        Self::drop_subscription(subscription);
        self.state = ConsumerState::Disconnected;
        ConsumerExit::Shutdown
    }
}
