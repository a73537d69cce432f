use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{debug, instrument, warn};

use crate::core::SpamAlert;

/// Anything that accepts structured spam alerts.
pub trait AlertSink: Send + Sync {
    fn emit(&self, alert: &SpamAlert) -> Result<()>;
}

/// Fan-out of spam alerts to any number of subscribers (console renderer,
/// log shippers, tests).
#[derive(Debug, Clone)]
pub struct AlertBus {
    tx: broadcast::Sender<SpamAlert>,
}

impl Default for AlertBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl AlertBus {
    #[instrument]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        debug!("AlertBus initialized with capacity: {}", capacity);
        Self { tx }
    }

    /// Publishes to every current subscriber; fails when nobody listens.
    #[instrument(skip(self, alert))]
    pub fn publish(&self, alert: SpamAlert) -> Result<usize> {
        let from = alert.from_address.clone();
        let method = alert.method_name.clone();
        let occurrences = alert.occurrence_count;
        let block_span = alert.block_span;
        let tokens = alert.tokens.len();
        let tx_hash = alert.tx_hash.clone();

        match self.tx.send(alert) {
            Ok(subscriber_count) => {
                warn!(
                    from = %from,
                    method = %method,
                    occurrences = occurrences,
                    block_span = block_span,
                    tokens = tokens,
                    tx_hash = %tx_hash,
                    subscriber_count = subscriber_count,
                    "🚨 Spam alert"
                );
                Ok(subscriber_count)
            }
            Err(e) => {
                warn!(
                    from = %from,
                    tx_hash = %tx_hash,
                    error = %e,
                    "Failed to publish alert"
                );
                Err(e.into())
            }
        }
    }

    #[instrument(skip(self))]
    pub fn subscribe(&self) -> broadcast::Receiver<SpamAlert> {
        let receiver = self.tx.subscribe();
        debug!("New subscriber added to alert bus");
        receiver
    }
}

impl AlertSink for AlertBus {
    fn emit(&self, alert: &SpamAlert) -> Result<()> {
        self.publish(alert.clone()).map(|_| ())
    }
}
