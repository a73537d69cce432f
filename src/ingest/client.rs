use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::core::{BlockHeader, BlockWithTransactions, ChainError};

/// Read-only chain access consumed by the monitor.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Opens a new-heads subscription.
    async fn subscribe_new_blocks(&self) -> Result<BlockSubscription, ChainError>;

    /// Fetches a block with full transaction bodies.
    async fn get_block_with_transactions(
        &self,
        block_number: u64,
    ) -> Result<BlockWithTransactions, ChainError>;

    /// Deployed bytecode at `address`, `None` when the node reports nothing.
    async fn get_bytecode(&self, address: &str) -> Result<Option<Vec<u8>>, ChainError>;

    /// `eth_call` against the latest block.
    async fn call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>, ChainError>;
}

/// Stream of new-head notifications. Transport errors are delivered in-band;
/// the stream ends when the producer goes away.
///
/// Dropping the subscription cancels it as well.
#[derive(Debug)]
pub struct BlockSubscription {
    events: mpsc::UnboundedReceiver<Result<BlockHeader, ChainError>>,
    cancel: Option<oneshot::Sender<()>>,
}

impl BlockSubscription {
    pub fn new(
        events: mpsc::UnboundedReceiver<Result<BlockHeader, ChainError>>,
        cancel: oneshot::Sender<()>,
    ) -> Self {
        Self {
            events,
            cancel: Some(cancel),
        }
    }

    pub async fn next(&mut self) -> Option<Result<BlockHeader, ChainError>> {
        self.events.recv().await
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            // Receiver already gone means the producer shut down first
            let _ = cancel.send(());
            debug!("Block subscription cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscription_delivers_in_order_then_ends() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (cancel_tx, _cancel_rx) = oneshot::channel();
        let mut subscription = BlockSubscription::new(rx, cancel_tx);

        tx.send(Ok(BlockHeader::new(1))).unwrap();
        tx.send(Err(ChainError::ConnectionClosed)).unwrap();
        drop(tx);

        assert_eq!(subscription.next().await, Some(Ok(BlockHeader::new(1))));
        assert_eq!(subscription.next().await, Some(Err(ChainError::ConnectionClosed)));
        assert_eq!(subscription.next().await, None);
    }

    #[tokio::test]
    async fn test_unsubscribe_signals_producer() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        BlockSubscription::new(rx, cancel_tx).unsubscribe();
        assert!(cancel_rx.await.is_ok());
    }
}
