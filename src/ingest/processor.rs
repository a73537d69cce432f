use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::{AppConfig, MethodTable};
use crate::core::{BlockWithTransactions, SpamAlert, Transaction};
use crate::ingest::client::ChainClient;
use crate::scout::{MethodClassifier, TokenClassifier};
use crate::stalker::{ActivityTracker, SpamDetector};
use crate::transport::AlertSink;
use crate::util::units::format_gwei;

/// Summary of one processed block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockReport {
    pub block_number: u64,
    pub transactions: usize,
    pub evicted: usize,
    pub alerts: usize,
    pub failed: usize,
}

/// Runs classification over every transaction of a block and emits alerts.
///
/// Owns the activity store; blocks must be fed one at a time.
pub struct BlockProcessor<C: ?Sized, S> {
    classifier: MethodClassifier,
    tracker: ActivityTracker,
    detector: SpamDetector,
    tokens: TokenClassifier<C>,
    sink: S,
}

impl<C, S> BlockProcessor<C, S>
where
    C: ChainClient + ?Sized,
    S: AlertSink,
{
    pub fn new(
        classifier: MethodClassifier,
        tracker: ActivityTracker,
        detector: SpamDetector,
        tokens: TokenClassifier<C>,
        sink: S,
    ) -> Self {
        Self {
            classifier,
            tracker,
            detector,
            tokens,
            sink,
        }
    }

    pub fn from_config(config: &AppConfig, methods: Arc<MethodTable>, client: Arc<C>, sink: S) -> Self {
        Self::new(
            MethodClassifier::new(methods),
            ActivityTracker::new(config.monitor.block_range),
            SpamDetector::from_config(&config.monitor),
            TokenClassifier::new(client, config.erc20.ignored_set()),
            sink,
        )
    }

    pub fn tracker(&self) -> &ActivityTracker {
        &self.tracker
    }

    /// Evicts stale activity, then classifies each transaction in order. A
    /// failing transaction is logged and skipped, so a block always completes.
    #[instrument(skip(self, block), fields(transactions = block.transactions.len()))]
    pub async fn process_block(
        &mut self,
        block: &BlockWithTransactions,
        block_number: u64,
    ) -> BlockReport {
        info!("🆕 Block #{} ({} transactions)", block_number, block.transactions.len());

        let evicted = self.tracker.evict_stale(block_number);
        if evicted > 0 {
            debug!(evicted = evicted, tracked = self.tracker.len(), "Evicted stale activity");
        }

        let mut report = BlockReport {
            block_number,
            transactions: block.transactions.len(),
            evicted,
            ..Default::default()
        };

        for tx in &block.transactions {
            match self.process_transaction(tx, block_number).await {
                Ok(Some(_)) => report.alerts += 1,
                Ok(None) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(tx_hash = %tx.hash, error = %e, "⚠️ Error processing transaction");
                }
            }
        }

        report
    }

    /// Records the transaction's method call and, on a spam verdict, emits an
    /// alert enriched with the ERC20 tokens referenced in its calldata.
    pub async fn process_transaction(
        &mut self,
        tx: &Transaction,
        block_number: u64,
    ) -> Result<Option<SpamAlert>> {
        let Some(selector) = self.classifier.classify(&tx.input) else {
            return Ok(None);
        };

        let from = tx.from.to_lowercase();
        let counter = self.tracker.record(&from, &selector, block_number);
        let verdict = self.detector.evaluate(counter, block_number);
        if !verdict.is_spam {
            return Ok(None);
        }

        let tokens = self.tokens.analyze_tokens(&tx.input).await;
        let alert = SpamAlert {
            from_address: from,
            to_address: tx.to.clone(),
            tx_hash: tx.hash.clone(),
            method_name: self
                .classifier
                .method_name(&selector)
                .unwrap_or_default()
                .to_string(),
            selector,
            occurrence_count: counter.count,
            block_span: verdict.block_span,
            first_block: counter.first_block,
            current_block: block_number,
            fee_gwei: format_gwei(tx.max_fee_per_gas.unwrap_or_default()),
            priority_fee_gwei: format_gwei(tx.max_priority_fee_per_gas.unwrap_or_default()),
            tokens,
            detected_at: Utc::now(),
        };

        self.sink
            .emit(&alert)
            .with_context(|| format!("failed to emit alert for {}", tx.hash))?;
        Ok(Some(alert))
    }
}
