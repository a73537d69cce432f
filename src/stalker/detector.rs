use crate::config::MonitorConfig;
use crate::stalker::tracker::MethodCounter;

/// Outcome of the repetition predicate for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpamVerdict {
    pub is_spam: bool,
    /// `current_block - first_block`; negative if blocks arrive out of order
    pub block_span: i64,
}

/// Repetition predicate over a tracker counter.
#[derive(Debug, Clone, Copy)]
pub struct SpamDetector {
    block_range: u64,
    min_consecutive_blocks: u64,
}

impl SpamDetector {
    pub fn new(block_range: u64, min_consecutive_blocks: u64) -> Self {
        Self {
            block_range,
            min_consecutive_blocks,
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.block_range, config.min_consecutive_blocks)
    }

    /// Spam iff the method repeated, the streak fits inside the window, and it
    /// spans at least `min_consecutive_blocks`.
    pub fn evaluate(&self, counter: MethodCounter, current_block: u64) -> SpamVerdict {
        let block_span = current_block as i64 - counter.first_block as i64;
        let is_spam = counter.count > 1
            && block_span <= self.block_range as i64
            && block_span >= self.min_consecutive_blocks as i64;
        SpamVerdict { is_spam, block_span }
    }
}
