//! Per-address sliding-window activity store
//!
//! One tracker instance owns the whole store; it lives inside the block
//! processor and is only touched from block processing, which runs one block
//! at a time.

use std::collections::HashMap;
use tracing::debug;

/// Invocation counter for one (address, selector) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodCounter {
    pub count: u64,
    /// Block of the first occurrence in the current streak
    pub first_block: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressActivity {
    pub last_seen_block: u64,
    method_counts: HashMap<String, MethodCounter>,
}

impl AddressActivity {
    pub fn counter(&self, selector: &str) -> Option<MethodCounter> {
        self.method_counts.get(selector).copied()
    }

    pub fn methods(&self) -> impl Iterator<Item = (&str, &MethodCounter)> {
        self.method_counts.iter().map(|(s, c)| (s.as_str(), c))
    }
}

#[derive(Debug, Clone)]
pub struct ActivityTracker {
    block_range: u64,
    store: HashMap<String, AddressActivity>,
}

impl ActivityTracker {
    pub fn new(block_range: u64) -> Self {
        Self {
            block_range,
            store: HashMap::new(),
        }
    }

    pub fn block_range(&self) -> u64 {
        self.block_range
    }

    /// Drops every address last seen strictly before
    /// `current_block - block_range`. Returns how many were dropped.
    pub fn evict_stale(&mut self, current_block: u64) -> usize {
        let Some(cutoff) = current_block.checked_sub(self.block_range) else {
            return 0;
        };
        let before = self.store.len();
        self.store.retain(|_, activity| activity.last_seen_block >= cutoff);
        before - self.store.len()
    }

    /// Counts one invocation of `selector` by `address` at `current_block` and
    /// returns the updated counter.
    pub fn record(&mut self, address: &str, selector: &str, current_block: u64) -> MethodCounter {
        let address = address.to_lowercase();
        let activity = self.store.entry(address.clone()).or_default();
        activity.last_seen_block = current_block;

        let counter = activity
            .method_counts
            .entry(selector.to_string())
            .and_modify(|counter| counter.count += 1)
            .or_insert(MethodCounter {
                count: 1,
                first_block: current_block,
            });

        if counter.count > 1 {
            debug!(
                address = %address,
                selector = selector,
                count = counter.count,
                first_block = counter.first_block,
                "Method repetition detected"
            );
        }
        *counter
    }

    pub fn get(&self, address: &str) -> Option<&AddressActivity> {
        self.store.get(&address.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    const SWAP: &str = "0x7ff36ab5";

    #[test]
    fn test_first_record_starts_streak() {
        let mut tracker = ActivityTracker::new(20);
        let counter = tracker.record("0xAA", SWAP, 100);
        assert_eq!(counter, MethodCounter { count: 1, first_block: 100 });
        assert_eq!(tracker.get("0xaa").unwrap().last_seen_block, 100);
    }

    #[test]
    fn test_repeat_keeps_first_block() {
        let mut tracker = ActivityTracker::new(20);
        tracker.record("0xaa", SWAP, 100);
        let counter = tracker.record("0xaa", SWAP, 107);
        assert_eq!(counter, MethodCounter { count: 2, first_block: 100 });
        assert_eq!(tracker.get("0xaa").unwrap().last_seen_block, 107);
    }

    #[test]
    fn test_addresses_are_case_insensitive() {
        let mut tracker = ActivityTracker::new(20);
        tracker.record("0xAbC", SWAP, 1);
        let counter = tracker.record("0xabc", SWAP, 2);
        assert_eq!(counter.count, 2);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_counters_not_shared() {
        let mut tracker = ActivityTracker::new(20);
        tracker.record("0xaa", SWAP, 1);
        tracker.record("0xbb", SWAP, 2);
        let other = tracker.record("0xaa", "0x38ed1739", 3);

        assert_eq!(other, MethodCounter { count: 1, first_block: 3 });
        assert_eq!(tracker.get("0xbb").unwrap().counter(SWAP).unwrap().count, 1);
        assert_eq!(tracker.get("0xaa").unwrap().methods().count(), 2);
    }

    #[test]
    fn test_eviction_boundary_is_strict() {
        let mut tracker = ActivityTracker::new(20);
        tracker.record("0xstale", SWAP, 79);
        tracker.record("0xedge", SWAP, 80);
        tracker.record("0xfresh", SWAP, 95);

        assert_eq!(tracker.evict_stale(100), 1);
        assert!(tracker.get("0xstale").is_none());
        assert!(tracker.get("0xedge").is_some());
        assert!(tracker.get("0xfresh").is_some());
        assert!(tracker.stale_addresses(100).is_empty());
    }

    #[test]
    fn test_early_blocks_evict_nothing() {
        let mut tracker = ActivityTracker::new(20);
        tracker.record("0xaa", SWAP, 0);
        assert_eq!(tracker.evict_stale(5), 0);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_eviction_resets_streak() {
        let mut tracker = ActivityTracker::new(20);
        tracker.record("0xaa", SWAP, 100);
        tracker.evict_stale(121);
        let counter = tracker.record("0xaa", SWAP, 121);
        assert_eq!(counter, MethodCounter { count: 1, first_block: 121 });
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_repetition_log_names_address() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut tracker = ActivityTracker::new(20);
            tracker.record("0xAbC", SWAP, 1);
            tracker.record("0xabc", SWAP, 2);
        });

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Method repetition detected"), "{output}");
        assert!(output.contains("address=0xabc"), "{output}");
        assert_eq!(output.matches("Method repetition detected").count(), 1);
    }

    impl ActivityTracker {
        /// Addresses that violate the eviction invariant for `current_block`.
        fn stale_addresses(&self, current_block: u64) -> Vec<&str> {
            let cutoff = current_block.saturating_sub(self.block_range);
            self.store
                .iter()
                .filter(|(_, a)| a.last_seen_block < cutoff)
                .map(|(address, _)| address.as_str())
                .collect()
        }
    }
}
