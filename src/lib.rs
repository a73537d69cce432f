// Shared types and errors
pub mod core;

// Settings and the selector table
pub mod config;

// Block stream, chain client and per-block processing
pub mod ingest;

// Calldata classification and ERC20 probing
pub mod scout;

// Sliding-window repetition tracking
pub mod stalker;

// Alert delivery
pub mod transport;

pub mod util;

// Re-export commonly used types for convenience
pub use crate::core::*;
pub use ingest::{BlockProcessor, EthWebSocketClient, StreamConsumer};
