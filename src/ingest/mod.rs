pub mod client;
pub mod consumer;
pub mod processor;
pub mod websocket;

#[cfg(test)]
pub(crate) mod mock;

pub use client::{BlockSubscription, ChainClient};
pub use consumer::{ConsumerExit, ConsumerState, ConsumerStats, RetryPolicy, StreamConsumer};
pub use processor::{BlockProcessor, BlockReport};
pub use websocket::{EthWebSocketClient, WebSocketConfig};
