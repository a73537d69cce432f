//! Scripted in-memory chain client for tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::{mpsc, oneshot};

use super::client::{BlockSubscription, ChainClient};
use crate::core::{BlockHeader, BlockWithTransactions, ChainError, Transaction};

/// What the next `subscribe_new_blocks` call does.
pub(crate) enum SubscribeScript {
    Fail(ChainError),
    /// Deliver `events`; when `keep_open` the stream then stays silent,
    /// otherwise it ends.
    Events {
        events: Vec<Result<BlockHeader, ChainError>>,
        keep_open: bool,
    },
}

#[derive(Default)]
pub(crate) struct MockChainClient {
    scripts: Mutex<VecDeque<SubscribeScript>>,
    blocks: Mutex<HashMap<u64, Result<BlockWithTransactions, ChainError>>>,
    bytecode: Mutex<HashMap<String, Result<Option<Vec<u8>>, ChainError>>>,
    call_results: Mutex<HashMap<String, Result<Vec<u8>, ChainError>>>,
    open_senders: Mutex<Vec<mpsc::UnboundedSender<Result<BlockHeader, ChainError>>>>,
    cancellations: Mutex<Vec<oneshot::Receiver<()>>>,
    pub subscribe_calls: AtomicUsize,
    pub fetched_blocks: Mutex<Vec<u64>>,
    pub bytecode_requests: Mutex<Vec<String>>,
    pub call_requests: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscription(self, script: SubscribeScript) -> Self {
        self.scripts.lock().unwrap().push_back(script);
        self
    }

    pub fn with_block(self, number: u64, transactions: Vec<Transaction>) -> Self {
        self.blocks
            .lock()
            .unwrap()
            .insert(number, Ok(BlockWithTransactions { transactions }));
        self
    }

    pub fn with_block_error(self, number: u64, error: ChainError) -> Self {
        self.blocks.lock().unwrap().insert(number, Err(error));
        self
    }

    pub fn with_bytecode(self, address: &str, code: Result<Option<Vec<u8>>, ChainError>) -> Self {
        self.bytecode.lock().unwrap().insert(address.to_lowercase(), code);
        self
    }

    pub fn with_call_result(self, address: &str, result: Result<Vec<u8>, ChainError>) -> Self {
        self.call_results
            .lock()
            .unwrap()
            .insert(address.to_lowercase(), result);
        self
    }

    /// Registers a contract whose `totalSupply()` returns `supply` as a
    /// 32-byte big-endian word.
    pub fn with_token(self, address: &str, supply: u128) -> Self {
        let mut word = vec![0u8; 16];
        word.extend_from_slice(&supply.to_be_bytes());
        self.with_bytecode(address, Ok(Some(vec![0x60, 0x80, 0x60, 0x40])))
            .with_call_result(address, Ok(word))
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    /// Subscriptions that were explicitly unsubscribed.
    pub fn unsubscribed_count(&self) -> usize {
        self.cancellations
            .lock()
            .unwrap()
            .iter_mut()
            .filter_map(|cancel| cancel.try_recv().ok())
            .count()
    }

    pub fn network_requests(&self) -> usize {
        self.bytecode_requests.lock().unwrap().len() + self.call_requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn subscribe_new_blocks(&self) -> Result<BlockSubscription, ChainError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| SubscribeScript::Fail(ChainError::Transport("refused".into())));

        match script {
            SubscribeScript::Fail(error) => Err(error),
            SubscribeScript::Events { events, keep_open } => {
                let (tx, rx) = mpsc::unbounded_channel();
                let (cancel_tx, cancel_rx) = oneshot::channel();
                for event in events {
                    let _ = tx.send(event);
                }
                if keep_open {
                    self.open_senders.lock().unwrap().push(tx);
                }
                self.cancellations.lock().unwrap().push(cancel_rx);
                Ok(BlockSubscription::new(rx, cancel_tx))
            }
        }
    }

    async fn get_block_with_transactions(
        &self,
        block_number: u64,
    ) -> Result<BlockWithTransactions, ChainError> {
        self.fetched_blocks.lock().unwrap().push(block_number);
        self.blocks
            .lock()
            .unwrap()
            .get(&block_number)
            .cloned()
            .unwrap_or_else(|| Ok(BlockWithTransactions::default()))
    }

    async fn get_bytecode(&self, address: &str) -> Result<Option<Vec<u8>>, ChainError> {
        self.bytecode_requests.lock().unwrap().push(address.to_string());
        self.bytecode
            .lock()
            .unwrap()
            .get(&address.to_lowercase())
            .cloned()
            .unwrap_or(Ok(None))
    }

    async fn call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>, ChainError> {
        self.call_requests
            .lock()
            .unwrap()
            .push((to.to_string(), data.to_vec()));
        self.call_results
            .lock()
            .unwrap()
            .get(&to.to_lowercase())
            .cloned()
            .unwrap_or_else(|| {
                Err(ChainError::Rpc {
                    code: 3,
                    message: "execution reverted".into(),
                })
            })
    }
}
