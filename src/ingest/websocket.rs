use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::time::{timeout, Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use super::client::{BlockSubscription, ChainClient};
use crate::core::{BlockHeader, BlockWithTransactions, ChainError};

/// Configuration for the Ethereum WebSocket connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// JSON-RPC WebSocket endpoint (e.g. "wss://base-rpc.publicnode.com")
    pub url: String,
    /// Reconnection attempts before the stream consumer gives up
    pub max_retries: u32,
    /// Base reconnection delay, multiplied by the attempt number
    pub retry_delay_ms: u64,
    /// Connection handshake timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Per-request response timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Ping interval to keep the connection alive
    pub heartbeat_interval_ms: u64,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: "wss://base-rpc.publicnode.com".to_string(),
            max_retries: 5,
            retry_delay_ms: 5000,
            connect_timeout_ms: 30000,
            request_timeout_ms: 15000,
            heartbeat_interval_ms: 30000,
        }
    }
}

/// JSON-RPC request sent over the socket
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

/// JSON-RPC response to a request
#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    pub id: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

/// `eth_subscription` push message
#[derive(Debug, Deserialize)]
pub struct SubscriptionNotification {
    pub method: String,
    pub params: SubscriptionParams,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionParams {
    pub subscription: String,
    pub result: Value,
}

/// Anything the node may send. Notifications are tried first since every
/// response field is optional.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IncomingMessage {
    Notification(SubscriptionNotification),
    Response(JsonRpcResponse),
}

/// Connection state for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

/// Statistics for monitoring WebSocket performance
#[derive(Debug, Clone)]
pub struct ConnectionStats {
    pub state: ConnectionState,
    pub url: String,
    pub connection_attempts: u32,
    pub successful_connections: u32,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub subscriptions_active: usize,
    pub last_message_time: Option<Instant>,
}

type ResponseSender = oneshot::Sender<Result<Value, ChainError>>;
type HeaderSender = mpsc::UnboundedSender<Result<BlockHeader, ChainError>>;

/// One live socket with its in-flight requests and subscriptions.
struct Connection {
    outgoing: mpsc::UnboundedSender<Message>,
    pending: Arc<Mutex<HashMap<u64, ResponseSender>>>,
    subscriptions: Arc<Mutex<HashMap<String, HeaderSender>>>,
    closed: Arc<AtomicBool>,
    request_id: Arc<AtomicU64>,
    request_timeout_ms: u64,
    stats: Arc<RwLock<ConnectionStats>>,
}

impl Connection {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        if self.is_closed() {
            return Err(ChainError::ConnectionClosed);
        }

        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        };
        let message = serde_json::to_string(&request)
            .map_err(|e| ChainError::Decode(format!("failed to serialize {method}: {e}")))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        debug!(id = id, method = method, "Sending JSON-RPC request");
        if self.outgoing.send(Message::Text(message)).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(ChainError::ConnectionClosed);
        }
        self.stats.write().await.messages_sent += 1;

        match timeout(Duration::from_millis(self.request_timeout_ms), rx).await {
            Ok(Ok(result)) => result,
            // Sender dropped: the reader shut down without answering
            Ok(Err(_)) => Err(ChainError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                warn!(id = id, method = method, "JSON-RPC request timed out");
                Err(ChainError::Timeout(self.request_timeout_ms))
            }
        }
    }
}

/// JSON-RPC client for an Ethereum-compatible node over a single WebSocket.
///
/// The socket is opened lazily by the first request and re-opened on demand
/// once it closes; callers never hold a connection across a reconnect.
pub struct EthWebSocketClient {
    config: WebSocketConfig,
    request_id: Arc<AtomicU64>,
    connection: Mutex<Option<Arc<Connection>>>,
    state: Arc<RwLock<ConnectionState>>,
    stats: Arc<RwLock<ConnectionStats>>,
}

impl std::fmt::Debug for EthWebSocketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EthWebSocketClient")
            .field("config", &self.config)
            .field("request_id", &self.request_id)
            .finish_non_exhaustive()
    }
}

impl EthWebSocketClient {
    #[instrument(skip(config), fields(url = %config.url))]
    pub fn new(config: WebSocketConfig) -> Self {
        info!("Initializing Ethereum WebSocket client");

        let stats = ConnectionStats {
            state: ConnectionState::Disconnected,
            url: config.url.clone(),
            connection_attempts: 0,
            successful_connections: 0,
            messages_sent: 0,
            messages_received: 0,
            subscriptions_active: 0,
            last_message_time: None,
        };

        Self {
            config,
            request_id: Arc::new(AtomicU64::new(1)),
            connection: Mutex::new(None),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            stats: Arc::new(RwLock::new(stats)),
        }
    }

    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub async fn stats(&self) -> ConnectionStats {
        self.stats.read().await.clone()
    }

    /// Closes the socket if one is open. A later request reconnects.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) {
        let Some(connection) = self.connection.lock().await.take() else {
            return;
        };
        connection.closed.store(true, Ordering::SeqCst);
        if connection.outgoing.send(Message::Close(None)).is_ok() {
            info!("🔌 Closing WebSocket connection to {}", self.config.url);
        }
        Self::set_state(&self.state, &self.stats, ConnectionState::Disconnected).await;
    }

    /// Current connection, opening a new one when none is usable.
    async fn connection(&self) -> Result<Arc<Connection>, ChainError> {
        let mut slot = self.connection.lock().await;
        if let Some(connection) = slot.as_ref() {
            if !connection.is_closed() {
                return Ok(connection.clone());
            }
            debug!("Previous WebSocket connection closed, reconnecting");
        }

        let connection = Arc::new(self.connect().await?);
        *slot = Some(connection.clone());
        Ok(connection)
    }

    #[instrument(skip(self), fields(url = %self.config.url))]
    async fn connect(&self) -> Result<Connection, ChainError> {
        info!("Attempting to connect to WebSocket RPC");
        Self::set_state(&self.state, &self.stats, ConnectionState::Connecting).await;
        self.stats.write().await.connection_attempts += 1;

        let connected = match Self::open_socket(&self.config).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(error = %e, "WebSocket connection failed");
                Self::set_state(&self.state, &self.stats, ConnectionState::Failed).await;
                return Err(e);
            }
        };

        Self::set_state(&self.state, &self.stats, ConnectionState::Connected).await;
        {
            let mut stats = self.stats.write().await;
            stats.successful_connections += 1;
            stats.last_message_time = Some(Instant::now());
        }

        let (mut ws_sender, mut ws_receiver) = connected.split();
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        let pending: Arc<Mutex<HashMap<u64, ResponseSender>>> = Arc::default();
        let subscriptions: Arc<Mutex<HashMap<String, HeaderSender>>> = Arc::default();
        let closed = Arc::new(AtomicBool::new(false));

        // Writer
        {
            let closed = closed.clone();
            tokio::spawn(async move {
                while let Some(message) = outgoing_rx.recv().await {
                    let closing = matches!(message, Message::Close(_));
                    if let Err(e) = ws_sender.send(message).await {
                        error!(error = %e, "Failed to send WebSocket message");
                        closed.store(true, Ordering::SeqCst);
                        break;
                    }
                    if closing {
                        break;
                    }
                }
                debug!("WebSocket sender task completed");
            });
        }

        // Reader
        {
            let pending = pending.clone();
            let subscriptions = subscriptions.clone();
            let closed = closed.clone();
            let state = self.state.clone();
            let stats = self.stats.clone();
            tokio::spawn(async move {
                while let Some(message) = ws_receiver.next().await {
                    match message {
                        Ok(Message::Text(text)) => {
                            {
                                let mut stats = stats.write().await;
                                stats.messages_received += 1;
                                stats.last_message_time = Some(Instant::now());
                            }
                            if let Err(e) = Self::handle_message(&text, &pending, &subscriptions).await {
                                warn!(error = %e, message = %text, "Failed to handle WebSocket message");
                            }
                        }
                        Ok(Message::Close(frame)) => {
                            info!("WebSocket closed: {:?}", frame);
                            break;
                        }
                        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                        Ok(Message::Binary(data)) => {
                            warn!("Received unexpected binary message: {} bytes", data.len());
                        }
                        Err(e) => {
                            error!(error = %e, "WebSocket receive error");
                            break;
                        }
                    }
                }

                closed.store(true, Ordering::SeqCst);
                Self::fail_outstanding(&pending, &subscriptions).await;
                stats.write().await.subscriptions_active = 0;
                Self::set_state(&state, &stats, ConnectionState::Disconnected).await;
                debug!("WebSocket receive loop ended");
            });
        }

        // Heartbeat
        {
            let outgoing = outgoing.clone();
            let closed = closed.clone();
            let period = Duration::from_millis(self.config.heartbeat_interval_ms.max(1));
            tokio::spawn(async move {
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                loop {
                    interval.tick().await;
                    if closed.load(Ordering::SeqCst) || outgoing.send(Message::Ping(Vec::new())).is_err() {
                        debug!("Heartbeat task completed");
                        break;
                    }
                }
            });
        }

        Ok(Connection {
            outgoing,
            pending,
            subscriptions,
            closed,
            request_id: self.request_id.clone(),
            request_timeout_ms: self.config.request_timeout_ms,
            stats: self.stats.clone(),
        })
    }

    async fn open_socket(
        config: &WebSocketConfig,
    ) -> Result<
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
        ChainError,
    > {
        let url = Url::parse(&config.url)
            .map_err(|e| ChainError::Transport(format!("invalid WebSocket URL {}: {e}", config.url)))?;

        let (stream, response) = timeout(
            Duration::from_millis(config.connect_timeout_ms),
            connect_async(url.as_str()),
        )
        .await
        .map_err(|_| ChainError::Timeout(config.connect_timeout_ms))?
        .map_err(|e| ChainError::Transport(e.to_string()))?;

        info!("✅ Connected to {} (HTTP {})", url, response.status());
        Ok(stream)
    }

    /// Routes one text frame to the waiting request or subscription.
    async fn handle_message(
        text: &str,
        pending: &Mutex<HashMap<u64, ResponseSender>>,
        subscriptions: &Mutex<HashMap<String, HeaderSender>>,
    ) -> Result<(), ChainError> {
        let message: IncomingMessage =
            serde_json::from_str(text).map_err(|e| ChainError::Decode(e.to_string()))?;

        match message {
            IncomingMessage::Notification(notification) => {
                if notification.method != "eth_subscription" {
                    debug!("Ignoring notification method: {}", notification.method);
                    return Ok(());
                }
                let header: BlockHeader = serde_json::from_value(notification.params.result)
                    .map_err(|e| ChainError::Decode(format!("bad newHeads payload: {e}")))?;

                let mut subscriptions = subscriptions.lock().await;
                let id = notification.params.subscription;
                if let Some(sender) = subscriptions.get(&id) {
                    if sender.send(Ok(header)).is_err() {
                        subscriptions.remove(&id);
                    }
                } else {
                    debug!(subscription = %id, "Notification for unknown subscription");
                }
            }
            IncomingMessage::Response(response) => {
                let Some(id) = response.id else {
                    return Err(ChainError::Decode("response without id".to_string()));
                };
                let Some(waiter) = pending.lock().await.remove(&id) else {
                    debug!(id = id, "Response for unknown or expired request");
                    return Ok(());
                };
                let result = match response.error {
                    Some(error) => Err(ChainError::Rpc {
                        code: error.code,
                        message: error.message,
                    }),
                    None => Ok(response.result.unwrap_or(Value::Null)),
                };
                let _ = waiter.send(result);
            }
        }
        Ok(())
    }

    async fn fail_outstanding(
        pending: &Mutex<HashMap<u64, ResponseSender>>,
        subscriptions: &Mutex<HashMap<String, HeaderSender>>,
    ) {
        for (_, waiter) in pending.lock().await.drain() {
            let _ = waiter.send(Err(ChainError::ConnectionClosed));
        }
        for (_, sender) in subscriptions.lock().await.drain() {
            let _ = sender.send(Err(ChainError::ConnectionClosed));
        }
    }

    async fn set_state(
        state: &RwLock<ConnectionState>,
        stats: &RwLock<ConnectionStats>,
        next: ConnectionState,
    ) {
        *state.write().await = next;
        stats.write().await.state = next;
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        self.connection().await?.request(method, params).await
    }
}

fn decode_hex_result(value: &Value) -> Result<Vec<u8>, ChainError> {
    let text = value
        .as_str()
        .ok_or_else(|| ChainError::Decode(format!("expected hex string, got {value}")))?;
    let digits = text.strip_prefix("0x").unwrap_or(text);
    hex::decode(digits).map_err(|e| ChainError::Decode(format!("invalid hex {text}: {e}")))
}

#[async_trait]
impl ChainClient for EthWebSocketClient {
    #[instrument(skip(self))]
    async fn subscribe_new_blocks(&self) -> Result<BlockSubscription, ChainError> {
        let connection = self.connection().await?;
        let result = connection.request("eth_subscribe", json!(["newHeads"])).await?;
        let subscription_id = result
            .as_str()
            .ok_or_else(|| ChainError::Decode(format!("unexpected subscription id {result}")))?
            .to_string();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        {
            // The reader marks the connection closed before draining this map
            let mut subscriptions = connection.subscriptions.lock().await;
            if connection.is_closed() {
                warn!(subscription = %subscription_id, "Connection closed before subscription was registered");
                return Err(ChainError::ConnectionClosed);
            }
            subscriptions.insert(subscription_id.clone(), events_tx);
        }
        self.stats.write().await.subscriptions_active += 1;
        info!(subscription = %subscription_id, "📡 Subscribed to new block headers");

        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let stats = self.stats.clone();
        tokio::spawn(async move {
            // Either an explicit unsubscribe or the handle being dropped
            let _ = cancel_rx.await;
            let removed = connection
                .subscriptions
                .lock()
                .await
                .remove(&subscription_id)
                .is_some();
            if !removed || connection.is_closed() {
                return;
            }
            {
                let mut stats = stats.write().await;
                stats.subscriptions_active = stats.subscriptions_active.saturating_sub(1);
            }
            match connection
                .request("eth_unsubscribe", json!([subscription_id]))
                .await
            {
                Ok(_) => debug!(subscription = %subscription_id, "Unsubscribed from new block headers"),
                Err(e) => debug!(subscription = %subscription_id, error = %e, "eth_unsubscribe failed"),
            }
        });

        Ok(BlockSubscription::new(events_rx, cancel_tx))
    }

    #[instrument(skip(self))]
    async fn get_block_with_transactions(
        &self,
        block_number: u64,
    ) -> Result<BlockWithTransactions, ChainError> {
        let result = self
            .request(
                "eth_getBlockByNumber",
                json!([format!("0x{block_number:x}"), true]),
            )
            .await?;
        if result.is_null() {
            return Err(ChainError::BlockNotFound(block_number));
        }
        serde_json::from_value(result)
            .map_err(|e| ChainError::Decode(format!("block {block_number}: {e}")))
    }

    async fn get_bytecode(&self, address: &str) -> Result<Option<Vec<u8>>, ChainError> {
        let result = self.request("eth_getCode", json!([address, "latest"])).await?;
        if result.is_null() {
            return Ok(None);
        }
        let code = decode_hex_result(&result)?;
        Ok((!code.is_empty()).then_some(code))
    }

    async fn call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>, ChainError> {
        let params = json!([{ "to": to, "data": format!("0x{}", hex::encode(data)) }, "latest"]);
        let result = self.request("eth_call", params).await?;
        decode_hex_result(&result)
    }
}
