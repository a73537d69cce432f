use thiserror::Error;

/// Failures surfaced by a chain client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("WebSocket transport failure: {0}")]
    Transport(String),

    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Block {0} not found")]
    BlockNotFound(u64),
}

impl ChainError {
    /// True when the connection itself is unusable and the subscription has to
    /// be re-established. RPC-level failures leave the connection intact.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ChainError::Transport(_) | ChainError::Timeout(_) | ChainError::ConnectionClosed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(ChainError::ConnectionClosed.is_transport());
        assert!(ChainError::Timeout(1500).is_transport());
        assert!(ChainError::Transport("reset".into()).is_transport());

        assert!(!ChainError::BlockNotFound(7).is_transport());
        assert!(!ChainError::Decode("bad".into()).is_transport());
        assert!(!ChainError::Rpc { code: -32000, message: "execution reverted".into() }.is_transport());
    }
}
