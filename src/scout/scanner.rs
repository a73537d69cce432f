use alloy_primitives::U256;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::core::{ChainError, TokenInfo};
use crate::ingest::client::ChainClient;
use crate::scout::filter::SELECTOR_HEX_LEN;
use crate::util::units::format_ether;

/// `totalSupply()`
pub const TOTAL_SUPPLY_SELECTOR: [u8; 4] = [0x18, 0x16, 0x0d, 0xdd];

const WORD_HEX_LEN: usize = 64;
const ADDRESS_HEX_LEN: usize = 40;

/// Best-effort scan of ABI-encoded arguments for addresses: every full 32-byte
/// word after the selector contributes its low 20 bytes when they are valid
/// hex and not the zero address. Not an ABI decoder; values that merely look
/// like addresses are kept and addresses inside dynamic payloads are missed.
///
/// Results are lower-cased and unique, in first-seen order.
pub fn extract_candidate_addresses(calldata: &str) -> Vec<String> {
    let Some(arguments) = calldata.as_bytes().get(SELECTOR_HEX_LEN..) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    for word in arguments.chunks(WORD_HEX_LEN) {
        if word.len() != WORD_HEX_LEN {
            continue;
        }
        let low = &word[WORD_HEX_LEN - ADDRESS_HEX_LEN..];
        if !low.iter().all(u8::is_ascii_hexdigit) || low.iter().all(|b| *b == b'0') {
            continue;
        }
        let address = format!("0x{}", String::from_utf8_lossy(low).to_lowercase());
        if seen.insert(address.clone()) {
            candidates.push(address);
        }
    }
    candidates
}

/// Classifies addresses as ERC20 contracts by bytecode presence and a
/// nonzero `totalSupply()`. Every failure resolves to "not ERC20".
pub struct TokenClassifier<C: ?Sized> {
    client: Arc<C>,
    ignored: HashSet<String>,
}

impl<C: ChainClient + ?Sized> TokenClassifier<C> {
    pub fn new(client: Arc<C>, ignored: HashSet<String>) -> Self {
        let ignored = ignored.into_iter().map(|a| a.to_lowercase()).collect();
        Self { client, ignored }
    }

    /// Returns whether `address` is an ERC20 together with its total supply
    /// in 18-decimal units (empty when not a token).
    #[instrument(skip(self))]
    pub async fn is_erc20(&self, address: &str) -> (bool, String) {
        let address = address.to_lowercase();
        if self.ignored.contains(&address) {
            debug!(address = %address, "Skipping ignored address");
            return (false, String::new());
        }

        match self.probe_total_supply(&address).await {
            Ok(Some(supply)) => (true, format_ether(supply)),
            Ok(None) => (false, String::new()),
            Err(e) => {
                debug!(address = %address, error = %e, "ERC20 probe failed, treating as non-token");
                (false, String::new())
            }
        }
    }

    async fn probe_total_supply(&self, address: &str) -> Result<Option<U256>, ChainError> {
        let code = self.client.get_bytecode(address).await?;
        if code.map_or(true, |code| code.is_empty()) {
            return Ok(None);
        }

        let result = self.client.call(address, &TOTAL_SUPPLY_SELECTOR).await?;
        if result.is_empty() {
            return Ok(None);
        }
        let supply = U256::try_from_be_slice(&result).ok_or_else(|| {
            ChainError::Decode(format!("totalSupply returned {} bytes", result.len()))
        })?;

        // Zero supply is indistinguishable from a non-token contract here
        Ok((!supply.is_zero()).then_some(supply))
    }

    /// Probes every candidate in `calldata` one at a time and keeps the tokens.
    pub async fn analyze_tokens(&self, calldata: &str) -> Vec<TokenInfo> {
        let mut tokens = Vec::new();
        for address in extract_candidate_addresses(calldata) {
            let (is_erc20, total_supply) = self.is_erc20(&address).await;
            if is_erc20 {
                tokens.push(TokenInfo {
                    address,
                    is_erc20,
                    total_supply,
                });
            }
        }
        tokens
    }
}
