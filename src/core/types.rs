use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// New-head notification payload. Only the number drives processing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BlockHeader {
    #[serde(deserialize_with = "quantity::deserialize_u64")]
    pub number: u64,
    #[serde(default)]
    pub hash: Option<String>,
}

impl BlockHeader {
    pub fn new(number: u64) -> Self {
        Self { number, hash: None }
    }
}

/// Full block body as returned by `eth_getBlockByNumber(n, true)`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockWithTransactions {
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

/// Transaction fields consumed by the classifier. Everything except `from`
/// and `input` is carried through to alerts untouched.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: String,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub input: String,
    #[serde(default, deserialize_with = "quantity::deserialize_optional_u256")]
    pub max_fee_per_gas: Option<U256>,
    #[serde(default, deserialize_with = "quantity::deserialize_optional_u256")]
    pub max_priority_fee_per_gas: Option<U256>,
}

/// ERC20 probe outcome attached to an alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub address: String,
    #[serde(rename = "isERC20")]
    pub is_erc20: bool,
    pub total_supply: String,
}

/// Structured spam alert handed to the alert sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpamAlert {
    pub from_address: String,
    pub to_address: Option<String>,
    pub tx_hash: String,
    pub selector: String,
    pub method_name: String,
    pub occurrence_count: u64,
    pub block_span: i64,
    pub first_block: u64,
    pub current_block: u64,
    pub fee_gwei: String,
    pub priority_fee_gwei: String,
    pub tokens: Vec<TokenInfo>,
    pub detected_at: DateTime<Utc>,
}

/// Hex quantity decoding for JSON-RPC fields (`"0x1b4"`).
pub mod quantity {
    use super::*;

    pub fn parse_u64(value: &str) -> Result<u64, String> {
        let digits = strip_prefix(value)?;
        if digits.is_empty() {
            return Ok(0);
        }
        u64::from_str_radix(digits, 16).map_err(|e| format!("invalid quantity {value}: {e}"))
    }

    pub fn parse_u256(value: &str) -> Result<U256, String> {
        let digits = strip_prefix(value)?;
        if digits.is_empty() {
            return Ok(U256::ZERO);
        }
        U256::from_str_radix(digits, 16).map_err(|e| format!("invalid quantity {value}: {e}"))
    }

    fn strip_prefix(value: &str) -> Result<&str, String> {
        value
            .strip_prefix("0x")
            .or_else(|| value.strip_prefix("0X"))
            .ok_or_else(|| format!("quantity {value} is missing the 0x prefix"))
    }

    pub fn deserialize_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_u64(&raw).map_err(serde::de::Error::custom)
    }

    pub fn deserialize_optional_u256<'de, D>(deserializer: D) -> Result<Option<U256>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|value| parse_u256(&value).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_header_number_is_hex_quantity() {
        let header: BlockHeader = serde_json::from_value(json!({
            "number": "0x1b4",
            "hash": "0xabc",
            "parentHash": "0xdef"
        }))
        .unwrap();
        assert_eq!(header.number, 436);
        assert_eq!(header.hash.as_deref(), Some("0xabc"));
    }

    #[test]
    fn test_legacy_transaction_has_no_fee_caps() {
        let tx: Transaction = serde_json::from_value(json!({
            "hash": "0x01",
            "from": "0xAbC0000000000000000000000000000000000001",
            "to": null,
            "input": "0x",
            "gasPrice": "0x3b9aca00"
        }))
        .unwrap();
        assert_eq!(tx.to, None);
        assert_eq!(tx.max_fee_per_gas, None);
        assert_eq!(tx.max_priority_fee_per_gas, None);
    }

    #[test]
    fn test_eip1559_fee_caps_decode() {
        let tx: Transaction = serde_json::from_value(json!({
            "hash": "0x02",
            "from": "0x0000000000000000000000000000000000000002",
            "to": "0x0000000000000000000000000000000000000003",
            "input": "0x7ff36ab5",
            "maxFeePerGas": "0x77359400",
            "maxPriorityFeePerGas": "0x3b9aca00"
        }))
        .unwrap();
        assert_eq!(tx.max_fee_per_gas, Some(U256::from(2_000_000_000u64)));
        assert_eq!(tx.max_priority_fee_per_gas, Some(U256::from(1_000_000_000u64)));
    }

    #[test]
    fn test_quantity_rejects_missing_prefix() {
        assert!(quantity::parse_u64("1b4").is_err());
        assert_eq!(quantity::parse_u64("0x").unwrap(), 0);
    }

    #[test]
    fn test_alert_serializes_camel_case() {
        let alert = SpamAlert {
            from_address: "0xaa".into(),
            to_address: None,
            tx_hash: "0x01".into(),
            selector: "0x7ff36ab5".into(),
            method_name: "swapExactETHForTokens".into(),
            occurrence_count: 2,
            block_span: 3,
            first_block: 10,
            current_block: 13,
            fee_gwei: "0".into(),
            priority_fee_gwei: "0".into(),
            tokens: vec![TokenInfo {
                address: "0xbb".into(),
                is_erc20: true,
                total_supply: "1".into(),
            }],
            detected_at: Utc::now(),
        };
        let value = serde_json::to_value(&alert).unwrap();
        assert_eq!(value["fromAddress"], "0xaa");
        assert_eq!(value["occurrenceCount"], 2);
        assert_eq!(value["tokens"][0]["isERC20"], true);
    }
}
