use std::sync::Arc;

use crate::config::MethodTable;

/// Length of a `0x`-prefixed 4-byte selector in hex characters.
pub const SELECTOR_HEX_LEN: usize = 10;

/// Matches transaction calldata against the known selector table.
#[derive(Debug, Clone)]
pub struct MethodClassifier {
    table: Arc<MethodTable>,
}

impl MethodClassifier {
    pub fn new(table: Arc<MethodTable>) -> Self {
        Self { table }
    }

    /// Lower-cased selector of `calldata` when it is a tracked method.
    pub fn classify(&self, calldata: &str) -> Option<String> {
        let selector = calldata.get(..SELECTOR_HEX_LEN)?.to_lowercase();
        self.table.contains(&selector).then_some(selector)
    }

    pub fn method_name(&self, selector: &str) -> Option<&str> {
        self.table.name(selector)
    }

    pub fn table(&self) -> &MethodTable {
        &self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> MethodClassifier {
        let table: MethodTable = [
            ("0x7ff36ab5", "swapExactETHForTokens"),
            ("0xabcdef01", "snipe"),
        ]
        .into_iter()
        .collect();
        MethodClassifier::new(Arc::new(table))
    }

    #[test]
    fn test_short_calldata_has_no_selector() {
        let classifier = classifier();
        for input in ["", "0x", "0x7ff36a", "0x7ff36ab"] {
            assert_eq!(classifier.classify(input), None, "input {input:?}");
        }
    }

    #[test]
    fn test_exact_selector_without_arguments() {
        assert_eq!(classifier().classify("0x7ff36ab5").as_deref(), Some("0x7ff36ab5"));
    }

    #[test]
    fn test_classification_ignores_case() {
        let classifier = classifier();
        let upper = classifier.classify("0xABCDEF01000000000000000000000000");
        let lower = classifier.classify("0xabcdef01000000000000000000000000");
        assert_eq!(upper.as_deref(), Some("0xabcdef01"));
        assert_eq!(upper, lower);
    }

    #[test]
    fn test_unknown_selector_in_any_case() {
        let classifier = classifier();
        assert_eq!(classifier.classify("0xdeadbeef00"), None);
        assert_eq!(classifier.classify("0xDEADBEEF00"), None);
    }

    #[test]
    fn test_method_name_lookup() {
        assert_eq!(
            classifier().method_name("0x7ff36ab5"),
            Some("swapExactETHForTokens")
        );
    }
}
