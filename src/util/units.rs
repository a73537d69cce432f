//! Human-readable renderings of wei quantities

use alloy_primitives::utils::format_units;
use alloy_primitives::U256;

pub fn format_ether(value: U256) -> String {
    format_trimmed(value, 18)
}

pub fn format_gwei(value: U256) -> String {
    format_trimmed(value, 9)
}

fn format_trimmed(value: U256, decimals: u8) -> String {
    match format_units(value, decimals) {
        Ok(formatted) if formatted.contains('.') => formatted
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string(),
        Ok(formatted) => formatted,
        Err(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gwei_trims_fraction() {
        assert_eq!(format_gwei(U256::from(2_000_000_000u64)), "2");
        assert_eq!(format_gwei(U256::from(1_500_000_000u64)), "1.5");
        assert_eq!(format_gwei(U256::from(1u64)), "0.000000001");
        assert_eq!(format_gwei(U256::ZERO), "0");
    }

    #[test]
    fn test_ether_whole_supply() {
        let supply = U256::from(21_000_000u128 * 10u128.pow(18));
        assert_eq!(format_ether(supply), "21000000");
    }
}
