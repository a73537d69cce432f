//! Terminal rendering of spam alerts

use colored::Colorize;

use crate::core::SpamAlert;

pub fn format_spam_alert(alert: &SpamAlert) -> String {
    let method = if alert.method_name.is_empty() {
        "unknown"
    } else {
        alert.method_name.as_str()
    };

    let mut lines = vec![
        String::new(),
        format!("{} {}", "🚨", "SPAM ALERT".red().bold()),
        "=".repeat(70),
        format!("   From:        {}", alert.from_address.yellow()),
        format!(
            "   Router:      {}",
            alert.to_address.as_deref().unwrap_or("contract creation")
        ),
        format!("   Tx Hash:     {}", alert.tx_hash),
        format!(
            "   Method:      {} ({})",
            method.bold(),
            alert.selector
        ),
        format!("   Occurrences: {}", alert.occurrence_count.to_string().bold()),
        format!(
            "   Block Span:  {} blocks (#{} → #{})",
            alert.block_span, alert.first_block, alert.current_block
        ),
        format!(
            "   Gas:         {} gwei max / {} gwei priority",
            alert.fee_gwei, alert.priority_fee_gwei
        ),
    ];

    if alert.tokens.is_empty() {
        lines.push("   Tokens:      none detected".dimmed().to_string());
    } else {
        lines.push(format!("\n{}", "🪙 ERC20 TOKENS:".bold()));
        for token in &alert.tokens {
            lines.push(format!(
                "   {} (supply {})",
                token.address.cyan(),
                token.total_supply
            ));
        }
    }

    lines.push("=".repeat(70));
    lines.join("\n")
}

pub fn print_spam_alert(alert: &SpamAlert) {
    println!("{}", format_spam_alert(alert));
}
