//! Unit Conversion Utilities
//!
//! Helpers for satoshi amounts and formatting.

use bitcoin::Amount;

/// Satoshis per Bitcoin
pub const SATS_PER_BTC: u64 = 100_000_000;

/// Convert an amount to a BTC string (e.g., "0.00100000")
pub fn sats_to_btc_string(amount: Amount) -> String {
    let sats = amount.to_sat();
    format!("{}.{:08}", sats / SATS_PER_BTC, sats % SATS_PER_BTC)
}

/// Convert an amount to a human-readable string
/// e.g., 100000 -> "100,000 sats (0.00100000 BTC)"
pub fn sats_to_display(amount: Amount) -> String {
    format!(
        "{} sats ({} BTC)",
        format_with_commas(amount.to_sat()),
        sats_to_btc_string(amount)
    )
}

/// Format number with thousands separators
fn format_with_commas(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);

    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }

    result
}

/// Parse a satoshi amount, tolerating separators
pub fn parse_sats(s: &str) -> Option<Amount> {
    s.trim()
        .replace([',', '_'], "")
        .parse()
        .ok()
        .map(Amount::from_sat)
}
