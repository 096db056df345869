//! Utility functions for identifiers and report arithmetic

use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique record id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Share of `part` in `total` as a percentage rounded to two decimals.
/// An empty denominator yields `0.0` rather than NaN.
pub fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = part as f64 * 100.0 / total as f64;
    (raw * 100.0).round() / 100.0
}

/// Centavos to a peso string with two decimals, e.g. `123456` -> `1234.56`.
pub fn format_centavos(amount: u64) -> String {
    format!("{}.{:02}", amount / 100, amount % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_guards_empty_total() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(5, 0), 0.0);
    }

    #[test]
    fn percentage_rounds_to_two_places() {
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(2, 3), 66.67);
        assert_eq!(percentage(4, 4), 100.0);
    }

    #[test]
    fn centavos_format() {
        assert_eq!(format_centavos(0), "0.00");
        assert_eq!(format_centavos(5), "0.05");
        assert_eq!(format_centavos(1_000_050), "10000.50");
    }
}
