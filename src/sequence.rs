//! Control numbers: `PREFIX-YYYY-NNNNNN`, one counter per prefix and year
use super::store::Store;

pub const SEQUENCE_WIDTH: usize = 6;

pub fn format_control_number(prefix: &str, year: i32, sequence: u64) -> String {
    format!("{prefix}-{year}-{sequence:0width$}", width = SEQUENCE_WIDTH)
}

/// Split a control number back into prefix, year and sequence.
pub fn parse_control_number(control_number: &str) -> Option<(String, i32, u64)> {
    let mut parts = control_number.rsplitn(3, '-');
    let sequence = parts.next()?;
    let year = parts.next()?;
    let prefix = parts.next()?;

    if prefix.is_empty() || sequence.len() < SEQUENCE_WIDTH || year.len() != 4 {
        return None;
    }
    Some((prefix.to_string(), year.parse().ok()?, sequence.parse().ok()?))
}

/// Hands out control numbers from an atomic counter per `(prefix, year)`.
///
/// Each call is a single sled read-modify-write, so concurrent requests never
/// share a number. A number whose record then fails to save is skipped, never
/// reissued.
#[derive(Clone)]
pub struct SequenceGenerator {
    store: Store,
}

impl SequenceGenerator {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn next(&self, prefix: &str, year: i32) -> anyhow::Result<String> {
        let sequence = self.store.increment(&format!("{prefix}-{year}"))?;
        Ok(format_control_number(prefix, year, sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_zero_padding() {
        assert_eq!(format_control_number("BC", 2024, 7), "BC-2024-000007");
        assert_eq!(format_control_number("BLT", 2025, 123_456), "BLT-2025-123456");
        assert_eq!(format_control_number("BLT", 2025, 1_234_567), "BLT-2025-1234567");
    }

    #[test]
    fn parses_round_trip() {
        assert_eq!(
            parse_control_number("HH-2024-000042"),
            Some(("HH".to_string(), 2024, 42))
        );
        assert_eq!(parse_control_number("HH-24-000042"), None);
        assert_eq!(parse_control_number("2024-000042"), None);
    }

    #[test]
    fn partitions_are_independent() {
        let generator = SequenceGenerator::new(Store::temporary().unwrap());

        assert_eq!(generator.next("BC", 2024).unwrap(), "BC-2024-000001");
        assert_eq!(generator.next("BC", 2024).unwrap(), "BC-2024-000002");
        assert_eq!(generator.next("BC", 2025).unwrap(), "BC-2025-000001");
        assert_eq!(generator.next("CR", 2024).unwrap(), "CR-2024-000001");
    }
}
