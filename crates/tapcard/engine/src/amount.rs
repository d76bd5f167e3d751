//! Decimal conversion of amounts in the smallest chain unit

use alloy_primitives::U256;

use crate::{Error, Result};

/// Parse a decimal string into the smallest unit of a chain with `decimals` places
///
/// Digits beyond the chain's scale are dropped, so the result is floored.
pub fn parse_amount(input: &str, decimals: u8) -> Result<U256> {
    let invalid = || Error::InvalidAmount(input.to_owned());

    let (whole, fraction) = input.trim().split_once('.').unwrap_or((input.trim(), ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let scale = usize::from(decimals);
    let mut digits = String::with_capacity(whole.len() + scale);
    digits.push_str(whole);
    digits.extend(fraction.chars().take(scale));
    digits.extend(std::iter::repeat_n('0', scale.saturating_sub(fraction.len())));

    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 10).map_err(|_| Error::AmountOverflow)
}

/// Format an amount in the smallest unit as a decimal string without trailing zeros
pub fn format_amount(value: U256, decimals: u8) -> String {
    let scale = usize::from(decimals);
    let digits = value.to_string();
    if scale == 0 {
        return digits;
    }

    let padded = format!("{digits:0>width$}", width = scale + 1);
    let (whole, fraction) = padded.split_at(padded.len() - scale);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole.to_owned()
    } else {
        format!("{whole}.{fraction}")
    }
}

/// Narrow an amount to the 64-bit integer most chains encode
pub(crate) fn to_u64(value: U256) -> Result<u64> {
    u64::try_from(value).map_err(|_| Error::AmountOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eight_decimals_without_drift() {
        let value = parse_amount("1.23456789", 8).unwrap();
        assert_eq!(value, U256::from(123_456_789u64));
        assert_eq!(format_amount(value, 8), "1.23456789");
    }

    #[test]
    fn test_extra_digits_are_floored() {
        assert_eq!(parse_amount("0.123456789", 8).unwrap(), U256::from(12_345_678u64));
        assert_eq!(parse_amount("0.0000001", 6).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_shapes() {
        assert_eq!(parse_amount("5", 4).unwrap(), U256::from(50_000u64));
        assert_eq!(parse_amount(".5", 1).unwrap(), U256::from(5u64));
        assert_eq!(parse_amount("2.", 2).unwrap(), U256::from(200u64));
        assert_eq!(
            parse_amount("1", 18).unwrap(),
            U256::from(1_000_000_000_000_000_000u128)
        );
        assert!(parse_amount("", 8).is_err());
        assert!(parse_amount(".", 8).is_err());
        assert!(parse_amount("1.2.3", 8).is_err());
        assert!(parse_amount("-1", 8).is_err());
    }

    #[test]
    fn test_format() {
        assert_eq!(format_amount(U256::from(100_000_000u64), 8), "1");
        assert_eq!(format_amount(U256::from(5u64), 8), "0.00000005");
        assert_eq!(format_amount(U256::ZERO, 6), "0");
        assert_eq!(format_amount(U256::from(42u64), 0), "42");
    }

    #[test]
    fn test_overflow() {
        let huge = "1".repeat(80);
        assert!(matches!(parse_amount(&huge, 0), Err(Error::AmountOverflow)));
        assert!(to_u64(U256::MAX).is_err());
    }
}
