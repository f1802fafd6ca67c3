//! Fixed-point market scalars
//!
//! Every value the engine mutates is a 64-bit signed integer: prices in
//! micros (x10^6), quantities in sats (x10^8), timestamps in Unix
//! microseconds. Floating point exists only at the I/O boundary, behind
//! the conversion helpers here, so that replaying the same event stream
//! produces bit-identical state on every architecture.

use crate::error::{EngineError, Result};

/// Price in micros: 1.0 unit of quote currency == 1_000_000
pub type PriceMicros = i64;

/// Quantity in sats: 1.0 unit of base asset == 100_000_000
pub type QtySats = i64;

/// Unix microseconds
pub type TimeStamp = i64;

/// Monotonic event sequence number, starts at 1
pub type Seq = u64;

/// Scale factor for `PriceMicros`
pub const PRICE_SCALE: i64 = 1_000_000;

/// Scale factor for `QtySats`
pub const QTY_SCALE: i64 = 100_000_000;

const PRICE_DECIMALS: usize = 6;
const QTY_DECIMALS: usize = 8;

/// Convert an external floating-point price to micros.
///
/// Rounds half away from zero. Rejects NaN, infinities and values whose
/// scaled magnitude does not fit in an `i64`. Only gateways call this;
/// nothing downstream of the inbox touches floats.
pub fn price_from_f64(value: f64) -> Result<PriceMicros> {
    scaled_from_f64(value, PRICE_SCALE)
}

/// Convert an external floating-point quantity to sats.
pub fn qty_from_f64(value: f64) -> Result<QtySats> {
    scaled_from_f64(value, QTY_SCALE)
}

fn scaled_from_f64(value: f64, scale: i64) -> Result<i64> {
    if !value.is_finite() {
        return Err(EngineError::NotRepresentable(value));
    }
    // f64::round rounds half away from zero, which is the contract here.
    let scaled = (value * scale as f64).round();
    if scaled < i64::MIN as f64 || scaled > i64::MAX as f64 {
        return Err(EngineError::NotRepresentable(value));
    }
    Ok(scaled as i64)
}

/// Parse a decimal string (`"90000.12"`, `"-0.5"`) into micros without
/// going through floating point.
///
/// Exchange payloads carry prices as strings; parsing them digit-by-digit
/// keeps the conversion exact and platform-independent. The first digit
/// beyond the scale rounds half away from zero.
pub fn price_from_decimal_str(s: &str) -> Result<PriceMicros> {
    mantissa_from_decimal_str(s, PRICE_DECIMALS)
}

/// Parse a decimal string into sats without going through floating point.
pub fn qty_from_decimal_str(s: &str) -> Result<QtySats> {
    mantissa_from_decimal_str(s, QTY_DECIMALS)
}

fn mantissa_from_decimal_str(s: &str, decimals: usize) -> Result<i64> {
    let invalid = |reason| EngineError::Decimal {
        literal: s.to_string(),
        reason,
    };

    let trimmed = s.trim();
    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, f),
        None => (unsigned, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid("no digits"));
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(invalid("non-digit character"));
    }

    let frac = frac_part.as_bytes();
    let mut mantissa: i64 = 0;
    let mut push_digit = |digit: i64| -> Result<()> {
        mantissa = mantissa
            .checked_mul(10)
            .and_then(|m| m.checked_add(digit))
            .ok_or_else(|| invalid("mantissa overflows i64"))?;
        Ok(())
    };

    for b in int_part.bytes() {
        push_digit((b - b'0') as i64)?;
    }
    for i in 0..decimals {
        push_digit(frac.get(i).map_or(0, |b| (b - b'0') as i64))?;
    }

    // Round on the first dropped fractional digit, half away from zero.
    if frac.get(decimals).is_some_and(|b| *b >= b'5') {
        mantissa = mantissa
            .checked_add(1)
            .ok_or_else(|| invalid("mantissa overflows i64"))?;
    }

    Ok(if negative { -mantissa } else { mantissa })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_from_f64_scales_and_rounds() {
        assert_eq!(price_from_f64(1.0).unwrap(), 1_000_000);
        assert_eq!(price_from_f64(90000.12).unwrap(), 90_000_120_000);
        // Half away from zero, both signs.
        assert_eq!(price_from_f64(0.0000005).unwrap(), 1);
        assert_eq!(price_from_f64(-0.0000005).unwrap(), -1);
        assert_eq!(qty_from_f64(1.5).unwrap(), 150_000_000);
    }

    #[test]
    fn price_from_f64_rejects_non_finite() {
        assert!(price_from_f64(f64::NAN).is_err());
        assert!(price_from_f64(f64::INFINITY).is_err());
        assert!(price_from_f64(f64::NEG_INFINITY).is_err());
        assert!(price_from_f64(1e300).is_err());
    }

    #[test]
    fn decimal_str_parses_without_float() {
        assert_eq!(price_from_decimal_str("100").unwrap(), 100_000_000);
        assert_eq!(price_from_decimal_str("90000.12").unwrap(), 90_000_120_000);
        assert_eq!(price_from_decimal_str("0.5").unwrap(), 500_000);
        assert_eq!(price_from_decimal_str("-123.45").unwrap(), -123_450_000);
        assert_eq!(qty_from_decimal_str("1.50000000").unwrap(), 150_000_000);
        assert_eq!(qty_from_decimal_str("0.00000001").unwrap(), 1);
    }

    #[test]
    fn decimal_str_rounds_first_dropped_digit() {
        assert_eq!(price_from_decimal_str("1.0000005").unwrap(), 1_000_001);
        assert_eq!(price_from_decimal_str("1.0000004").unwrap(), 1_000_000);
        assert_eq!(price_from_decimal_str("-1.0000005").unwrap(), -1_000_001);
    }

    #[test]
    fn decimal_str_is_deterministic() {
        for literal in ["90000.12", "-0.00000149", "42", "0.123456789"] {
            assert_eq!(
                price_from_decimal_str(literal).unwrap(),
                price_from_decimal_str(literal).unwrap()
            );
        }
    }

    #[test]
    fn decimal_str_rejects_garbage() {
        assert!(price_from_decimal_str("").is_err());
        assert!(price_from_decimal_str(".").is_err());
        assert!(price_from_decimal_str("1.2.3").is_err());
        assert!(price_from_decimal_str("12a.4").is_err());
        assert!(price_from_decimal_str("99999999999999999999").is_err());
    }
}
