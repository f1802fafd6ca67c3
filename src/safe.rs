//! Checked 64-bit arithmetic for the state-mutation path
//!
//! Overflow and division by zero inside the engine mean the numbers
//! themselves are corrupt, and corrupt state must never be persisted or
//! replayed. These helpers therefore do not return errors: they log a
//! diagnostic and panic, which the sequencer's panic boundary turns into
//! a state dump followed by process termination.

use tracing::error;

/// Checked addition. Panics on overflow.
#[inline(always)]
pub fn add(a: i64, b: i64) -> i64 {
    match a.checked_add(b) {
        Some(v) => v,
        None => corrupt("add", a, b),
    }
}

/// Checked subtraction. Panics on overflow.
#[inline(always)]
pub fn sub(a: i64, b: i64) -> i64 {
    match a.checked_sub(b) {
        Some(v) => v,
        None => corrupt("sub", a, b),
    }
}

/// Checked multiplication. Panics on overflow.
#[inline(always)]
pub fn mul(a: i64, b: i64) -> i64 {
    match a.checked_mul(b) {
        Some(v) => v,
        None => corrupt("mul", a, b),
    }
}

/// Checked division, rounding toward zero. Panics on division by zero.
#[inline(always)]
pub fn div(a: i64, b: i64) -> i64 {
    match a.checked_div(b) {
        Some(v) => v,
        None => corrupt("div", a, b),
    }
}

/// `a * b / d` with a 128-bit intermediate, rounding toward zero.
///
/// Fixed-point rescaling (price x quantity products) routinely exceeds
/// `i64` before the divide; the widened intermediate keeps the result
/// exact as long as it fits back into 64 bits.
#[inline(always)]
pub fn mul_div(a: i64, b: i64, d: i64) -> i64 {
    if d == 0 {
        corrupt("mul_div", a, b);
    }
    let wide = (a as i128) * (b as i128) / (d as i128);
    if wide < i64::MIN as i128 || wide > i64::MAX as i128 {
        corrupt("mul_div", a, b);
    }
    wide as i64
}

#[cold]
fn corrupt(op: &'static str, a: i64, b: i64) -> ! {
    error!(op, a, b, "integer arithmetic corruption");
    panic!("arithmetic corruption in {op}({a}, {b})");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agrees_with_plain_arithmetic_when_representable() {
        assert_eq!(add(2, 3), 5);
        assert_eq!(sub(2, 3), -1);
        assert_eq!(mul(-4, 3), -12);
        assert_eq!(add(i64::MAX - 1, 1), i64::MAX);
    }

    #[test]
    fn division_rounds_toward_zero() {
        assert_eq!(div(7, 2), 3);
        assert_eq!(div(-7, 2), -3);
        assert_eq!(div(550, 5), 110);
        assert_eq!(mul_div(7, 1, 2), 3);
        assert_eq!(mul_div(-7, 1, 2), -3);
    }

    #[test]
    fn mul_div_survives_wide_intermediates() {
        // 100M KRW in micros times 1 BTC in sats overflows i64 before the
        // divide; the widened path must land exactly.
        let price: i64 = 100_000_000 * 1_000_000;
        let qty: i64 = 100_000_000;
        assert_eq!(mul_div(price, qty, 1_000_000), 100_000_000 * 100_000_000);
    }

    #[test]
    #[should_panic(expected = "arithmetic corruption")]
    fn add_overflow_panics() {
        add(i64::MAX, 1);
    }

    #[test]
    #[should_panic(expected = "arithmetic corruption")]
    fn sub_overflow_panics() {
        sub(i64::MIN, 1);
    }

    #[test]
    #[should_panic(expected = "arithmetic corruption")]
    fn division_by_zero_panics() {
        div(1, 0);
    }

    #[test]
    #[should_panic(expected = "arithmetic corruption")]
    fn mul_div_overflow_panics() {
        mul_div(i64::MAX, i64::MAX, 1);
    }
}
