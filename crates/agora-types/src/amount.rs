//! Monetary amounts
//!
//! Platform balances are credits: fixed-point decimal with two fractional
//! digits. On-chain USDC carries six fractional digits and converts 1:1 to
//! credits, rounded half-up to two decimals.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Credits are plain decimals; the helpers below enforce scale and bounds.
pub type Credits = Decimal;

/// Upper bound for every monetary field accepted from the outside.
pub const MAX_AMOUNT: Decimal = dec!(1_000_000);

/// Round to two decimals, half-up. All fee math and USDC conversion funnels
/// through this so rounding is uniform everywhere.
pub fn round_credits(value: Decimal) -> Credits {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert a raw on-chain USDC amount (6 decimals) to credits (2 decimals).
pub fn credits_from_usdc(usdc_raw: u64) -> Credits {
    let usdc = Decimal::from(usdc_raw) / dec!(1_000_000);
    round_credits(usdc)
}

/// Whether a value is acceptable as a price or transfer amount:
/// positive, at most two fractional digits, and within [0, MAX_AMOUNT].
pub fn is_valid_amount(value: Decimal) -> bool {
    value > Decimal::ZERO && value <= MAX_AMOUNT && value.scale() <= 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_up() {
        assert_eq!(round_credits(dec!(0.005)), dec!(0.01));
        assert_eq!(round_credits(dec!(0.004)), dec!(0.00));
        assert_eq!(round_credits(dec!(1.125)), dec!(1.13));
    }

    #[test]
    fn usdc_conversion() {
        // 12.345678 USDC -> 12.35 credits
        assert_eq!(credits_from_usdc(12_345_678), dec!(12.35));
        assert_eq!(credits_from_usdc(1_000_000), dec!(1.00));
        assert_eq!(credits_from_usdc(0), dec!(0.00));
    }

    #[test]
    fn amount_bounds() {
        assert!(is_valid_amount(dec!(0.01)));
        assert!(is_valid_amount(dec!(1_000_000)));
        assert!(!is_valid_amount(dec!(0)));
        assert!(!is_valid_amount(dec!(-5)));
        assert!(!is_valid_amount(dec!(1_000_000.01)));
        assert!(!is_valid_amount(dec!(1.001)));
    }
}
