//! Constant-product swap math.
//!
//! Quote helpers mirror the UniswapV2 router formulas with the fee expressed
//! as a numerator in 1/10,000 of the input (30 = 0.30%). The optimal-input
//! solver returns the native amount that maximizes two-leg arbitrage profit;
//! intermediates exceed 256 bits, so it runs on `BigUint` and floors the
//! result back into a `U256`.

use crate::bigmath::{isqrt, to_biguint, to_u256};
use crate::error::BotError;
use ethers::types::U256;
use num_bigint::BigUint;

pub const FEE_DENOMINATOR: u32 = 10_000;

/// Output amount for `amount_in` of the input token, after the pool fee.
///
/// Degenerate inputs (zero reserves or zero input) quote zero rather than
/// erroring; the caller treats a zero quote as "no trade".
pub fn get_amount_out(reserve_in: U256, reserve_out: U256, amount_in: U256, fee: u32) -> U256 {
    if reserve_in.is_zero() || reserve_out.is_zero() || amount_in.is_zero() {
        return U256::zero();
    }
    let keep = BigUint::from(FEE_DENOMINATOR.saturating_sub(fee));
    let amount_in_with_fee = to_biguint(amount_in) * keep;
    let numerator = &amount_in_with_fee * to_biguint(reserve_out);
    let denominator = to_biguint(reserve_in) * BigUint::from(FEE_DENOMINATOR) + amount_in_with_fee;
    to_u256(&(numerator / denominator)).unwrap_or_default()
}

/// Input amount required to withdraw `amount_out` of the output token.
///
/// Rounds up by one, matching the router. Fails when the pool cannot supply
/// the requested output.
pub fn get_amount_in(
    reserve_in: U256,
    reserve_out: U256,
    amount_out: U256,
    fee: u32,
) -> Result<U256, BotError> {
    if amount_out >= reserve_out {
        return Err(BotError::InsufficientLiquidity {
            requested: amount_out,
            available: reserve_out,
        });
    }
    let keep = BigUint::from(FEE_DENOMINATOR.saturating_sub(fee));
    let numerator =
        to_biguint(amount_out) * BigUint::from(FEE_DENOMINATOR) * to_biguint(reserve_in);
    let denominator = (to_biguint(reserve_out) - to_biguint(amount_out)) * keep;
    if denominator == BigUint::from(0u8) {
        return Err(BotError::Arithmetic("zero denominator in amount_in"));
    }
    let amount = numerator / denominator + BigUint::from(1u8);
    to_u256(&amount)
}

/// Native input that maximizes profit on the path
/// native -> quote (buy pool) -> native (sell pool), with distinct fees.
///
/// Closed form for the positive root of d(profit)/dx = 0. With
/// a = F - fee_buy and s = F - fee_sell:
///
///   x* = F * (sqrt(rbi*rbo*rsi*rso*a^3*s) - a*F*rsi*rbi)
///        / (a^2 * (rsi*F + s*rbo))
///
/// Returns zero when the root is non-positive, i.e. no opportunity.
pub fn optimal_native_in_two_fees(
    r_buy_in: U256,
    r_buy_out: U256,
    r_sell_in: U256,
    r_sell_out: U256,
    fee_buy: u32,
    fee_sell: u32,
) -> U256 {
    let f = BigUint::from(FEE_DENOMINATOR);
    let a = BigUint::from(FEE_DENOMINATOR.saturating_sub(fee_buy));
    let s = BigUint::from(FEE_DENOMINATOR.saturating_sub(fee_sell));

    let rbi = to_biguint(r_buy_in);
    let rbo = to_biguint(r_buy_out);
    let rsi = to_biguint(r_sell_in);
    let rso = to_biguint(r_sell_out);

    let radicand = &rbi * &rbo * &rsi * &rso * (&a * &a * &a) * &s;
    let root = isqrt(&radicand);
    let subtrahend = &a * &f * &rsi * &rbi;
    if root <= subtrahend {
        return U256::zero();
    }

    let numerator = (root - subtrahend) * &f;
    let denominator = (&a * &a) * (&rsi * &f + &s * &rbo);
    if denominator == BigUint::from(0u8) {
        return U256::zero();
    }
    to_u256(&(numerator / denominator)).unwrap_or_default()
}

/// Single-fee variant kept for pools quoted under one shared fee.
pub fn optimal_native_in(
    r_buy_in: U256,
    r_buy_out: U256,
    r_sell_in: U256,
    r_sell_out: U256,
    fee: u32,
) -> U256 {
    optimal_native_in_two_fees(r_buy_in, r_buy_out, r_sell_in, r_sell_out, fee, fee)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eth(n: u64) -> U256 {
        U256::from(n) * U256::exp10(18)
    }

    #[test]
    fn amount_out_is_below_spot_price() {
        let r0 = eth(1_000);
        let r1 = eth(2_000);
        let x = eth(10);
        let out = get_amount_out(r0, r1, x, 30);
        // spot would give x * r1 / r0; fee plus impact must quote strictly less
        assert!(out < x * r1 / r0);
        assert!(!out.is_zero());
    }

    #[test]
    fn amount_in_is_above_spot_price() {
        let r0 = eth(1_000);
        let r1 = eth(2_000);
        let y = eth(10);
        let input = get_amount_in(r0, r1, y, 30).unwrap();
        assert!(input > y * r0 / r1);
    }

    #[test]
    fn round_trip_covers_requested_output() {
        let r0 = eth(5_000);
        let r1 = eth(1_250);
        let y = eth(7);
        let input = get_amount_in(r0, r1, y, 30).unwrap();
        let out = get_amount_out(r0, r1, input, 30);
        assert!(out >= y);
    }

    #[test]
    fn amount_in_rejects_draining_the_pool() {
        let err = get_amount_in(eth(100), eth(100), eth(100), 30).unwrap_err();
        assert!(matches!(err, BotError::InsufficientLiquidity { .. }));
    }

    #[test]
    fn zero_input_quotes_zero() {
        assert!(get_amount_out(eth(100), eth(100), U256::zero(), 30).is_zero());
        assert!(get_amount_out(U256::zero(), eth(100), eth(1), 30).is_zero());
    }

    #[test]
    fn symmetric_pools_have_no_optimal_input() {
        let r = eth(1_000);
        assert!(optimal_native_in_two_fees(r, r, r, r, 30, 30).is_zero());
    }

    #[test]
    fn crossed_pools_yield_profitable_optimal_input() {
        // buy pool quotes the token cheap, sell pool expensive
        let x = optimal_native_in_two_fees(eth(1_000), eth(2_000), eth(1_000), eth(2_000), 30, 30);
        assert!(!x.is_zero());
        assert!(x <= eth(500));

        let mid = get_amount_out(eth(1_000), eth(2_000), x, 30);
        let back = get_amount_out(eth(1_000), eth(2_000), mid, 30);
        assert!(back > x);

        // nudging the size off the optimum must not improve profit
        let profit = back - x;
        for bumped in [x + eth(1), x - eth(1)] {
            let m = get_amount_out(eth(1_000), eth(2_000), bumped, 30);
            let b = get_amount_out(eth(1_000), eth(2_000), m, 30);
            assert!(b.saturating_sub(bumped) <= profit);
        }
    }

    #[test]
    fn single_fee_variant_matches_two_fee_form() {
        let x1 = optimal_native_in(eth(900), eth(2_100), eth(1_100), eth(1_900), 20);
        let x2 = optimal_native_in_two_fees(eth(900), eth(2_100), eth(1_100), eth(1_900), 20, 20);
        assert_eq!(x1, x2);
    }
}
