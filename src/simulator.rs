//! In-place reserve mutation for a hypothetical arb, and its exact inverse.
//!
//! Applied between search passes so follow-up opportunities are evaluated
//! against the post-trade state; undone afterwards so the live view matches
//! the chain again. Hermes pairs rebase a fee share out of the incoming
//! amount, so their incoming side carries an `amount / (F - fee)` correction,
//! matching observed on-chain accounting.

use crate::amm_math::FEE_DENOMINATOR;
use crate::contracts::{hermes_factory, Arb};
use crate::error::BotError;
use crate::pricing;
use crate::registry::{Freshness, MarketRegistry, PairLocation};
use ethers::types::{Address, U256};

struct LegView {
    loc: PairLocation,
    row: usize,
    native_index: usize,
    quote_index: usize,
    fee: u32,
    factory: Address,
}

fn view(registry: &MarketRegistry, pair: Address) -> Result<LegView, BotError> {
    let loc = registry
        .mapping
        .get(&pair)
        .cloned()
        .ok_or(BotError::PoolNotFound(pair))?;
    let p = registry.pair(&loc).ok_or(BotError::PoolNotFound(pair))?;
    Ok(LegView {
        row: p.reserve_row,
        native_index: p.native_index,
        quote_index: p.quote_index,
        fee: p.fee,
        factory: p.factory,
        loc,
    })
}

fn rebase_correction(leg: &LegView, amount: U256) -> U256 {
    if leg.factory == hermes_factory() {
        amount / U256::from(FEE_DENOMINATOR.saturating_sub(leg.fee).max(1))
    } else {
        U256::zero()
    }
}

fn add(value: U256, delta: U256) -> Result<U256, BotError> {
    value
        .checked_add(delta)
        .ok_or(BotError::Arithmetic("reserve overflow during simulation"))
}

fn sub(value: U256, delta: U256) -> Result<U256, BotError> {
    value
        .checked_sub(delta)
        .ok_or(BotError::Arithmetic("reserve underflow during simulation"))
}

/// Mutate both legs' reserve rows for `arb`; `undo` inverts exactly.
/// Both rows come out `Fresh` and both pairs are repriced.
pub fn apply(
    registry: &mut MarketRegistry,
    arb: &Arb,
    undo: bool,
    base_native: U256,
) -> Result<(), BotError> {
    let buy = view(registry, arb.buy_from_pair)?;
    let sell = view(registry, arb.sell_to_pair)?;

    // Buy leg: we pay native in and take the quote token out.
    let buy_correction = rebase_correction(&buy, arb.native_in_amount);
    {
        let row = &mut registry.reserves[buy.row];
        let mut native = row.get(buy.native_index);
        let mut quote = row.get(buy.quote_index);
        if !undo {
            native = sub(add(native, arb.native_in_amount)?, buy_correction)?;
            quote = sub(quote, arb.token_amount)?;
        } else {
            native = sub(add(native, buy_correction)?, arb.native_in_amount)?;
            quote = add(quote, arb.token_amount)?;
        }
        row.set(buy.native_index, native);
        row.set(buy.quote_index, quote);
        row.freshness = Freshness::Fresh;
    }

    // Sell leg: we pay the quote token in and take native out.
    let sell_correction = rebase_correction(&sell, arb.token_amount);
    {
        let row = &mut registry.reserves[sell.row];
        let mut native = row.get(sell.native_index);
        let mut quote = row.get(sell.quote_index);
        if !undo {
            native = sub(native, arb.native_out_amount)?;
            quote = sub(add(quote, arb.token_amount)?, sell_correction)?;
        } else {
            native = add(native, arb.native_out_amount)?;
            quote = sub(add(quote, sell_correction)?, arb.token_amount)?;
        }
        row.set(sell.native_index, native);
        row.set(sell.quote_index, quote);
        row.freshness = Freshness::Fresh;
    }

    pricing::reprice(registry, &buy.loc, base_native);
    pricing::reprice(registry, &sell.loc, base_native);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts;
    use crate::registry::test_support::{pair, registry_with};
    use crate::{amm_math, pricing};

    fn eth(n: u64) -> U256 {
        U256::from(n) * U256::exp10(18)
    }

    fn base() -> U256 {
        U256::exp10(17)
    }

    fn arb_between(reg: &MarketRegistry, buy: Address, sell: Address) -> Arb {
        let buy_loc = reg.mapping[&buy].clone();
        let sell_loc = reg.mapping[&sell].clone();
        let b = reg.pair(&buy_loc).unwrap();
        let s = reg.pair(&sell_loc).unwrap();
        let x = amm_math::optimal_native_in_two_fees(
            reg.native_reserve(b),
            reg.quote_reserve(b),
            reg.quote_reserve(s),
            reg.native_reserve(s),
            b.fee,
            s.fee,
        );
        let y = amm_math::get_amount_out(reg.native_reserve(b), reg.quote_reserve(b), x, b.fee);
        let z = amm_math::get_amount_out(reg.quote_reserve(s), reg.native_reserve(s), y, s.fee);
        Arb {
            buy_from_pair: buy,
            native_in_amount: x,
            token_amount: y,
            native_out_amount: z,
            sell_to_pair: sell,
            profit: z - x,
            buy_from_fee: b.fee as u8,
            sell_to_fee: s.fee as u8,
            buy_from_is_w_metis: b.is_wrapped_native(),
            sell_to_is_w_metis: s.is_wrapped_native(),
        }
    }

    #[test]
    fn apply_then_undo_restores_rows_and_prices_bitwise() {
        let mut reg = registry_with(vec![
            pair(1, eth(1_000), eth(2_000), 30),
            pair(2, eth(2_000), eth(1_000), 30),
        ]);
        pricing::price_all(&mut reg, base());
        let arb = arb_between(
            &reg,
            Address::from_low_u64_be(1),
            Address::from_low_u64_be(2),
        );

        let rows_before = reg.reserves.clone();
        let pairs_before = reg.pairs_by_token.clone();

        apply(&mut reg, &arb, false, base()).unwrap();
        assert_ne!(reg.reserves, rows_before);

        apply(&mut reg, &arb, true, base()).unwrap();
        // freshness flags change, but values and cached prices are bitwise equal
        for (after, before) in reg.reserves.iter().zip(&rows_before) {
            assert_eq!(after.reserve0, before.reserve0);
            assert_eq!(after.reserve1, before.reserve1);
        }
        assert_eq!(reg.pairs_by_token, pairs_before);
    }

    #[test]
    fn hermes_correction_is_inverted_under_undo() {
        let mut reg = registry_with(vec![
            pair(1, eth(1_000), eth(2_000), 1),
            pair(2, eth(2_000), eth(1_000), 1),
        ]);
        let hermes = contracts::hermes_factory();
        for pairs in reg.pairs_by_token.values_mut() {
            for p in pairs.iter_mut() {
                p.factory = hermes;
            }
        }
        pricing::price_all(&mut reg, base());
        let arb = arb_between(
            &reg,
            Address::from_low_u64_be(1),
            Address::from_low_u64_be(2),
        );

        let rows_before = reg.reserves.clone();
        apply(&mut reg, &arb, false, base()).unwrap();

        // forward pass deducts the rebase share on each incoming side
        let buy_row = &reg.reserves[0];
        let expected_native = rows_before[0].reserve0 + arb.native_in_amount
            - arb.native_in_amount / U256::from(9_999u32);
        assert_eq!(buy_row.reserve0, expected_native);

        apply(&mut reg, &arb, true, base()).unwrap();
        for (after, before) in reg.reserves.iter().zip(&rows_before) {
            assert_eq!(after.reserve0, before.reserve0);
            assert_eq!(after.reserve1, before.reserve1);
        }
    }

    #[test]
    fn mutated_rows_are_marked_fresh() {
        let mut reg = registry_with(vec![
            pair(1, eth(1_000), eth(2_000), 30),
            pair(2, eth(2_000), eth(1_000), 30),
        ]);
        pricing::price_all(&mut reg, base());
        let arb = arb_between(
            &reg,
            Address::from_low_u64_be(1),
            Address::from_low_u64_be(2),
        );
        reg.mark_all_stale();
        apply(&mut reg, &arb, false, base()).unwrap();
        assert!(reg
            .reserves
            .iter()
            .all(|r| r.freshness == Freshness::Fresh));
    }

    #[test]
    fn unknown_pair_is_rejected() {
        let mut reg = registry_with(vec![pair(1, eth(1_000), eth(2_000), 30)]);
        pricing::price_all(&mut reg, base());
        let mut arb = arb_between(
            &reg,
            Address::from_low_u64_be(1),
            Address::from_low_u64_be(1),
        );
        arb.sell_to_pair = Address::from_low_u64_be(77);
        assert!(matches!(
            apply(&mut reg, &arb, false, base()),
            Err(BotError::PoolNotFound(_))
        ));
    }
}
