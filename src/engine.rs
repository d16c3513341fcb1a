//! Cross-market opportunity search.
//!
//! For every quote token the engine enumerates ordered pairs of its pools,
//! keeps the crossed ones, sizes the first candidate whose optimal profit
//! clears the active threshold and emits exactly one arb for that token.
//! The pool lists are pre-sorted by liquidity, so "first" biases toward the
//! deepest markets. Emitted arbs are then simulated in place and the search
//! recurses with the follow-up threshold to surface cascades; every simulated
//! mutation is undone (in reverse) before returning, so callers always see
//! the live view.

use crate::contracts::Arb;
use crate::error::BotError;
use crate::registry::{Freshness, MarketRegistry};
use crate::{amm_math, pricing, simulator};
use ethers::types::{Address, U256};

/// Bound on follow-up recursion.
pub const MAX_FOLLOW_UP_DEPTH: u32 = 100;

#[derive(Debug, Clone, Copy)]
pub enum Scope {
    All,
    Token(Address),
}

#[derive(Debug, Clone)]
pub struct SearchParams {
    /// BASE_NATIVE used for indicative pricing.
    pub base_native: U256,
    /// Profit floor for primary opportunities, in wei.
    pub min_profit: U256,
    /// Profit floor for follow-up opportunities, in wei.
    pub min_profit_followup: U256,
}

/// Run one search pass over `scope`, recursing into simulated follow-ups.
/// Emission order is preserved: primaries first, then their follow-ups.
pub fn evaluate(
    registry: &mut MarketRegistry,
    scope: Scope,
    follow_up: bool,
    depth: u32,
    params: &SearchParams,
) -> Result<Vec<Arb>, BotError> {
    let threshold = if follow_up {
        params.min_profit_followup
    } else {
        params.min_profit
    };

    let tokens: Vec<Address> = match scope {
        Scope::All => registry.pairs_by_token.keys().copied().collect(),
        Scope::Token(token) => vec![token],
    };

    let mut arbs = Vec::new();
    for token in tokens {
        if let Some(arb) = scan_token(registry, token, threshold) {
            arbs.push(arb);
        }
    }

    if !arbs.is_empty() && depth < MAX_FOLLOW_UP_DEPTH {
        for arb in &arbs {
            simulator::apply(registry, arb, false, params.base_native)?;
        }
        let follow_ups = evaluate(registry, scope, true, depth + 1, params);
        for arb in arbs.iter().rev() {
            simulator::apply(registry, arb, true, params.base_native)?;
        }
        arbs.extend(follow_ups?);
    }

    Ok(arbs)
}

/// Scan one token's pools: collect crossed (sell, buy) candidates in list
/// order, emit the first whose optimally-sized profit is strictly above
/// `threshold`. A candidate is skipped when both sides' reserves are stale:
/// neither changed since the last pass, so it was already evaluated.
fn scan_token(registry: &MarketRegistry, token: Address, threshold: U256) -> Option<Arb> {
    let pairs = registry.pairs_by_token.get(&token)?;

    let mut crossed: Vec<(usize, usize)> = Vec::new();
    for (i, sell_side) in pairs.iter().enumerate() {
        for (j, buy_side) in pairs.iter().enumerate() {
            if sell_side.address == buy_side.address {
                continue;
            }
            let sell_row = &registry.reserves[sell_side.reserve_row];
            let buy_row = &registry.reserves[buy_side.reserve_row];
            if sell_row.freshness == Freshness::Stale && buy_row.freshness == Freshness::Stale {
                continue;
            }
            if pricing::crossed(sell_side, buy_side) {
                crossed.push((i, j));
            }
        }
    }

    for (i, j) in crossed {
        let sell = &pairs[i];
        let buy = &pairs[j];

        let optimal_size = amm_math::optimal_native_in_two_fees(
            registry.native_reserve(buy),
            registry.quote_reserve(buy),
            registry.quote_reserve(sell),
            registry.native_reserve(sell),
            buy.fee,
            sell.fee,
        );

        let tokens_bought = amm_math::get_amount_out(
            registry.native_reserve(buy),
            registry.quote_reserve(buy),
            optimal_size,
            buy.fee,
        );
        let native_proceeds = amm_math::get_amount_out(
            registry.quote_reserve(sell),
            registry.native_reserve(sell),
            tokens_bought,
            sell.fee,
        );

        let Some(profit) = native_proceeds.checked_sub(optimal_size) else {
            continue;
        };
        if profit > threshold {
            return Some(Arb {
                buy_from_pair: buy.address,
                native_in_amount: optimal_size,
                token_amount: tokens_bought,
                native_out_amount: native_proceeds,
                sell_to_pair: sell.address,
                profit,
                buy_from_fee: buy.fee as u8,
                sell_to_fee: sell.fee as u8,
                buy_from_is_w_metis: buy.is_wrapped_native(),
                sell_to_is_w_metis: sell.is_wrapped_native(),
            });
        }
    }

    None
}
