//! Indicative prices against a constant BASE_NATIVE quantity.
//!
//! `sell_native_price` is the quote a pool pays out for BASE_NATIVE;
//! `buy_native_price` is the quote it charges to hand BASE_NATIVE back.
//! Two pools quoting the same token are crossed when the buy-side pool pays
//! out more quote than the sell-side pool charges. That is a necessary (not
//! sufficient) precondition for profit, used as the search filter.

use crate::amm_math;
use crate::registry::{MarketRegistry, Pair, PairLocation};
use ethers::types::U256;

/// Recompute both cached prices for one pair from its current reserves.
pub fn reprice(registry: &mut MarketRegistry, loc: &PairLocation, base_native: U256) {
    let Some(pair) = registry.pair(loc) else {
        return;
    };
    let native = registry.native_reserve(pair);
    let quote = registry.quote_reserve(pair);
    let fee = pair.fee;

    let sell = amm_math::get_amount_out(native, quote, base_native, fee);
    // A pool too shallow to pay out BASE_NATIVE can never serve as the
    // sell leg; price it out of every cross.
    let buy = amm_math::get_amount_in(quote, native, base_native, fee).unwrap_or(U256::MAX);

    if let Some(pair) = registry.pair_mut(loc) {
        pair.sell_native_price = sell;
        pair.buy_native_price = buy;
    }
}

/// Price every pair. Run once after discovery; afterwards prices follow
/// event updates and simulated mutations only.
pub fn price_all(registry: &mut MarketRegistry, base_native: U256) {
    let locations: Vec<PairLocation> = registry.mapping.values().cloned().collect();
    for loc in locations {
        reprice(registry, &loc, base_native);
    }
}

/// Cross condition: `buy_side` pays out more quote per BASE_NATIVE than
/// `sell_side` charges for it.
pub fn crossed(sell_side: &Pair, buy_side: &Pair) -> bool {
    buy_side.sell_native_price > sell_side.buy_native_price
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::test_support::{pair, registry_with};

    fn eth(n: u64) -> U256 {
        U256::from(n) * U256::exp10(18)
    }

    fn base() -> U256 {
        U256::exp10(17) // 0.1 native
    }

    #[test]
    fn prices_straddle_the_spot_rate() {
        let mut reg = registry_with(vec![pair(1, eth(1_000), eth(2_000), 30)]);
        price_all(&mut reg, base());
        let p = &reg.pairs_by_token.values().next().unwrap()[0];
        let spot = base() * eth(2_000) / eth(1_000);
        assert!(p.sell_native_price < spot);
        assert!(p.buy_native_price > spot);
    }

    #[test]
    fn cheap_and_expensive_pools_cross() {
        let mut reg = registry_with(vec![
            pair(1, eth(1_000), eth(2_000), 30), // pays ~2 quote per native
            pair(2, eth(2_000), eth(1_000), 30), // charges ~0.5 quote per native
        ]);
        price_all(&mut reg, base());
        let pairs = reg.pairs_by_token.values().next().unwrap();
        let cheap = pairs.iter().find(|p| p.address.to_low_u64_be() == 1).unwrap();
        let dear = pairs.iter().find(|p| p.address.to_low_u64_be() == 2).unwrap();
        assert!(crossed(dear, cheap));
        assert!(!crossed(cheap, dear));
    }

    #[test]
    fn drained_pool_prices_out_of_crosses() {
        let mut reg = registry_with(vec![pair(1, U256::from(10), eth(2_000), 30)]);
        price_all(&mut reg, base());
        let p = &reg.pairs_by_token.values().next().unwrap()[0];
        assert_eq!(p.buy_native_price, U256::MAX);
    }
}
