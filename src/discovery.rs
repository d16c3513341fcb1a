//! Pool universe discovery.
//!
//! Enumerates every pair the configured factories expose through the flash
//! query helper, keeps only Metis-quoted constant-product pairs, gates them on
//! liquidity and token health, then hands back a registry sorted by depth.

use crate::contracts::{self, FlashUniswapQuery, TokenProvidence, HARD_BANNED_PAIRS};
use crate::error::BotError;
use crate::executor::GAS_LIMIT;
use crate::registry::{MarketRegistry, Pair};
use crate::{bigmath, ReadProvider};
use ethers::types::{Address, U256};
use std::collections::HashSet;
use tracing::{info, warn};

/// Page size of `getPairsByIndexRange` calls.
pub const PAIR_BATCH_SIZE: usize = 1_000;
/// Upper bound on pages fetched per factory.
pub const PAIR_BATCH_LIMIT: usize = 20;
/// Chunk size of batched `getReservesByPairs` calls.
pub const RESERVE_CHUNK: usize = 200;
/// Quote-side dust floor applied by the liquidity gate.
pub const MIN_QUOTE_RESERVE: u64 = 100;

pub struct Discovery {
    pub query: FlashUniswapQuery<ReadProvider>,
    pub providence: TokenProvidence<ReadProvider>,
    /// Factories with their fee numerators (dynamic fees already applied).
    pub factories: Vec<(Address, u32)>,
    pub banned_tokens: Vec<Address>,
    pub min_native_reserve: U256,
    /// Account the health simulation runs as.
    pub executor_address: Address,
    pub gas_price: U256,
}

impl Discovery {
    pub async fn run(&self) -> Result<MarketRegistry, BotError> {
        let mut registry = MarketRegistry::new();

        for (factory, fee) in &self.factories {
            self.enumerate_factory(&mut registry, *factory, *fee).await?;
        }
        info!(total_pairs = registry.pair_count(), "pulled all pairs");

        self.hydrate(&mut registry).await?;

        // Liquidity gate, then drop tokens without at least two markets to
        // cross.
        let min_native = self.min_native_reserve;
        let min_quote = U256::from(MIN_QUOTE_RESERVE);
        registry.retain_pairs(|pair, row| {
            row.get(pair.native_index) >= min_native && row.get(pair.quote_index) >= min_quote
        });
        registry.retain_tokens(|_, pairs| pairs.len() >= 2);
        info!(
            tokens = registry.token_count(),
            pairs = registry.pair_count(),
            "liquidity and multi-market gates applied"
        );

        self.health_gate(&mut registry).await?;

        // Survivor set is final; refresh rows and rank pools by depth.
        self.hydrate(&mut registry).await?;
        registry.sort_by_liquidity();

        info!(
            tokens = registry.token_count(),
            pairs = registry.pair_count(),
            "discovery complete"
        );
        Ok(registry)
    }

    async fn enumerate_factory(
        &self,
        registry: &mut MarketRegistry,
        factory: Address,
        fee: u32,
    ) -> Result<(), BotError> {
        info!(?factory, fee, "querying factory");
        let mut total = 0usize;
        let mut start = 0usize;

        while start < PAIR_BATCH_LIMIT * PAIR_BATCH_SIZE {
            let batch = self
                .query
                .get_pairs_by_index_range(
                    factory,
                    U256::from(start),
                    U256::from(start + PAIR_BATCH_SIZE),
                )
                .call()
                .await
                .map_err(|e| BotError::RpcFatal(format!("getPairsByIndexRange: {e}")))?;
            total += batch.len();

            // Hermes mixes stable and volatile curves in one factory; only
            // the volatile ones obey x*y=k.
            let stable_flags = if factory == contracts::hermes_factory() {
                let addresses: Vec<Address> = batch.iter().map(|triple| triple[2]).collect();
                Some(
                    self.query
                        .filter_volatile_hermes_pairs(addresses)
                        .call()
                        .await
                        .map_err(|e| BotError::RpcFatal(format!("filterVolatileHermesPairs: {e}")))?,
                )
            } else {
                None
            };

            for (index, triple) in batch.iter().enumerate() {
                let is_stable = stable_flags
                    .as_ref()
                    .map(|flags| flags.get(index).copied().unwrap_or(true))
                    .unwrap_or(false);
                let Some(pair) =
                    classify(*triple, factory, fee, &self.banned_tokens, is_stable)
                else {
                    continue;
                };
                if let Err(e) = registry.insert(pair) {
                    warn!(error = %e, "skipping pair");
                }
            }

            if batch.len() < PAIR_BATCH_SIZE {
                break;
            }
            start += PAIR_BATCH_SIZE;
        }

        info!(?factory, total_pairs = total, "factory enumerated");
        Ok(())
    }

    async fn hydrate(&self, registry: &mut MarketRegistry) -> Result<(), BotError> {
        let mut rows = Vec::with_capacity(registry.pair_count());
        for chunk in registry.all_pair_addresses.chunks(RESERVE_CHUNK) {
            let fetched = self
                .query
                .get_reserves_by_pairs(chunk.to_vec())
                .call()
                .await
                .map_err(|e| BotError::RpcFatal(format!("getReservesByPairs: {e}")))?;
            rows.extend(fetched.into_iter().map(|triple| (triple[0], triple[1])));
        }
        registry.set_reserves_batch(rows)
    }

    /// Simulate a scripted buy-and-sell of each token on its deepest pool.
    /// Any revert means non-standard transfer behavior (fee-on-transfer,
    /// blacklist, reentrancy hooks) and drops the whole token.
    async fn health_gate(&self, registry: &mut MarketRegistry) -> Result<(), BotError> {
        let probe_value = bigmath::to_wei(0.1, 18)?;
        let mut healthy: HashSet<Address> = HashSet::new();

        for (token, pairs) in &registry.pairs_by_token {
            let Some(pair) = pairs
                .iter()
                .max_by_key(|p| registry.native_reserve(p))
            else {
                continue;
            };

            let call = self
                .providence
                .health_check(pair.address, *token, U256::from(pair.fee))
                .from(self.executor_address)
                .value(probe_value)
                .gas(GAS_LIMIT)
                .gas_price(self.gas_price);

            match call.call().await {
                Ok(()) => {
                    healthy.insert(*token);
                }
                Err(e) => {
                    let rejected = BotError::SimulationRejected { token: *token };
                    info!(error = %e, "{rejected}");
                }
            }
        }

        registry.retain_tokens(|token, _| healthy.contains(token));
        Ok(())
    }
}

/// Keep a factory triple only if exactly one side is Metis or WMetis, the
/// quote token is not banned, the pair is not a known-bad address and the
/// curve is constant-product.
pub fn classify(
    triple: [Address; 3],
    factory: Address,
    fee: u32,
    banned_tokens: &[Address],
    is_stable: bool,
) -> Option<Pair> {
    let [token0, token1, pair_address] = triple;
    let (native_index, quote_index) = native_token_indexes(token0, token1)?;
    let tokens = [token0, token1];
    let quote = tokens[quote_index];

    if banned_tokens.contains(&quote) {
        return None;
    }
    if is_stable {
        return None;
    }
    if HARD_BANNED_PAIRS
        .iter()
        .any(|banned| contracts::addr(banned) == pair_address)
    {
        return None;
    }

    Some(Pair {
        address: pair_address,
        factory,
        fee,
        tokens,
        native_index,
        quote_index,
        native_token: tokens[native_index],
        reserve_row: 0,
        sell_native_price: U256::zero(),
        buy_native_price: U256::zero(),
    })
}

/// `(native_index, quote_index)` within the pair's token ordering, or `None`
/// when neither side is the native token.
pub fn native_token_indexes(token0: Address, token1: Address) -> Option<(usize, usize)> {
    let metis = contracts::metis_token();
    let wmetis = contracts::wmetis_token();
    if token0 == metis || token0 == wmetis {
        Some((0, 1))
    } else if token1 == metis || token1 == wmetis {
        Some((1, 0))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    #[test]
    fn classify_requires_a_native_side() {
        let triple = [token(1), token(2), token(3)];
        assert!(classify(triple, token(9), 30, &[], false).is_none());
    }

    #[test]
    fn classify_orients_native_and_quote() {
        let triple = [token(5), contracts::wmetis_token(), token(7)];
        let pair = classify(triple, token(9), 20, &[], false).unwrap();
        assert_eq!(pair.native_index, 1);
        assert_eq!(pair.quote_index, 0);
        assert_eq!(pair.quote_token(), token(5));
        assert!(pair.is_wrapped_native());

        let triple = [contracts::metis_token(), token(5), token(7)];
        let pair = classify(triple, token(9), 20, &[], false).unwrap();
        assert_eq!(pair.native_index, 0);
        assert!(!pair.is_wrapped_native());
    }

    #[test]
    fn classify_drops_banned_and_stable() {
        let triple = [contracts::metis_token(), token(5), token(7)];
        assert!(classify(triple, token(9), 20, &[token(5)], false).is_none());
        assert!(classify(triple, token(9), 20, &[], true).is_none());
    }

    #[test]
    fn classify_drops_hard_banned_pair() {
        let bad = contracts::addr(HARD_BANNED_PAIRS[0]);
        let triple = [contracts::metis_token(), token(5), bad];
        assert!(classify(triple, token(9), 20, &[], false).is_none());
    }
}
