//! In-memory mirror of the pool universe.
//!
//! Pools are indexed by their quote token (the non-Metis side). Reserves live
//! in one contiguous table so batched RPC responses copy straight in; each
//! pair carries the index of its row, and a reverse index maps a pair address
//! back to its slot for O(1) event handling.

use crate::error::BotError;
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Freshness {
    Stale,
    Fresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveRow {
    pub reserve0: U256,
    pub reserve1: U256,
    pub freshness: Freshness,
}

impl ReserveRow {
    fn zeroed() -> Self {
        Self {
            reserve0: U256::zero(),
            reserve1: U256::zero(),
            freshness: Freshness::Stale,
        }
    }

    pub fn get(&self, index: usize) -> U256 {
        if index == 0 {
            self.reserve0
        } else {
            self.reserve1
        }
    }

    pub fn set(&mut self, index: usize, value: U256) {
        if index == 0 {
            self.reserve0 = value;
        } else {
            self.reserve1 = value;
        }
    }
}

/// One constant-product liquidity pair holding Metis (or WMetis) on one side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pair {
    pub address: Address,
    pub factory: Address,
    /// Fee numerator in 1/10,000 of the input.
    pub fee: u32,
    pub tokens: [Address; 2],
    /// Index of the native (Metis/WMetis) side within `tokens`.
    pub native_index: usize,
    /// Index of the quote token within `tokens`.
    pub quote_index: usize,
    /// The concrete native-side token address that matched at discovery.
    pub native_token: Address,
    /// Row of this pair in the registry's reserve table.
    pub reserve_row: usize,
    /// Cached indicative price: quote received for BASE_NATIVE.
    pub sell_native_price: U256,
    /// Cached indicative price: quote required to withdraw BASE_NATIVE.
    pub buy_native_price: U256,
}

impl Pair {
    pub fn quote_token(&self) -> Address {
        self.tokens[self.quote_index]
    }

    pub fn is_wrapped_native(&self) -> bool {
        self.native_token == crate::contracts::wmetis_token()
    }
}

/// Location of a pair inside the quote-token index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairLocation {
    pub token: Address,
    pub index: usize,
}

#[derive(Debug, Default, Clone)]
pub struct MarketRegistry {
    pub pairs_by_token: HashMap<Address, Vec<Pair>>,
    pub reserves: Vec<ReserveRow>,
    pub all_pair_addresses: Vec<Address>,
    pub all_pair_factories: Vec<Address>,
    pub mapping: HashMap<Address, PairLocation>,
}

impl MarketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pair_count(&self) -> usize {
        self.all_pair_addresses.len()
    }

    pub fn token_count(&self) -> usize {
        self.pairs_by_token.len()
    }

    pub fn pair(&self, loc: &PairLocation) -> Option<&Pair> {
        self.pairs_by_token.get(&loc.token)?.get(loc.index)
    }

    pub fn pair_mut(&mut self, loc: &PairLocation) -> Option<&mut Pair> {
        self.pairs_by_token.get_mut(&loc.token)?.get_mut(loc.index)
    }

    /// Register a pair, appending a zero reserve row and a reverse-index entry.
    pub fn insert(&mut self, mut pair: Pair) -> Result<(), BotError> {
        if self.mapping.contains_key(&pair.address) {
            return Err(BotError::DuplicatePool(pair.address));
        }
        pair.reserve_row = self.reserves.len();
        self.reserves.push(ReserveRow::zeroed());
        self.all_pair_addresses.push(pair.address);
        self.all_pair_factories.push(pair.factory);

        let token = pair.quote_token();
        let list = self.pairs_by_token.entry(token).or_default();
        self.mapping.insert(
            pair.address,
            PairLocation {
                token,
                index: list.len(),
            },
        );
        list.push(pair);
        Ok(())
    }

    /// Overwrite one pair's reserves from a sync event and mark it fresh.
    /// Unknown addresses are ignored (the subscription is topic-filtered, not
    /// address-filtered).
    pub fn set_reserves(&mut self, pair: Address, r0: U256, r1: U256) -> Option<PairLocation> {
        let loc = self.mapping.get(&pair)?.clone();
        let row = self.pair(&loc)?.reserve_row;
        self.reserves[row] = ReserveRow {
            reserve0: r0,
            reserve1: r1,
            freshness: Freshness::Fresh,
        };
        Some(loc)
    }

    /// Replace the whole reserve table from a batched read; every row fresh.
    pub fn set_reserves_batch(&mut self, rows: Vec<(U256, U256)>) -> Result<(), BotError> {
        if rows.len() != self.reserves.len() {
            return Err(BotError::ReserveBatchMismatch {
                got: rows.len(),
                want: self.reserves.len(),
            });
        }
        for (row, (r0, r1)) in self.reserves.iter_mut().zip(rows) {
            row.reserve0 = r0;
            row.reserve1 = r1;
            row.freshness = Freshness::Fresh;
        }
        Ok(())
    }

    /// Reset every freshness flag after a search pass.
    pub fn mark_all_stale(&mut self) {
        for row in &mut self.reserves {
            row.freshness = Freshness::Stale;
        }
    }

    pub fn native_reserve(&self, pair: &Pair) -> U256 {
        self.reserves[pair.reserve_row].get(pair.native_index)
    }

    pub fn quote_reserve(&self, pair: &Pair) -> U256 {
        self.reserves[pair.reserve_row].get(pair.quote_index)
    }

    /// Stable-sort each quote token's pair list by descending native-side
    /// reserve and re-establish the reverse index. Rows never move, so the
    /// `reserve_row` back-references stay valid. Called once after discovery.
    pub fn sort_by_liquidity(&mut self) {
        let reserves = &self.reserves;
        for pairs in self.pairs_by_token.values_mut() {
            pairs.sort_by(|a, b| {
                reserves[b.reserve_row]
                    .get(b.native_index)
                    .cmp(&reserves[a.reserve_row].get(a.native_index))
            });
        }
        self.rebuild_mapping();
    }

    /// Drop pairs failing `keep`; the survivors are re-packed into a fresh
    /// reserve table, carrying their current reserve values.
    pub fn retain_pairs<F>(&mut self, keep: F)
    where
        F: Fn(&Pair, &ReserveRow) -> bool,
    {
        let reserves = std::mem::take(&mut self.reserves);
        let old = std::mem::take(&mut self.pairs_by_token);
        let mut surviving: Vec<(Address, Vec<Pair>)> = Vec::new();
        for (token, pairs) in old {
            let kept: Vec<Pair> = pairs
                .into_iter()
                .filter(|p| keep(p, &reserves[p.reserve_row]))
                .collect();
            if !kept.is_empty() {
                surviving.push((token, kept));
            }
        }
        self.repack(surviving, &reserves);
    }

    /// Drop whole quote tokens failing `keep` (multi-pool and health gates).
    pub fn retain_tokens<F>(&mut self, keep: F)
    where
        F: Fn(&Address, &[Pair]) -> bool,
    {
        let reserves = std::mem::take(&mut self.reserves);
        let old = std::mem::take(&mut self.pairs_by_token);
        let surviving: Vec<(Address, Vec<Pair>)> = old
            .into_iter()
            .filter(|(token, pairs)| keep(token, pairs))
            .collect();
        self.repack(surviving, &reserves);
    }

    fn repack(&mut self, surviving: Vec<(Address, Vec<Pair>)>, old_rows: &[ReserveRow]) {
        self.all_pair_addresses.clear();
        self.all_pair_factories.clear();
        self.mapping.clear();
        self.reserves = Vec::new();
        self.pairs_by_token = HashMap::new();

        for (token, pairs) in surviving {
            let mut repacked = Vec::with_capacity(pairs.len());
            for (index, mut pair) in pairs.into_iter().enumerate() {
                let row = old_rows[pair.reserve_row].clone();
                pair.reserve_row = self.reserves.len();
                self.reserves.push(row);
                self.all_pair_addresses.push(pair.address);
                self.all_pair_factories.push(pair.factory);
                self.mapping
                    .insert(pair.address, PairLocation { token, index });
                repacked.push(pair);
            }
            self.pairs_by_token.insert(token, repacked);
        }
    }

    fn rebuild_mapping(&mut self) {
        self.mapping.clear();
        for (token, pairs) in &self.pairs_by_token {
            for (index, pair) in pairs.iter().enumerate() {
                self.mapping.insert(
                    pair.address,
                    PairLocation {
                        token: *token,
                        index,
                    },
                );
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use test_support::{pair, registry_with};

    fn eth(n: u64) -> U256 {
        U256::from(n) * U256::exp10(18)
    }

    #[test]
    fn insert_rejects_duplicate_addresses() {
        let (p, _, _) = pair(1, eth(10), eth(10), 30);
        let mut reg = MarketRegistry::new();
        reg.insert(p.clone()).unwrap();
        assert!(matches!(
            reg.insert(p).unwrap_err(),
            BotError::DuplicatePool(_)
        ));
    }

    #[test]
    fn reverse_index_locates_every_pair() {
        let reg = registry_with(vec![
            pair(1, eth(5), eth(5), 30),
            pair(2, eth(9), eth(5), 30),
            pair(3, eth(7), eth(5), 30),
        ]);
        for (token, pairs) in &reg.pairs_by_token {
            for (i, p) in pairs.iter().enumerate() {
                let loc = &reg.mapping[&p.address];
                assert_eq!(loc.token, *token);
                assert_eq!(loc.index, i);
            }
        }
    }

    #[test]
    fn event_update_marks_only_that_row_fresh() {
        let mut reg = registry_with(vec![pair(1, eth(5), eth(5), 30), pair(2, eth(9), eth(5), 30)]);
        reg.mark_all_stale();
        let target = Address::from_low_u64_be(2);
        let loc = reg.set_reserves(target, eth(11), eth(4)).unwrap();
        let updated_row = reg.pair(&loc).unwrap().reserve_row;
        for (i, row) in reg.reserves.iter().enumerate() {
            let expected = if i == updated_row {
                Freshness::Fresh
            } else {
                Freshness::Stale
            };
            assert_eq!(row.freshness, expected);
        }
        assert_eq!(reg.reserves[updated_row].reserve0, eth(11));
    }

    #[test]
    fn unknown_event_address_is_ignored() {
        let mut reg = registry_with(vec![pair(1, eth(5), eth(5), 30)]);
        assert!(reg
            .set_reserves(Address::from_low_u64_be(99), eth(1), eth(1))
            .is_none());
    }

    #[test]
    fn batch_length_must_match() {
        let mut reg = registry_with(vec![pair(1, eth(5), eth(5), 30)]);
        let err = reg
            .set_reserves_batch(vec![(eth(1), eth(1)), (eth(2), eth(2))])
            .unwrap_err();
        assert!(matches!(err, BotError::ReserveBatchMismatch { .. }));
    }

    #[test]
    fn liquidity_sort_orders_descending_and_keeps_invariants() {
        let mut reg = registry_with(vec![
            pair(1, eth(5), eth(5), 30),
            pair(2, eth(9), eth(5), 30),
            pair(3, eth(7), eth(5), 30),
        ]);
        reg.sort_by_liquidity();
        for pairs in reg.pairs_by_token.values() {
            for window in pairs.windows(2) {
                assert!(reg.native_reserve(&window[0]) >= reg.native_reserve(&window[1]));
            }
        }
        // reverse index re-established, rows still addressed by back-reference
        for (token, pairs) in &reg.pairs_by_token {
            for (i, p) in pairs.iter().enumerate() {
                let loc = &reg.mapping[&p.address];
                assert_eq!((loc.token, loc.index), (*token, i));
                assert_eq!(reg.all_pair_addresses[p.reserve_row], p.address);
            }
        }
    }

    #[test]
    fn retain_pairs_repacks_rows_and_indexes() {
        let mut reg = registry_with(vec![
            pair(1, eth(5), eth(5), 30),
            pair(2, eth(9), eth(5), 30),
            pair(3, eth(7), eth(5), 30),
        ]);
        reg.retain_pairs(|_, row| row.reserve0 >= eth(7));
        assert_eq!(reg.pair_count(), 2);
        assert_eq!(reg.reserves.len(), 2);
        for (token, pairs) in &reg.pairs_by_token {
            for (i, p) in pairs.iter().enumerate() {
                assert_eq!(reg.all_pair_addresses[p.reserve_row], p.address);
                let loc = &reg.mapping[&p.address];
                assert_eq!((loc.token, loc.index), (*token, i));
            }
        }
    }

    #[test]
    fn retain_tokens_drops_whole_token() {
        let mut reg = registry_with(vec![pair(1, eth(5), eth(5), 30), pair(2, eth(9), eth(5), 30)]);
        reg.retain_tokens(|_, _| false);
        assert_eq!(reg.token_count(), 0);
        assert_eq!(reg.pair_count(), 0);
        assert!(reg.reserves.is_empty());
        assert!(reg.mapping.is_empty());
    }
}
