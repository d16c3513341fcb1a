//! JSON snapshots of the registry, written once after discovery.
//!
//! In debug mode the snapshot replaces discovery entirely, which makes the
//! whole search path replayable offline against a captured pool universe.

use crate::error::BotError;
use crate::registry::{MarketRegistry, Pair, PairLocation, ReserveRow};
use ethers::types::Address;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::info;

pub const MARKET_PAIRS_BY_TOKEN_FILE: &str = "marketPairsByToken.json";
pub const ALL_MARKET_ADDRESSES_FILE: &str = "allMarketAddresses.json";
pub const ALL_MARKET_RESERVES_FILE: &str = "allMarketReserves.json";
pub const ALL_MARKET_ADDRESS_FACTORIES_FILE: &str = "allMarketAddressFactories.json";
pub const MARKET_MAPPING_FILE: &str = "marketMapping.json";

fn write_json<T: serde::Serialize>(dir: &Path, name: &str, value: &T) -> Result<(), BotError> {
    let rendered = serde_json::to_vec(value)
        .map_err(|e| BotError::Config(format!("serializing {name}: {e}")))?;
    fs::write(dir.join(name), rendered)
        .map_err(|e| BotError::Config(format!("writing {name}: {e}")))?;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(dir: &Path, name: &str) -> Result<T, BotError> {
    let raw = fs::read(dir.join(name))
        .map_err(|e| BotError::Config(format!("reading {name}: {e}")))?;
    serde_json::from_slice(&raw).map_err(|e| BotError::Config(format!("parsing {name}: {e}")))
}

pub fn write(dir: &Path, registry: &MarketRegistry) -> Result<(), BotError> {
    fs::create_dir_all(dir).map_err(|e| BotError::Config(format!("creating {dir:?}: {e}")))?;
    write_json(dir, MARKET_PAIRS_BY_TOKEN_FILE, &registry.pairs_by_token)?;
    write_json(dir, ALL_MARKET_ADDRESSES_FILE, &registry.all_pair_addresses)?;
    write_json(dir, ALL_MARKET_RESERVES_FILE, &registry.reserves)?;
    write_json(
        dir,
        ALL_MARKET_ADDRESS_FACTORIES_FILE,
        &registry.all_pair_factories,
    )?;
    write_json(dir, MARKET_MAPPING_FILE, &registry.mapping)?;
    info!(?dir, pairs = registry.pair_count(), "registry snapshot written");
    Ok(())
}

pub fn load(dir: &Path) -> Result<MarketRegistry, BotError> {
    let pairs_by_token: HashMap<Address, Vec<Pair>> =
        read_json(dir, MARKET_PAIRS_BY_TOKEN_FILE)?;
    let all_pair_addresses: Vec<Address> = read_json(dir, ALL_MARKET_ADDRESSES_FILE)?;
    let reserves: Vec<ReserveRow> = read_json(dir, ALL_MARKET_RESERVES_FILE)?;
    let all_pair_factories: Vec<Address> = read_json(dir, ALL_MARKET_ADDRESS_FACTORIES_FILE)?;
    let mapping: HashMap<Address, PairLocation> = read_json(dir, MARKET_MAPPING_FILE)?;

    if reserves.len() != all_pair_addresses.len() {
        return Err(BotError::ReserveBatchMismatch {
            got: reserves.len(),
            want: all_pair_addresses.len(),
        });
    }

    let registry = MarketRegistry {
        pairs_by_token,
        reserves,
        all_pair_addresses,
        all_pair_factories,
        mapping,
    };
    info!(?dir, pairs = registry.pair_count(), "registry snapshot loaded");
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::test_support::{pair, registry_with};
    use ethers::types::U256;

    fn eth(n: u64) -> U256 {
        U256::from(n) * U256::exp10(18)
    }

    #[test]
    fn snapshot_round_trips_the_registry() {
        let reg = registry_with(vec![
            pair(1, eth(5), eth(6), 30),
            pair(2, eth(9), eth(5), 20),
        ]);
        let dir = std::env::temp_dir().join(format!("metis-arb-snap-{}", std::process::id()));
        write(&dir, &reg).unwrap();
        let loaded = load(&dir).unwrap();
        assert_eq!(loaded.pairs_by_token, reg.pairs_by_token);
        assert_eq!(loaded.reserves, reg.reserves);
        assert_eq!(loaded.all_pair_addresses, reg.all_pair_addresses);
        assert_eq!(loaded.all_pair_factories, reg.all_pair_factories);
        assert_eq!(loaded.mapping, reg.mapping);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn mismatched_snapshot_is_rejected() {
        let reg = registry_with(vec![pair(1, eth(5), eth(6), 30)]);
        let dir = std::env::temp_dir().join(format!("metis-arb-snap-bad-{}", std::process::id()));
        write(&dir, &reg).unwrap();
        // truncate the reserve table so the files disagree
        write_json::<Vec<ReserveRow>>(&dir, ALL_MARKET_RESERVES_FILE, &Vec::new()).unwrap();
        assert!(matches!(
            load(&dir),
            Err(BotError::ReserveBatchMismatch { .. })
        ));
        std::fs::remove_dir_all(&dir).ok();
    }
}
