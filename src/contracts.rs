//! On-chain interfaces and Metis Andromeda constants.
//!
//! ABIs are declared inline in human-readable form, the same way the rest of
//! our bots bind their contracts. `Arb` is the value struct consumed by the
//! flash-swap executor and doubles as the in-process opportunity record.

use ethers::prelude::abigen;
use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;

abigen!(
    FlashSwapExecutor,
    r#"[
        struct Arb { address buyFromPair; uint256 nativeInAmount; uint256 tokenAmount; uint256 nativeOutAmount; address sellToPair; uint256 profit; uint8 buyFromFee; uint8 sellToFee; bool buyFromIsWMetis; bool sellToIsWMetis }
        function executeNativeArb(Arb[] calldata arbs, uint256 minTotalProfit) external
    ]"#
);

abigen!(
    FlashUniswapQuery,
    r#"[
        function getPairsByIndexRange(address factory, uint256 start, uint256 stop) external view returns (address[3][] memory)
        function getReservesByPairs(address[] calldata pairs) external view returns (uint256[3][] memory)
        function filterVolatileHermesPairs(address[] calldata pairs) external view returns (bool[] memory)
    ]"#
);

abigen!(
    TokenProvidence,
    r#"[
        function healthCheck(address pair, address token, uint256 fee) external payable
    ]"#
);

abigen!(
    AgoraSwapFactory,
    r#"[
        function fee() external view returns (uint256)
    ]"#
);

abigen!(
    NetSwapFactory,
    r#"[
        function feeRate() external view returns (uint256)
    ]"#
);

pub const METIS_TOKEN_ADDRESS: &str = "0xdeaddeaddeaddeaddeaddeaddeaddeaddead0000";
pub const WMETIS_TOKEN_ADDRESS: &str = "0x75cb093e4d61d2a2e65d8e0bbb01de8d89b53481";

pub const NETSWAP_FACTORY_ADDRESS: &str = "0x70f51d68d16e8f9e418441280342bd43ac9dff9f";
pub const AGORASWAP_FACTORY_ADDRESS: &str = "0x3a8bb6612bcb7eff9c14cefc4e7e0cf7bc17a3b7";
pub const TETHYS_FACTORY_ADDRESS: &str = "0x2cdfb20205701ff01689461610c9f321d1d00f80";
pub const HERMES_FACTORY_ADDRESS: &str = "0x633a093c9e94f64500fc8fcbb48e90dd52f6668f";
pub const STANDARD_FACTORY_ADDRESS: &str = "0x9e60df6db352f6a33a4e839695f4c39e1e5f1286";
pub const UNKNOWN_FACTORY_ADDRESS: &str = "0xd5a4a6c75f24bbd8f5e27ae77d7c8a9c5f1e11aa";
pub const METIDORIAN_FACTORY_ADDRESS: &str = "0x580ed43f3bba06555785c81c2957efcca71f7483";

/// Pair contract with a broken token that reverts inside getReserves.
pub const HARD_BANNED_PAIRS: [&str; 1] = ["0x7b934f9d64fcea42967db7e5fb15f2dbee95db24"];

/// Default fee numerators in 1/10,000 of the input. NetSwap and AgoraSwap
/// expose a dynamic fee that is read once at startup and overrides these.
pub const FACTORY_FEES_PER_TEN_THOUSANDS: [(&str, u32); 7] = [
    (NETSWAP_FACTORY_ADDRESS, 30),
    (AGORASWAP_FACTORY_ADDRESS, 10),
    (TETHYS_FACTORY_ADDRESS, 20),
    (HERMES_FACTORY_ADDRESS, 1),
    (STANDARD_FACTORY_ADDRESS, 30),
    (UNKNOWN_FACTORY_ADDRESS, 20),
    (METIDORIAN_FACTORY_ADDRESS, 25),
];

pub fn addr(s: &str) -> Address {
    s.parse().unwrap()
}

pub fn metis_token() -> Address {
    addr(METIS_TOKEN_ADDRESS)
}

pub fn wmetis_token() -> Address {
    addr(WMETIS_TOKEN_ADDRESS)
}

pub fn hermes_factory() -> Address {
    addr(HERMES_FACTORY_ADDRESS)
}

pub fn factory_fees() -> Vec<(Address, u32)> {
    FACTORY_FEES_PER_TEN_THOUSANDS
        .iter()
        .map(|(a, fee)| (addr(a), *fee))
        .collect()
}

/// Topic of the classic pair reserve event, `Sync(uint112,uint112)`.
pub fn sync_topic_uniswap_v2() -> H256 {
    H256::from(keccak256(b"Sync(uint112,uint112)"))
}

/// Topic of the Hermes-style reserve event, `Sync(uint256,uint256)`.
pub fn sync_topic_hermes() -> H256 {
    H256::from(keccak256(b"Sync(uint256,uint256)"))
}

/// Both Sync variants ABI-encode two unsigned reserve words.
pub fn decode_sync_data(data: &[u8]) -> Option<(U256, U256)> {
    if data.len() < 64 {
        return None;
    }
    let reserve0 = U256::from_big_endian(&data[0..32]);
    let reserve1 = U256::from_big_endian(&data[32..64]);
    Some((reserve0, reserve1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_topics_differ_by_variant() {
        assert_ne!(sync_topic_uniswap_v2(), sync_topic_hermes());
        // the classic topic is a well-known constant
        assert_eq!(
            format!("{:?}", sync_topic_uniswap_v2()),
            "0x1c411e9a96e071241c2f21f7726b17ae89e3cab4c78be50e062b03a9fffbbad1"
        );
    }

    #[test]
    fn sync_data_decodes_two_words() {
        let mut data = vec![0u8; 64];
        data[31] = 7;
        data[63] = 9;
        let (r0, r1) = decode_sync_data(&data).unwrap();
        assert_eq!(r0, U256::from(7));
        assert_eq!(r1, U256::from(9));
        assert!(decode_sync_data(&data[..63]).is_none());
    }
}
