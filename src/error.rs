use ethers::types::{Address, U256};
use thiserror::Error;

/// Structured error types for the arbitrage bot.
///
/// Startup failures (`Config`, `RpcFatal`) abort the process; everything else
/// is handled at the site that observes it: a pool or token that produces an
/// error is dropped from the working set rather than crashing the loop.
#[derive(Error, Debug)]
pub enum BotError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("transient rpc failure: {0}")]
    RpcTransient(String),

    #[error("rpc connection lost: {0}")]
    RpcFatal(String),

    #[error("sync event subscription lost")]
    SubscriptionLost,

    #[error("token {token:?} rejected by health simulation")]
    SimulationRejected { token: Address },

    #[error("requested output {requested} exceeds pool reserve {available}")]
    InsufficientLiquidity { requested: U256, available: U256 },

    #[error("arithmetic overflow: {0}")]
    Arithmetic(&'static str),

    #[error("pool {0:?} already registered")]
    DuplicatePool(Address),

    #[error("pool {0:?} not in registry")]
    PoolNotFound(Address),

    #[error("reserve batch has {got} rows, registry has {want}")]
    ReserveBatchMismatch { got: usize, want: usize },

    #[error("nonce already used by a competing transaction")]
    NonceStale,

    #[error("submission failed: {0}")]
    UnknownSubmit(String),
}
