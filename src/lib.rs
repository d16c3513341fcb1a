pub mod amm_math;
pub mod bigmath;
pub mod config;
pub mod contracts;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod event_loop;
pub mod executor;
pub mod pricing;
pub mod registry;
pub mod simulator;
pub mod snapshot;
pub mod telemetry;

pub use error::BotError;

/// WebSocket provider used for reads and the sync-event subscription.
pub type ReadProvider = ethers::providers::Provider<ethers::providers::Ws>;

/// Signing client used for submissions.
pub type WriteClient = ethers::middleware::SignerMiddleware<
    ethers::providers::Provider<ethers::providers::Ws>,
    ethers::signers::LocalWallet,
>;
