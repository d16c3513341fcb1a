//! Flash-swap submission gateway.
//!
//! Receives a batch of arb records and fires one `executeNativeArb`
//! transaction at the executor contract. The contract re-checks profit
//! atomically and reverts below the guard, so a lost race costs only gas.
//! Submission is fire-and-forget relative to the event loop; the loop keeps
//! searching while the transaction is in flight.

use crate::bigmath::format_native;
use crate::contracts::{Arb, FlashSwapExecutor};
use crate::error::BotError;
use crate::WriteClient;
use ethers::types::U256;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Fixed gas limit for both submissions and health simulations.
pub const GAS_LIMIT: u64 = 3_000_000;

pub struct ExecutorGateway {
    contract: FlashSwapExecutor<WriteClient>,
    sent_count: Arc<Mutex<u64>>,
}

impl ExecutorGateway {
    pub fn new(contract: FlashSwapExecutor<WriteClient>) -> Self {
        Self {
            contract,
            sent_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn sent_count(&self) -> u64 {
        *self.sent_count.lock()
    }

    /// Submit asynchronously; the caller owns the nonce bookkeeping and has
    /// already reserved `nonce` for this transaction.
    pub fn submit(&self, arbs: Vec<Arb>, min_total_profit: U256, nonce: u64, gas_price: U256) {
        let contract = self.contract.clone();
        let sent_count = self.sent_count.clone();

        tokio::spawn(async move {
            debug!(nonce, count = arbs.len(), "sending arb tx");
            let call = contract
                .execute_native_arb(arbs, min_total_profit)
                .gas(GAS_LIMIT)
                .gas_price(gas_price)
                .nonce(nonce);

            let result = call.send().await;
            match result {
                Ok(pending) => {
                    info!(hash = ?pending.tx_hash(), "arb tx sent");
                    *sent_count.lock() += 1;
                }
                Err(e) => match classify_submit_error(&e.to_string()) {
                    BotError::NonceStale => {
                        warn!("another searcher landed a faster tx, nonce consumed");
                    }
                    other => error!(error = %other, "arb tx rejected"),
                },
            }
        });
    }
}

/// `nonce too low` is the normal losing-the-race outcome; anything else is
/// unexpected but only fatal to this submission.
pub fn classify_submit_error(message: &str) -> BotError {
    if message.contains("nonce too low") {
        BotError::NonceStale
    } else {
        BotError::UnknownSubmit(message.to_string())
    }
}

/// Sum of a batch's expected profits, used for logging.
pub fn total_profit(arbs: &[Arb]) -> U256 {
    arbs.iter()
        .fold(U256::zero(), |acc, arb| acc.saturating_add(arb.profit))
}

/// Render one arb for the opportunity log.
pub fn describe(arb: &Arb) -> String {
    format!(
        "size={} out={} profit={} buy={:?} sell={:?}",
        format_native(arb.native_in_amount),
        format_native(arb.native_out_amount),
        format_native(arb.profit),
        arb.buy_from_pair,
        arb.sell_to_pair,
    )
}
