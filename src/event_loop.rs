//! The primary task: consume sync events, keep the reserve mirror current,
//! run the opportunity search and hand batches to the gateway.
//!
//! All registry state is owned here; submission tasks receive copies of the
//! arb records and never touch the registry. On any event the loop holds a
//! short coalescing window, draining further events into the same update
//! batch so a block's worth of syncs is searched as one consistent snapshot.

use crate::bigmath::format_native;
use crate::config::Config;
use crate::contracts::{self, Arb, FlashUniswapQuery};
use crate::engine::{self, Scope, SearchParams};
use crate::error::BotError;
use crate::executor::{self, ExecutorGateway};
use crate::pricing;
use crate::registry::MarketRegistry;
use crate::telemetry::{Notifier, SessionStats};
use crate::ReadProvider;
use ethers::providers::Middleware;
use ethers::types::{Address, BlockNumber, Filter, Log, H256, U256};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Capacity of the bounded sync-event queue.
pub const EVENT_QUEUE_CAPACITY: usize = 200;
/// Balance drop (in whole native units) that trips the kill-switch.
pub const MAX_DROP_THRESHOLD_NATIVE: f64 = 0.5;
/// How long the loop suspends after the kill-switch trips.
pub const BALANCE_SUSPENSION: Duration = Duration::from_secs(24 * 60 * 60);

/// Gas a reverted arb burns; the profit floor must cover several of these.
const ARB_FAILURE_GAS_COST: u64 = 150_000;
const FAILURE_BUFFER_MULTIPLIER: u64 = 10;

/// Profit floors derived from the current gas bid: a primary opportunity must
/// cover `FAILURE_BUFFER_MULTIPLIER` reverted attempts, follow-ups a fraction
/// of that.
pub fn gas_adjusted_min_profit(bid_gas_price: U256, followup_divisor: u64) -> (U256, U256) {
    let min_profit = bid_gas_price
        .saturating_mul(U256::from(ARB_FAILURE_GAS_COST))
        .saturating_mul(U256::from(FAILURE_BUFFER_MULTIPLIER));
    (min_profit, min_profit / U256::from(followup_divisor.max(1)))
}

/// Forward the sync-event subscription into a bounded queue. When the
/// subscription ends the sender drops, which the loop reads as
/// `SUBSCRIPTION_LOST`.
pub fn spawn_sync_forwarder(provider: Arc<ReadProvider>) -> mpsc::Receiver<Log> {
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    tokio::spawn(async move {
        let filter = Filter::new().topic0(vec![
            contracts::sync_topic_uniswap_v2(),
            contracts::sync_topic_hermes(),
        ]);
        let mut stream = match provider.subscribe_logs(&filter).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(error = %e, "failed to subscribe to sync logs");
                return;
            }
        };
        while let Some(log) = stream.next().await {
            if tx.send(log).await.is_err() {
                break;
            }
        }
    });
    rx
}

pub struct ArbBot {
    pub provider: Arc<ReadProvider>,
    pub query: FlashUniswapQuery<ReadProvider>,
    pub gateway: ExecutorGateway,
    pub registry: MarketRegistry,
    pub params: SearchParams,
    pub config: Config,
    pub executor_account: Address,
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_buffer: U256,
    pub current_balance: U256,
    pub notifier: Box<dyn Notifier>,
    pub stats: SessionStats,
    pub highest_balance: U256,
    pub previous_block: u64,
}

impl ArbBot {
    /// Refresh reserves once before listening so no pre-subscription sync is
    /// missed, then price every pool.
    pub async fn prime(&mut self) -> Result<(), BotError> {
        tokio::time::sleep(Duration::from_millis(500)).await;
        self.refresh_reserves().await?;
        pricing::price_all(&mut self.registry, self.params.base_native);
        Ok(())
    }

    pub fn bid_gas_price(&self) -> U256 {
        self.gas_price.saturating_add(self.gas_buffer)
    }

    pub fn recalc_min_profit(&mut self) {
        let (min_profit, min_profit_followup) = gas_adjusted_min_profit(
            self.bid_gas_price(),
            self.config.min_profit_followup_divisor,
        );
        self.params.min_profit = min_profit;
        self.params.min_profit_followup = min_profit_followup;
        info!(
            min_profit = %format_native(min_profit),
            min_profit_followup = %format_native(min_profit_followup),
            "profit floors updated"
        );
    }

    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<Log>,
        mut stop: watch::Receiver<bool>,
    ) -> Result<(), BotError> {
        let topic_v2 = contracts::sync_topic_uniswap_v2();
        let topic_hermes = contracts::sync_topic_hermes();
        let drop_threshold = crate::bigmath::to_wei(MAX_DROP_THRESHOLD_NATIVE, 18)?;

        let second = Duration::from_secs(1);
        let minute = Duration::from_secs(60);
        let five_minutes = Duration::from_secs(300);
        let mut search_tick =
            tokio::time::interval_at(tokio::time::Instant::now() + second, second);
        let mut nonce_tick = tokio::time::interval_at(tokio::time::Instant::now() + minute, minute);
        let mut safety_tick =
            tokio::time::interval_at(tokio::time::Instant::now() + five_minutes, five_minutes);

        info!("setup complete - listening to new events");

        loop {
            tokio::select! {
                _ = stop.changed() => {
                    info!("stop signal received");
                    return Ok(());
                }
                maybe_log = events.recv() => {
                    match maybe_log {
                        None => return Err(BotError::SubscriptionLost),
                        Some(log) => {
                            self.handle_sync_event(log, &mut events, topic_v2, topic_hermes).await;
                        }
                    }
                }
                _ = search_tick.tick() => self.handle_search_tick().await,
                _ = nonce_tick.tick() => self.handle_nonce_tick().await,
                _ = safety_tick.tick() => self.handle_safety_tick(drop_threshold).await,
            }
        }
    }

    /// Periodic path: refresh the whole reserve table and search every token.
    async fn handle_search_tick(&mut self) {
        let started = Instant::now();
        if let Err(e) = self.refresh_reserves().await {
            warn!(error = %e, "reserve refresh failed, retrying next tick");
            return;
        }

        let arbs = match engine::evaluate(&mut self.registry, Scope::All, false, 0, &self.params) {
            Ok(arbs) => arbs,
            Err(e) => {
                error!(error = %e, "search pass aborted");
                self.registry.mark_all_stale();
                return;
            }
        };

        if !self.config.performance_mode {
            info!(elapsed = ?started.elapsed(), "polling and processing done");
        }

        self.dispatch(arbs);
        self.registry.mark_all_stale();
        self.log_update();
    }

    /// Event path: apply the triggering sync, then drain the queue inside the
    /// coalescing window, re-searching the affected token whenever new state
    /// arrived. The window extends while events keep coming.
    async fn handle_sync_event(
        &mut self,
        log: Log,
        events: &mut mpsc::Receiver<Log>,
        topic_v2: H256,
        topic_hermes: H256,
    ) {
        let Some(mut token) = self.apply_sync_log(&log, topic_v2, topic_hermes) else {
            return;
        };

        let block = log.block_number.map(|b| b.as_u64()).unwrap_or_default();
        info!(block, "got sync event");
        if block == self.previous_block {
            debug!("event arrived for an already-searched block");
            self.stats.premature_calcs += 1;
        }
        self.previous_block = block;

        let window = self.config.event_delay();
        let started = Instant::now();
        let mut new_event = true;
        let mut subsequent_event = false;
        let mut arbs: Vec<Arb> = Vec::new();

        while started.elapsed() < window || !events.is_empty() || new_event {
            while let Ok(next) = events.try_recv() {
                let Some(t) = self.apply_sync_log(&next, topic_v2, topic_hermes) else {
                    continue;
                };
                let next_block = next.block_number.map(|b| b.as_u64()).unwrap_or_default();
                if next_block > self.previous_block {
                    self.previous_block = next_block;
                }
                token = t;
                new_event = true;
                subsequent_event = true;
            }

            if new_event {
                arbs = match engine::evaluate(
                    &mut self.registry,
                    Scope::Token(token),
                    false,
                    0,
                    &self.params,
                ) {
                    Ok(arbs) => arbs,
                    Err(e) => {
                        error!(error = %e, "search pass aborted");
                        Vec::new()
                    }
                };
                new_event = false;
            }

            tokio::task::yield_now().await;
        }

        if !self.config.performance_mode {
            info!(elapsed = ?started.elapsed(), "polling and processing done");
        }

        self.dispatch(arbs);
        self.registry.mark_all_stale();
        if subsequent_event {
            self.stats.subsequent_events += 1;
        }
        self.log_update();
    }

    /// Decode a sync log and fold it into the registry. Returns the affected
    /// quote token, or `None` for foreign topics and unknown pools.
    fn apply_sync_log(&mut self, log: &Log, topic_v2: H256, topic_hermes: H256) -> Option<Address> {
        let topic = log.topics.first()?;
        if *topic != topic_v2 && *topic != topic_hermes {
            return None;
        }
        let (r0, r1) = contracts::decode_sync_data(&log.data)?;
        let loc = self.registry.set_reserves(log.address, r0, r1)?;
        pricing::reprice(&mut self.registry, &loc, self.params.base_native);
        Some(loc.token)
    }

    /// Hand a batch to the gateway. A single arb is not worth the revert
    /// risk; only batches carrying a follow-up or a second market go out.
    fn dispatch(&mut self, arbs: Vec<Arb>) {
        if arbs.len() <= 1 {
            debug!(block = self.previous_block, "no dispatchable arbs");
            return;
        }

        info!(
            block = self.previous_block,
            count = arbs.len(),
            total_profit = %format_native(executor::total_profit(&arbs)),
            "opportunities found"
        );
        for (index, arb) in arbs.iter().enumerate() {
            info!("opportunity {index}: {}", executor::describe(arb));
        }

        let batch_size = arbs.len() as u64;
        self.gateway.submit(
            arbs,
            self.params.min_profit_followup,
            self.nonce,
            self.bid_gas_price(),
        );
        self.nonce += 1;

        self.stats.total_opportunities += 1;
        if batch_size > self.stats.most_opportunities_in_block {
            self.stats.most_opportunities_in_block = batch_size;
        }
    }

    async fn handle_nonce_tick(&mut self) {
        match self
            .provider
            .get_transaction_count(self.executor_account, Some(BlockNumber::Pending.into()))
            .await
        {
            Ok(nonce) => {
                self.nonce = nonce.as_u64();
                info!(nonce = self.nonce, "synced nonce");
            }
            Err(e) => warn!(error = %e, "nonce resync failed, retrying next tick"),
        }
    }

    /// Balance and gas housekeeping plus the kill-switch: record the balance
    /// high-water mark and suspend for a day when it drops too far.
    async fn handle_safety_tick(&mut self, drop_threshold: U256) {
        match self
            .provider
            .get_balance(self.executor_account, None)
            .await
        {
            Ok(balance) => self.current_balance = balance,
            Err(e) => {
                warn!(error = %e, "balance read failed, retrying next tick");
                return;
            }
        }

        match self.provider.get_gas_price().await {
            Ok(price) => {
                self.gas_price = price;
                self.recalc_min_profit();
            }
            Err(e) => warn!(error = %e, "gas price read failed, retrying next tick"),
        }

        self.notifier.notify(&format!(
            "balance: {}",
            format_native(self.current_balance)
        ));

        if self.current_balance > self.highest_balance {
            self.highest_balance = self.current_balance;
        }
        if self.highest_balance.saturating_sub(self.current_balance) > drop_threshold {
            self.notifier
                .notify("large balance drop detected - please check status, sleeping");
            tokio::time::sleep(BALANCE_SUSPENSION).await;
        }
    }

    async fn refresh_reserves(&mut self) -> Result<(), BotError> {
        if self.registry.pair_count() == 0 {
            return Ok(());
        }
        let started = Instant::now();
        let rows = self
            .query
            .get_reserves_by_pairs(self.registry.all_pair_addresses.clone())
            .call()
            .await
            .map_err(|e| BotError::RpcTransient(format!("getReservesByPairs: {e}")))?;
        self.registry
            .set_reserves_batch(rows.into_iter().map(|triple| (triple[0], triple[1])).collect())?;
        if !self.config.performance_mode {
            debug!(elapsed = ?started.elapsed(), "refreshed all reserves");
        }
        Ok(())
    }

    fn log_update(&self) {
        let sent = self.gateway.sent_count();
        info!(
            total_opportunities = self.stats.total_opportunities,
            arb_tx_sent_count = sent,
            failed_txs = self.stats.total_opportunities.saturating_sub(sent),
            premature_calcs = self.stats.premature_calcs,
            subsequent_events = self.stats.subsequent_events,
            balance = %format_native(self.current_balance),
            "update"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profit_floor_scales_with_gas_bid() {
        let gwei = U256::exp10(9);
        let bid = gwei * U256::from(20u64);
        let (min, followup) = gas_adjusted_min_profit(bid, 10);
        assert_eq!(min, bid * U256::from(150_000u64) * U256::from(10u64));
        assert_eq!(followup, min / U256::from(10u64));
    }

    #[test]
    fn followup_divisor_zero_is_clamped() {
        let (min, followup) = gas_adjusted_min_profit(U256::from(1_000u64), 0);
        assert_eq!(followup, min);
    }
}
