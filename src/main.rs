use anyhow::{bail, Context, Result};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Middleware, Provider, Ws};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, BlockNumber, U256};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use metis_arb::bigmath::{format_native, to_wei};
use metis_arb::config::Config;
use metis_arb::contracts::{
    self, AgoraSwapFactory, FlashSwapExecutor, FlashUniswapQuery, NetSwapFactory, TokenProvidence,
};
use metis_arb::discovery::Discovery;
use metis_arb::engine::SearchParams;
use metis_arb::event_loop::{self, ArbBot};
use metis_arb::executor::ExecutorGateway;
use metis_arb::snapshot;
use metis_arb::telemetry::{LogNotifier, SessionStats};

const BOT_NAME: &str = "metis-arb";
const BOT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Factory fee getters return their native scale; we keep fees in 1/10,000
/// of the input.
fn dynamic_fee(raw: U256) -> Result<u32> {
    if raw > U256::from(1_000u64) {
        bail!("factory fee {raw} out of range");
    }
    let scaled = raw.as_u64() as u32 * 10;
    if scaled >= 10_000 {
        bail!("factory fee {scaled} exceeds the fee denominator");
    }
    Ok(scaled)
}

fn override_fee(factories: &mut [(Address, u32)], factory: Address, fee: u32) {
    for (address, slot) in factories.iter_mut() {
        if *address == factory {
            *slot = fee;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,metis_arb=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    info!(bot = BOT_NAME, version = BOT_VERSION, "starting bot");
    if config.debug_mode {
        info!("DEBUG MODE ON");
    }
    info!(config = %serde_json::to_string(&config)?, "setting up");

    let base_native = to_wei(config.base_native_pricing_amount, 18)?;
    let min_native = to_wei(config.minimum_native_amount, 18)?;
    let min_profit_seed = to_wei(config.minimum_profit, 18)?;
    let gas_buffer = to_wei(config.gas_price_buffer_gwei, 9)?;

    // Clients: one WebSocket endpoint for reads and the subscription, and
    // optionally a second one dedicated to writes.
    let read_url =
        std::env::var(config.read_network_var()?).context("read RPC env var not set")?;
    let read = Arc::new(
        Provider::<Ws>::connect(&read_url)
            .await
            .context("connecting read client")?,
    );
    let write = match config.write_network_var()? {
        Some(var) => {
            let url = std::env::var(var).context("write RPC env var not set")?;
            Arc::new(
                Provider::<Ws>::connect(&url)
                    .await
                    .context("connecting write client")?,
            )
        }
        None => read.clone(),
    };

    // Executor account.
    let key = std::env::var(&config.use_account)
        .with_context(|| format!("{} not set", config.use_account))?;
    let chain_id = read.get_chainid().await.context("reading chain id")?;
    let wallet = key
        .parse::<LocalWallet>()
        .context("parsing executor private key")?
        .with_chain_id(chain_id.as_u64());
    let executor_account = wallet.address();
    let signer = Arc::new(SignerMiddleware::new((*write).clone(), wallet));

    // Contract bindings.
    let query = FlashUniswapQuery::new(config.flash_query_address, read.clone());
    let providence = TokenProvidence::new(config.token_providence_address, read.clone());
    let executor_contract = FlashSwapExecutor::new(config.executor_address, signer);
    info!(
        flash_query = ?config.flash_query_address,
        executor = ?config.executor_address,
        token_providence = ?config.token_providence_address,
        "contracts loaded"
    );

    // AgoraSwap and NetSwap publish their fees on-chain; read them once.
    let mut factories = contracts::factory_fees();
    let agora = AgoraSwapFactory::new(
        contracts::addr(contracts::AGORASWAP_FACTORY_ADDRESS),
        read.clone(),
    );
    let netswap = NetSwapFactory::new(
        contracts::addr(contracts::NETSWAP_FACTORY_ADDRESS),
        read.clone(),
    );
    let agora_fee = dynamic_fee(
        agora
            .fee()
            .call()
            .await
            .context("reading AgoraSwap fee")?,
    )?;
    let netswap_fee = dynamic_fee(
        netswap
            .fee_rate()
            .call()
            .await
            .context("reading NetSwap feeRate")?,
    )?;
    override_fee(
        &mut factories,
        contracts::addr(contracts::AGORASWAP_FACTORY_ADDRESS),
        agora_fee,
    );
    override_fee(
        &mut factories,
        contracts::addr(contracts::NETSWAP_FACTORY_ADDRESS),
        netswap_fee,
    );
    info!(
        agora_swap = agora_fee,
        net_swap = netswap_fee,
        "pulled dex fees in fee-per-ten-thousands"
    );

    // Account state and the initial gas bid.
    let nonce = read
        .get_transaction_count(executor_account, Some(BlockNumber::Pending.into()))
        .await
        .context("reading nonce")?
        .as_u64();
    let balance = read
        .get_balance(executor_account, None)
        .await
        .context("reading balance")?;
    let gas_price = read.get_gas_price().await.context("reading gas price")?;
    info!(
        account = ?executor_account,
        nonce,
        balance = %format_native(balance),
        "executor account ready"
    );

    // Pool universe: live discovery, or the snapshot in debug mode.
    let registry = if config.debug_mode {
        snapshot::load(&config.data_dir)?
    } else {
        Discovery {
            query: query.clone(),
            providence,
            factories,
            banned_tokens: config.banned_tokens.clone(),
            min_native_reserve: min_native,
            executor_address: executor_account,
            gas_price,
        }
        .run()
        .await?
    };
    info!(total_pairs = registry.pair_count(), "pulled all pairs");

    let params = SearchParams {
        base_native,
        min_profit: min_profit_seed,
        min_profit_followup: min_profit_seed
            / U256::from(config.min_profit_followup_divisor.max(1)),
    };

    let mut bot = ArbBot {
        provider: read.clone(),
        query,
        gateway: ExecutorGateway::new(executor_contract),
        registry,
        params,
        config,
        executor_account,
        nonce,
        gas_price,
        gas_buffer,
        current_balance: balance,
        notifier: Box::new(LogNotifier),
        stats: SessionStats::default(),
        highest_balance: balance,
        previous_block: 0,
    };
    bot.recalc_min_profit();
    bot.prime().await?;
    snapshot::write(&bot.config.data_dir, &bot.registry)?;
    bot.registry.mark_all_stale();

    let events = event_loop::spawn_sync_forwarder(read);
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = stop_tx.send(true);
        }
    });

    bot.run(events, stop_rx).await?;
    info!("cleanup complete");
    Ok(())
}
