//! Live trading command
//!
//! Synchronous polling loop: fetch the price, run one strategy tick to
//! completion, sleep for the configured interval. Errors abandon the
//! current tick only; the next tick re-evaluates from exchange state.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::thread::sleep;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use grid_band_bot::exchange::Exchange;
use grid_band_bot::{
    BasketLedger, BinanceFuturesClient, BotConfig, GridBandStrategy, SessionTracker, Side,
    StateStore, StrategyError,
};

/// Minimum number of candles fetched to warm the bands
const MIN_SEED_CANDLES: usize = 120;

fn connect(config: &BotConfig) -> Result<BinanceFuturesClient> {
    let client = BinanceFuturesClient::new(&config.exchange, &config.symbol)
        .context("Failed to create HTTP client")?;
    if !client.has_credentials() {
        bail!("BINANCE_API_KEY and BINANCE_API_SECRET must be set");
    }
    Ok(client)
}

fn configure_venue(client: &BinanceFuturesClient, config: &BotConfig) {
    let symbol = &config.symbol;
    match client.set_leverage(&symbol.name, symbol.leverage) {
        Ok(()) => info!("Leverage set to {}x", symbol.leverage),
        Err(e) => warn!("Could not set leverage: {}", e),
    }
    match client.set_margin_mode(&symbol.name, symbol.margin_mode) {
        Ok(()) => info!("Margin mode {}", symbol.margin_mode.as_venue_str()),
        Err(e) => warn!("Could not set margin mode: {}", e),
    }
}

fn log_balance<E: Exchange>(exchange: &E) {
    match exchange.get_account() {
        Ok(account) => {
            let maint_ratio = if account.margin_balance > 0.0 {
                account.maint_margin / account.margin_balance * 100.0
            } else {
                0.0
            };
            info!(
                "Balance wallet={:.2} margin={:.2} available={:.2} maint_ratio={:.2}%",
                account.wallet_balance,
                account.margin_balance,
                account.available_balance,
                maint_ratio
            );
        }
        Err(e) => warn!("Balance unavailable: {}", e),
    }
}

pub fn run(config: BotConfig, drain: bool, seed: Option<Side>) -> Result<()> {
    let symbol = config.symbol.clone();
    info!(
        "Starting grid bot on {} ({}) symbol={} spacing={} max_levels={} poll={}s",
        config.exchange.base_url,
        config.env_label(),
        symbol.name,
        symbol.grid_spacing_usd,
        symbol.max_levels,
        config.poll_interval_seconds
    );

    let client = connect(&config)?;
    configure_venue(&client, &config);

    let store = StateStore::new(&config.state_file)?;
    let tracker = SessionTracker::new(&config.session_limits);
    let mut strategy =
        GridBandStrategy::new(client, symbol.clone(), store).with_close_hook(Box::new(tracker));

    match BasketLedger::open(config.ledger_path()) {
        Ok(ledger) => {
            info!("Basket ledger: {}", ledger.path().display());
            strategy = strategy.with_ledger(ledger);
        }
        Err(e) => error!("Basket ledger unavailable, closes will not be recorded: {:#}", e),
    }
    strategy.set_drain_mode(config.drain_mode || drain);

    let limit = symbol.bands.period.max(MIN_SEED_CANDLES);
    match strategy
        .exchange()
        .get_klines(&symbol.name, &symbol.timeframe, limit)
    {
        Ok(closes) => strategy.seed_indicator(&closes),
        Err(e) => warn!("Kline seeding failed, bands will warm up live: {}", e),
    }

    match strategy.reconcile_startup(Utc::now()) {
        Ok(outcome) => info!("Startup reconcile: {:?}", outcome),
        Err(e) => warn!("Startup reconcile failed: {}", e),
    }

    if let Some(side) = seed {
        if let Err(e) = strategy.force_seed(side, Utc::now()) {
            error!("Seed order failed: {}", e);
        }
    }

    let poll = Duration::from_secs(config.poll_interval_seconds.max(1));
    let balance_every = Duration::from_secs(config.balance_log_interval_seconds);
    let mut last_balance_log: Option<Instant> = None;

    info!("Starting trading loop...");
    loop {
        match strategy.exchange().get_price(&symbol.name) {
            Ok(price) => match strategy.on_price(price) {
                Ok(()) => {}
                Err(e @ StrategyError::FillNotConfirmed { .. }) => warn!("{}", e),
                Err(e) => error!("Tick failed: {}", e),
            },
            Err(e) => error!("Price fetch failed: {}", e),
        }

        if config.balance_log_interval_seconds > 0
            && last_balance_log.map_or(true, |t| t.elapsed() >= balance_every)
        {
            log_balance(strategy.exchange());
            last_balance_log = Some(Instant::now());
        }

        sleep(poll);
    }
}

/// Reconcile saved state against the exchange once and print the result
pub fn reconcile_once(config: BotConfig) -> Result<()> {
    let client = connect(&config)?;
    let store = StateStore::new(&config.state_file)?;
    let mut strategy = GridBandStrategy::new(client, config.symbol.clone(), store);

    let outcome = strategy
        .reconcile_startup(Utc::now())
        .context("Reconcile failed")?;
    info!("Reconcile outcome: {:?}", outcome);

    let state = serde_json::to_string_pretty(strategy.state())?;
    println!("{}", state);
    Ok(())
}
