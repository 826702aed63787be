//! Grid-band strategy core
//!
//! Drives one basket at a time through FLAT, ACTIVE and COOLDOWN. A price
//! outside the Bollinger bands opens a basket against the move; every
//! further adverse step of `grid_spacing_usd` from the latest fill adds a
//! level, up to `max_levels`. A single reduce-only take-profit covers the
//! whole position and is reissued whenever it stops matching. The basket
//! closes when the exchange reports a flat position.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::SymbolConfig;
use crate::exchange::{Exchange, ExchangeError, PositionSnapshot};
use crate::grid::{round_up, tp_price};
use crate::indicators::BollingerBands;
use crate::ledger::BasketLedger;
use crate::reconcile::{ReconcileOutcome, Reconciler, POSITION_EPSILON};
use crate::risk::BasketCloseHook;
use crate::state_manager::{basket_id_for, GridState, StateStore};
use crate::types::{BasketSummary, Direction, Fill, Side};

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error("{side} {qty} (order {order_id}) was not confirmed as filled")]
    FillNotConfirmed { side: Side, qty: f64, order_id: u64 },

    #[error("failed to persist state: {0:#}")]
    Persist(#[from] anyhow::Error),
}

pub type StrategyResult<T> = Result<T, StrategyError>;

pub struct GridBandStrategy<E: Exchange> {
    exchange: E,
    cfg: SymbolConfig,
    bands: BollingerBands,
    state: GridState,
    store: StateStore,
    ledger: Option<BasketLedger>,
    close_hook: Option<Box<dyn BasketCloseHook>>,
    drain_mode: bool,
    /// Highest basket id handed out by this process
    last_basket_id: u64,
}

impl<E: Exchange> GridBandStrategy<E> {
    /// Build the strategy around the state last saved in `store`
    pub fn new(exchange: E, cfg: SymbolConfig, store: StateStore) -> Self {
        let state = store.load();
        let bands = BollingerBands::new(cfg.bands.period, cfg.bands.stddev);
        Self {
            exchange,
            cfg,
            bands,
            last_basket_id: state.basket_id,
            state,
            store,
            ledger: None,
            close_hook: None,
            drain_mode: false,
        }
    }

    pub fn with_ledger(mut self, ledger: BasketLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_close_hook(mut self, hook: Box<dyn BasketCloseHook>) -> Self {
        self.close_hook = Some(hook);
        self
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    pub fn state(&self) -> &GridState {
        &self.state
    }

    pub fn config(&self) -> &SymbolConfig {
        &self.cfg
    }

    pub fn bands(&self) -> &BollingerBands {
        &self.bands
    }

    pub fn drain_mode(&self) -> bool {
        self.drain_mode
    }

    pub fn set_drain_mode(&mut self, enabled: bool) {
        if enabled != self.drain_mode {
            info!("Drain mode {}", if enabled { "enabled" } else { "disabled" });
        }
        self.drain_mode = enabled;
    }

    /// Warm the indicator from historical closes
    pub fn seed_indicator(&mut self, closes: &[f64]) {
        self.bands.seed(closes);
        info!(
            "Seeded bands with {}/{} closes",
            self.bands.len(),
            self.bands.period()
        );
    }

    /// Align saved state with the exchange before the first tick
    ///
    /// A basket that closed while the process was down is cleared without a
    /// summary.
    pub fn reconcile_startup(&mut self, now: DateTime<Utc>) -> StrategyResult<ReconcileOutcome> {
        let price = self.exchange.get_price(&self.cfg.name)?;
        let position = self.exchange.get_position(&self.cfg.name)?;
        self.reconcile_with(price, &position, now)
    }

    fn reconcile_with(
        &mut self,
        price: f64,
        position: &PositionSnapshot,
        now: DateTime<Utc>,
    ) -> StrategyResult<ReconcileOutcome> {
        let outcome = Reconciler::new(&self.exchange, &self.cfg).reconcile(
            &mut self.state,
            price,
            position,
            now,
        );
        if outcome.changed() {
            self.last_basket_id = self.last_basket_id.max(self.state.basket_id);
            self.save()?;
        }
        Ok(outcome)
    }

    pub fn on_price(&mut self, price: f64) -> StrategyResult<()> {
        self.on_price_at(price, Utc::now())
    }

    /// Process one price tick to completion
    pub fn on_price_at(&mut self, price: f64, now: DateTime<Utc>) -> StrategyResult<()> {
        self.bands.add(price);

        let mut position = self.exchange.get_position(&self.cfg.name)?;

        if self.state.is_active() {
            if let Some(ratio) = position.drawdown_ratio() {
                if self.state.track_exposure(position.abs_qty(), ratio.min(0.0)) {
                    self.save()?;
                }
            }
        }

        if position.abs_qty() < POSITION_EPSILON {
            if self.state.is_active() {
                self.close_basket(now)?;
            }
            position = PositionSnapshot::default();
        } else if !self.state.is_active() {
            self.reconcile_with(price, &position, now)?;
        }

        if position.abs_qty() >= POSITION_EPSILON {
            if let Err(e) = self.sync_take_profit(&position) {
                warn!("Take-profit sync failed: {}", e);
            }
        }

        let Some(bands) = self.bands.bands() else {
            debug!(
                "Bands warming up ({}/{})",
                self.bands.len(),
                self.bands.period()
            );
            return Ok(());
        };

        info!(
            "price={:.2} lower={:.2} mean={:.2} upper={:.2} dir={} levels={} next_entry={}",
            price,
            bands.lower,
            bands.mean,
            bands.upper,
            self.state
                .direction
                .map(|d| d.to_string())
                .unwrap_or_else(|| "none".to_string()),
            self.state.levels_filled,
            self.state
                .next_entry_price
                .map(|p| format!("{:.2}", p))
                .unwrap_or_else(|| "-".to_string())
        );

        match self.state.direction {
            None => {
                if self.drain_mode {
                    debug!("Drain mode: not opening a new basket");
                    return Ok(());
                }
                if self.state.cooldown_active(now) {
                    debug!("Cooldown until {:?}", self.state.cooldown_until);
                    return Ok(());
                }
                if price > bands.upper {
                    self.open_basket(Direction::Short, price, position.qty, now)?;
                } else if price < bands.lower {
                    self.open_basket(Direction::Long, price, position.qty, now)?;
                }
            }
            Some(direction) => {
                if self.state.levels_filled >= self.cfg.max_levels {
                    return Ok(());
                }
                let Some(next) = self.state.next_entry_price else {
                    return Ok(());
                };
                if direction.is_adverse_cross(price, next) {
                    self.extend_basket(direction, price, position.qty, now)?;
                }
            }
        }
        Ok(())
    }

    /// Open a basket at market regardless of bands, cooldown or drain mode
    ///
    /// Returns false when a position or basket is already open.
    pub fn force_seed(&mut self, side: Side, now: DateTime<Utc>) -> StrategyResult<bool> {
        let position = self.exchange.get_position(&self.cfg.name)?;
        if self.state.is_active() || position.abs_qty() >= POSITION_EPSILON {
            warn!("Seed {} ignored: a basket is already open", side);
            return Ok(false);
        }
        let price = self.exchange.get_price(&self.cfg.name)?;
        let direction = match side {
            Side::Buy => Direction::Long,
            Side::Sell => Direction::Short,
        };
        info!("Seeding {} basket at {:.2}", direction, price);
        self.open_basket(direction, price, position.qty, now)?;
        Ok(true)
    }

    // -------------------------------------------------------------------------
    // Entries
    // -------------------------------------------------------------------------

    fn open_basket(
        &mut self,
        direction: Direction,
        price: f64,
        position_qty: f64,
        now: DateTime<Utc>,
    ) -> StrategyResult<()> {
        let qty = self.entry_qty(1, price);
        let wallet = self.wallet_balance();
        let fill = self.place_and_confirm(direction.entry_side(), qty, price, position_qty, now)?;

        let basket_id = basket_id_for(fill.time).max(self.last_basket_id);
        self.last_basket_id = basket_id;

        let state = &mut self.state;
        state.reset();
        state.direction = Some(direction);
        state.levels_filled = 1;
        state.last_entry_price = Some(fill.price);
        state.next_entry_price =
            Some(direction.step_adverse(fill.price, self.cfg.grid_spacing_usd));
        state.basket_id = basket_id;
        state.basket_start_balance = wallet;
        state.basket_open_ts = Some(fill.time);
        state.max_volume = fill.qty;
        state.push_entry_order(fill.order_id);

        info!(
            "Basket #{} opened {} lvl1 qty={} at {:.2} next_entry={:.2}",
            basket_id,
            direction,
            fill.qty,
            fill.price,
            self.state.next_entry_price.unwrap_or_default()
        );
        self.save()?;
        self.refresh_take_profit();
        Ok(())
    }

    fn extend_basket(
        &mut self,
        direction: Direction,
        price: f64,
        position_qty: f64,
        now: DateTime<Utc>,
    ) -> StrategyResult<()> {
        let level = self.state.levels_filled + 1;
        let qty = self.entry_qty(level, price);
        let fill = self.place_and_confirm(direction.entry_side(), qty, price, position_qty, now)?;

        let state = &mut self.state;
        state.levels_filled = level;
        state.last_entry_price = Some(fill.price);
        state.next_entry_price =
            Some(direction.step_adverse(fill.price, self.cfg.grid_spacing_usd));
        state.max_volume = state.max_volume.max(position_qty.abs() + fill.qty);
        state.push_entry_order(fill.order_id);

        info!(
            "Basket #{} extended {} lvl{} qty={} at {:.2} next_entry={:.2}",
            self.state.basket_id,
            direction,
            level,
            fill.qty,
            fill.price,
            self.state.next_entry_price.unwrap_or_default()
        );
        self.save()?;
        self.refresh_take_profit();
        Ok(())
    }

    /// Level quantity, raised to the venue's minimum notional
    fn entry_qty(&self, level: u32, price: f64) -> f64 {
        let qty = self.cfg.level_qty(level);
        if price <= 0.0 {
            return qty;
        }
        let min_qty = round_up(self.cfg.min_notional_usd / price, self.cfg.min_qty_step);
        if qty < min_qty {
            info!(
                "Adjusted qty to meet min notional: {} -> {}",
                qty, min_qty
            );
            return min_qty;
        }
        qty
    }

    fn wallet_balance(&self) -> Option<f64> {
        match self.exchange.get_account() {
            Ok(account) => Some(account.wallet_balance),
            Err(e) => {
                warn!("Wallet balance unavailable: {}", e);
                None
            }
        }
    }

    /// Place a market order and make sure it actually executed
    ///
    /// A zero `executedQty` is checked once against the order itself and
    /// then against the position; only a confirmed fill is returned.
    fn place_and_confirm(
        &self,
        side: Side,
        qty: f64,
        price: f64,
        position_before: f64,
        now: DateTime<Utc>,
    ) -> StrategyResult<Fill> {
        let ack = self.exchange.place_market_order(&self.cfg.name, side, qty)?;
        let mut executed = ack.executed_qty;
        let mut avg_price = ack.avg_price;
        let mut time = ack.update_time;

        if executed <= 0.0 {
            match self.exchange.get_order(&self.cfg.name, ack.order_id) {
                Ok(order) => {
                    executed = order.executed_qty;
                    avg_price = order.avg_price;
                    time = order.update_time.or(time);
                }
                Err(e) => warn!("Order {} status unavailable: {}", ack.order_id, e),
            }
        }

        if executed <= 0.0 {
            match self.exchange.get_position(&self.cfg.name) {
                Ok(position) => {
                    let moved = match side {
                        Side::Buy => position.qty - position_before,
                        Side::Sell => position_before - position.qty,
                    };
                    if moved >= self.cfg.min_qty_step / 2.0 {
                        info!(
                            "Order {} confirmed from position change of {:.6}",
                            ack.order_id, moved
                        );
                        executed = moved;
                    }
                }
                Err(e) => warn!("Position unavailable for fill check: {}", e),
            }
        }

        if executed <= 0.0 {
            return Err(StrategyError::FillNotConfirmed {
                side,
                qty,
                order_id: ack.order_id,
            });
        }

        Ok(Fill {
            order_id: ack.order_id,
            qty: executed,
            price: if avg_price > 0.0 { avg_price } else { price },
            time: time.unwrap_or(now),
        })
    }

    // -------------------------------------------------------------------------
    // Take profit
    // -------------------------------------------------------------------------

    fn refresh_take_profit(&mut self) {
        if let Err(e) = self.try_refresh_take_profit() {
            warn!("Take-profit refresh after entry failed: {}", e);
        }
    }

    fn try_refresh_take_profit(&mut self) -> StrategyResult<bool> {
        let position = self.exchange.get_position(&self.cfg.name)?;
        let drawdown = position.drawdown_ratio().unwrap_or_default().min(0.0);
        if self.state.track_exposure(position.abs_qty(), drawdown) {
            self.save()?;
        }
        self.sync_take_profit(&position)
    }

    /// Keep exactly one reduce-only order matching the position
    ///
    /// Returns true when the order was reissued.
    fn sync_take_profit(&mut self, position: &PositionSnapshot) -> StrategyResult<bool> {
        let Some(direction) = self.state.direction else {
            return Ok(false);
        };
        let abs_qty = position.abs_qty();
        if abs_qty < POSITION_EPSILON {
            return Ok(false);
        }
        let entry = if position.entry_price > 0.0 {
            position.entry_price
        } else {
            self.state.last_entry_price.unwrap_or_default()
        };
        if entry <= 0.0 {
            return Ok(false);
        }
        let Some(target) = tp_price(
            entry,
            abs_qty,
            direction,
            self.cfg.lot_size,
            self.cfg.target_profit_per_lot_usd,
            self.cfg.price_tick,
        ) else {
            return Ok(false);
        };

        let orders = self.exchange.get_open_orders(&self.cfg.name)?;
        let reduce_only: Vec<_> = orders.iter().filter(|o| o.reduce_only).collect();
        if let [tp] = reduce_only.as_slice() {
            let qty_ok = (tp.qty - abs_qty).abs() <= self.cfg.min_qty_step / 2.0 + 1e-12;
            let price_ok = (tp.price - target).abs() <= self.cfg.price_tick + 1e-9;
            if qty_ok && price_ok {
                return Ok(false);
            }
        }

        self.exchange.cancel_all_open_orders(&self.cfg.name)?;
        let side = direction.exit_side();
        let ack = self
            .exchange
            .place_limit_tp(&self.cfg.name, side, abs_qty, target)?;
        self.state.push_tp_order(ack.order_id);
        info!(
            "Basket #{} TP placed {} qty={:.6} tp={:.2} (order {})",
            self.state.basket_id, side, abs_qty, target, ack.order_id
        );
        self.save()?;
        Ok(true)
    }

    // -------------------------------------------------------------------------
    // Close
    // -------------------------------------------------------------------------

    fn close_basket(&mut self, now: DateTime<Utc>) -> StrategyResult<Option<BasketSummary>> {
        let Some(direction) = self.state.direction else {
            return Ok(None);
        };
        let wallet = self.wallet_balance();
        let pnl = match (wallet, self.state.basket_start_balance) {
            (Some(end), Some(start)) => Some(end - start),
            _ => None,
        };
        let summary = BasketSummary {
            basket_id: self.state.basket_id,
            levels: self.state.levels_filled,
            max_volume: self.state.max_volume,
            worst_drawdown: self.state.worst_drawdown,
            pnl,
            direction,
            open_at: self.state.basket_open_ts,
            closed_at: now,
        };

        info!(
            "Basket #{} closed {} levels={} max_volume={} worst_drawdown={:.4}% pnl={}",
            summary.basket_id,
            summary.direction,
            summary.levels,
            summary.max_volume,
            summary.worst_drawdown * 100.0,
            summary
                .pnl
                .map(|p| format!("{:.2}", p))
                .unwrap_or_else(|| "unknown".to_string())
        );

        let verdict = self
            .close_hook
            .as_mut()
            .map(|hook| hook.on_basket_close(&summary));
        match verdict {
            Some(Ok(true)) => self.set_drain_mode(true),
            Some(Ok(false)) | None => {}
            Some(Err(e)) => error!("Basket close hook failed: {:#}", e),
        }
        if let Some(ledger) = &self.ledger {
            if let Err(e) = ledger.append(&self.cfg.name, &summary) {
                error!("Failed to record basket #{}: {:#}", summary.basket_id, e);
            }
        }

        self.state.reset();
        if self.cfg.cooldown_minutes > 0 {
            let until = now + Duration::minutes(self.cfg.cooldown_minutes as i64);
            info!("Cooldown until {}", until.to_rfc3339());
            self.state.cooldown_until = Some(until);
        }
        self.save()?;
        Ok(Some(summary))
    }

    fn save(&self) -> StrategyResult<()> {
        self.store.save(&self.state)?;
        Ok(())
    }
}
