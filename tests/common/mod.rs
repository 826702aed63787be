//! Shared test fixtures: an in-memory exchange and a small grid config

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::cell::RefCell;

use grid_band_bot::config::{BandConfig, GridShapeConfig, MarginMode, SymbolConfig};
use grid_band_bot::exchange::{
    AccountSnapshot, Exchange, ExchangeError, ExchangeResult, OpenOrder, OrderAck,
    PositionSnapshot, UserTrade,
};
use grid_band_bot::Side;

/// How market orders behave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillMode {
    /// Fill in full at the current price
    Normal,
    /// Accepted but never executed
    Rejected,
    /// Executed, but every order query reports zero executed quantity
    Unreported,
}

#[derive(Debug)]
pub struct MockState {
    pub price: f64,
    pub position_qty: f64,
    pub entry_price: f64,
    pub wallet: f64,
    pub open_orders: Vec<OpenOrder>,
    pub trades: Vec<UserTrade>,
    pub acks: Vec<OrderAck>,
    pub market_orders: Vec<(Side, f64)>,
    pub tp_orders: Vec<(Side, f64, f64)>,
    pub cancel_calls: usize,
    pub next_order_id: u64,
    pub fill_time: DateTime<Utc>,
    pub fill_mode: FillMode,
    pub fail_position: bool,
    pub fail_account: bool,
    pub fail_open_orders: bool,
    pub fail_trades: bool,
}

pub struct MockExchange {
    pub inner: RefCell<MockState>,
}

fn api_error(endpoint: &str) -> ExchangeError {
    ExchangeError::Api {
        endpoint: endpoint.to_string(),
        status: 503,
        body: "{\"code\":-1001,\"msg\":\"Internal error\"}".to_string(),
    }
}

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_741_944_000 + secs, 0).unwrap()
}

impl MockExchange {
    pub fn new(price: f64) -> Self {
        Self {
            inner: RefCell::new(MockState {
                price,
                position_qty: 0.0,
                entry_price: 0.0,
                wallet: 1000.0,
                open_orders: Vec::new(),
                trades: Vec::new(),
                acks: Vec::new(),
                market_orders: Vec::new(),
                tp_orders: Vec::new(),
                cancel_calls: 0,
                next_order_id: 1000,
                fill_time: ts(0),
                fill_mode: FillMode::Normal,
                fail_position: false,
                fail_account: false,
                fail_open_orders: false,
                fail_trades: false,
            }),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.inner.borrow_mut())
    }

    pub fn set_price(&self, price: f64) {
        self.with(|s| s.price = price);
    }

    /// Take-profit filled: position flat, resting orders gone
    pub fn close_position(&self) {
        self.with(|s| {
            let qty = s.position_qty;
            if qty != 0.0 {
                let side = if qty > 0.0 { Side::Sell } else { Side::Buy };
                let order_id = s.next_order_id;
                s.next_order_id += 1;
                let trade = trade_at(order_id, side, qty.abs(), s.price, s.fill_time);
                s.trades.push(trade);
            }
            s.position_qty = 0.0;
            s.entry_price = 0.0;
            s.open_orders.clear();
        });
    }

    pub fn reduce_only_orders(&self) -> Vec<OpenOrder> {
        self.with(|s| {
            s.open_orders
                .iter()
                .filter(|o| o.reduce_only)
                .cloned()
                .collect()
        })
    }
}

pub fn trade_at(order_id: u64, side: Side, qty: f64, price: f64, time: DateTime<Utc>) -> UserTrade {
    UserTrade {
        order_id,
        side,
        price,
        qty,
        quote_qty: price * qty,
        fee: 0.0,
        time,
    }
}

impl MockState {
    fn apply_fill(&mut self, side: Side, qty: f64) {
        let signed = match side {
            Side::Buy => qty,
            Side::Sell => -qty,
        };
        let before = self.position_qty;
        let after = before + signed;
        if after.abs() < 1e-12 {
            self.entry_price = 0.0;
        } else if before == 0.0 || before.signum() == signed.signum() {
            self.entry_price = (before.abs() * self.entry_price + qty * self.price) / after.abs();
        } else if before.signum() != after.signum() {
            self.entry_price = self.price;
        }
        self.position_qty = after;
    }
}

impl Exchange for MockExchange {
    fn get_price(&self, _symbol: &str) -> ExchangeResult<f64> {
        Ok(self.inner.borrow().price)
    }

    fn get_klines(&self, _symbol: &str, _interval: &str, limit: usize) -> ExchangeResult<Vec<f64>> {
        let price = self.inner.borrow().price;
        Ok(vec![price; limit])
    }

    fn get_position(&self, _symbol: &str) -> ExchangeResult<PositionSnapshot> {
        let s = self.inner.borrow();
        if s.fail_position {
            return Err(api_error("/fapi/v2/positionRisk"));
        }
        Ok(PositionSnapshot {
            qty: s.position_qty,
            entry_price: s.entry_price,
            mark_price: s.price,
            unrealized_pnl: s.position_qty * (s.price - s.entry_price),
        })
    }

    fn get_open_orders(&self, _symbol: &str) -> ExchangeResult<Vec<OpenOrder>> {
        let s = self.inner.borrow();
        if s.fail_open_orders {
            return Err(api_error("/fapi/v1/openOrders"));
        }
        Ok(s.open_orders.clone())
    }

    fn place_market_order(&self, _symbol: &str, side: Side, qty: f64) -> ExchangeResult<OrderAck> {
        let mut s = self.inner.borrow_mut();
        let order_id = s.next_order_id;
        s.next_order_id += 1;
        s.market_orders.push((side, qty));

        let mode = s.fill_mode;
        if mode != FillMode::Rejected {
            s.apply_fill(side, qty);
            let trade = trade_at(order_id, side, qty, s.price, s.fill_time);
            s.trades.push(trade);
        }
        let ack = if mode == FillMode::Normal {
            OrderAck {
                order_id,
                status: "FILLED".to_string(),
                executed_qty: qty,
                avg_price: s.price,
                update_time: Some(s.fill_time),
            }
        } else {
            OrderAck {
                order_id,
                status: "NEW".to_string(),
                ..Default::default()
            }
        };
        s.acks.push(ack.clone());
        Ok(ack)
    }

    fn place_limit_tp(
        &self,
        _symbol: &str,
        side: Side,
        qty: f64,
        price: f64,
    ) -> ExchangeResult<OrderAck> {
        let mut s = self.inner.borrow_mut();
        let order_id = s.next_order_id;
        s.next_order_id += 1;
        s.tp_orders.push((side, qty, price));
        s.open_orders.push(OpenOrder {
            order_id,
            side,
            price,
            qty,
            reduce_only: true,
            order_type: "LIMIT".to_string(),
        });
        Ok(OrderAck {
            order_id,
            status: "NEW".to_string(),
            ..Default::default()
        })
    }

    fn cancel_all_open_orders(&self, _symbol: &str) -> ExchangeResult<()> {
        let mut s = self.inner.borrow_mut();
        s.cancel_calls += 1;
        s.open_orders.clear();
        Ok(())
    }

    fn get_account(&self) -> ExchangeResult<AccountSnapshot> {
        let s = self.inner.borrow();
        if s.fail_account {
            return Err(api_error("/fapi/v2/account"));
        }
        Ok(AccountSnapshot {
            wallet_balance: s.wallet,
            margin_balance: s.wallet,
            available_balance: s.wallet,
            maint_margin: 0.0,
        })
    }

    fn get_user_trades(
        &self,
        _symbol: &str,
        from_order_id: Option<u64>,
        limit: usize,
    ) -> ExchangeResult<Vec<UserTrade>> {
        let s = self.inner.borrow();
        if s.fail_trades {
            return Err(api_error("/fapi/v1/userTrades"));
        }
        let trades: Vec<UserTrade> = s
            .trades
            .iter()
            .filter(|t| from_order_id.map_or(true, |id| t.order_id >= id))
            .cloned()
            .collect();
        let skip = trades.len().saturating_sub(limit);
        Ok(trades.into_iter().skip(skip).collect())
    }

    fn get_order(&self, _symbol: &str, order_id: u64) -> ExchangeResult<OrderAck> {
        let s = self.inner.borrow();
        s.acks
            .iter()
            .find(|a| a.order_id == order_id)
            .cloned()
            .ok_or_else(|| api_error("/fapi/v1/order"))
    }

    fn set_leverage(&self, _symbol: &str, _leverage: u32) -> ExchangeResult<()> {
        Ok(())
    }

    fn set_margin_mode(&self, _symbol: &str, _mode: MarginMode) -> ExchangeResult<()> {
        Ok(())
    }
}

/// Grid of 1, 1, 1.5 at 10 apart, bands over 10 samples
pub fn symbol_config() -> SymbolConfig {
    SymbolConfig {
        name: "ETHUSDT".to_string(),
        timeframe: "1m".to_string(),
        leverage: 10,
        margin_mode: MarginMode::Cross,
        max_levels: 3,
        grid_spacing_usd: 10.0,
        target_profit_per_lot_usd: 5.0,
        lot_size: 1.0,
        min_qty_step: 0.1,
        min_notional_usd: 5.0,
        price_tick: 0.01,
        grid: GridShapeConfig {
            base_qty: 1.0,
            repeat_every: 2,
            multiplier: 1.5,
        },
        bands: BandConfig {
            period: 10,
            stddev: 2.0,
        },
        cooldown_minutes: 0,
    }
}
