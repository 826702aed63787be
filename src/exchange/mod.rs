//! Exchange access for a single USDT-M futures symbol
//!
//! [`Exchange`] is the seam between the strategy and the venue. The live
//! implementation is [`BinanceFuturesClient`]; tests substitute an in-memory
//! double.

pub mod auth;
pub mod client;
pub mod error;
pub mod types;

pub use auth::{sign_query, Credentials};
pub use client::BinanceFuturesClient;
pub use error::{ExchangeError, ExchangeResult};
pub use types::{AccountSnapshot, OpenOrder, OrderAck, PositionSnapshot, UserTrade};

use crate::config::MarginMode;
use crate::types::Side;

/// Blocking operations the strategy needs from the venue
///
/// Every call is independent and may fail; callers decide whether a failure
/// aborts the tick or is logged and skipped.
pub trait Exchange {
    /// Last traded price
    fn get_price(&self, symbol: &str) -> ExchangeResult<f64>;

    /// Close prices of the most recent `limit` candles, oldest first
    fn get_klines(&self, symbol: &str, interval: &str, limit: usize) -> ExchangeResult<Vec<f64>>;

    /// Net position; a flat symbol reports `qty == 0`
    fn get_position(&self, symbol: &str) -> ExchangeResult<PositionSnapshot>;

    fn get_open_orders(&self, symbol: &str) -> ExchangeResult<Vec<OpenOrder>>;

    fn place_market_order(&self, symbol: &str, side: Side, qty: f64) -> ExchangeResult<OrderAck>;

    /// Reduce-only GTC limit order closing `qty` at `price`
    fn place_limit_tp(
        &self,
        symbol: &str,
        side: Side,
        qty: f64,
        price: f64,
    ) -> ExchangeResult<OrderAck>;

    fn cancel_all_open_orders(&self, symbol: &str) -> ExchangeResult<()>;

    fn get_account(&self) -> ExchangeResult<AccountSnapshot>;

    /// Recent executions, oldest first, optionally starting at `from_order_id`
    fn get_user_trades(
        &self,
        symbol: &str,
        from_order_id: Option<u64>,
        limit: usize,
    ) -> ExchangeResult<Vec<UserTrade>>;

    fn get_order(&self, symbol: &str, order_id: u64) -> ExchangeResult<OrderAck>;

    fn set_leverage(&self, symbol: &str, leverage: u32) -> ExchangeResult<()>;

    fn set_margin_mode(&self, symbol: &str, mode: MarginMode) -> ExchangeResult<()>;
}
