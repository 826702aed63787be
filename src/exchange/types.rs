//! Binance USDT-M futures API types
//!
//! The venue sends most numbers as JSON strings. Each response is parsed into
//! a `Raw*` wire struct first, then converted into the strongly typed snapshot
//! the strategy works with. Missing or malformed numeric fields become zero.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::types::Side;

fn num(s: &str) -> f64 {
    s.trim().parse().unwrap_or_default()
}

fn millis(ms: i64) -> Option<DateTime<Utc>> {
    if ms <= 0 {
        return None;
    }
    DateTime::from_timestamp_millis(ms)
}

// =============================================================================
// Snapshots
// =============================================================================

/// Net position for the traded symbol
///
/// `qty` is signed: positive is long, negative is short.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PositionSnapshot {
    pub qty: f64,
    pub entry_price: f64,
    pub mark_price: f64,
    pub unrealized_pnl: f64,
}

impl PositionSnapshot {
    pub fn abs_qty(&self) -> f64 {
        self.qty.abs()
    }

    /// Unrealized pnl over notional at mark; `None` when flat or unpriced
    pub fn drawdown_ratio(&self) -> Option<f64> {
        let notional = self.qty.abs() * self.mark_price;
        if notional > 0.0 {
            Some(self.unrealized_pnl / notional)
        } else {
            None
        }
    }
}

/// A resting order on the symbol
#[derive(Debug, Clone, PartialEq)]
pub struct OpenOrder {
    pub order_id: u64,
    pub side: Side,
    pub price: f64,
    pub qty: f64,
    pub reduce_only: bool,
    pub order_type: String,
}

/// Result of placing or querying a single order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderAck {
    pub order_id: u64,
    pub status: String,
    pub executed_qty: f64,
    pub avg_price: f64,
    pub update_time: Option<DateTime<Utc>>,
}

/// Account balances in the margin asset
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AccountSnapshot {
    pub wallet_balance: f64,
    pub margin_balance: f64,
    pub available_balance: f64,
    pub maint_margin: f64,
}

/// One execution from the account's trade history
#[derive(Debug, Clone, PartialEq)]
pub struct UserTrade {
    pub order_id: u64,
    pub side: Side,
    pub price: f64,
    pub qty: f64,
    pub quote_qty: f64,
    pub fee: f64,
    pub time: DateTime<Utc>,
}

// =============================================================================
// Wire formats
// =============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct RawTickerPrice {
    #[serde(default)]
    pub price: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct RawPosition {
    pub symbol: String,
    pub position_amt: String,
    pub entry_price: String,
    pub mark_price: String,
    #[serde(rename = "unRealizedProfit")]
    pub unrealized_profit: String,
}

impl From<&RawPosition> for PositionSnapshot {
    fn from(raw: &RawPosition) -> Self {
        Self {
            qty: num(&raw.position_amt),
            entry_price: num(&raw.entry_price),
            mark_price: num(&raw.mark_price),
            unrealized_pnl: num(&raw.unrealized_profit),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct RawOrder {
    pub order_id: u64,
    pub status: String,
    pub side: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub price: String,
    pub orig_qty: String,
    pub executed_qty: String,
    pub avg_price: String,
    pub reduce_only: bool,
    pub update_time: i64,
}

impl RawOrder {
    /// `None` when the venue reports a side this bot never places
    pub fn into_open_order(self) -> Option<OpenOrder> {
        Some(OpenOrder {
            order_id: self.order_id,
            side: Side::parse(&self.side)?,
            price: num(&self.price),
            qty: num(&self.orig_qty),
            reduce_only: self.reduce_only,
            order_type: self.order_type,
        })
    }
}

impl From<RawOrder> for OrderAck {
    fn from(raw: RawOrder) -> Self {
        Self {
            order_id: raw.order_id,
            executed_qty: num(&raw.executed_qty),
            avg_price: num(&raw.avg_price),
            update_time: millis(raw.update_time),
            status: raw.status,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct RawAccount {
    pub total_wallet_balance: String,
    pub total_margin_balance: String,
    pub available_balance: String,
    pub total_maint_margin: String,
}

impl From<RawAccount> for AccountSnapshot {
    fn from(raw: RawAccount) -> Self {
        Self {
            wallet_balance: num(&raw.total_wallet_balance),
            margin_balance: num(&raw.total_margin_balance),
            available_balance: num(&raw.available_balance),
            maint_margin: num(&raw.total_maint_margin),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct RawUserTrade {
    pub order_id: u64,
    pub side: String,
    pub price: String,
    pub qty: String,
    pub quote_qty: String,
    pub commission: String,
    pub buyer: bool,
    pub time: i64,
}

impl RawUserTrade {
    pub fn into_trade(self) -> Option<UserTrade> {
        let side = Side::parse(&self.side).unwrap_or(if self.buyer {
            Side::Buy
        } else {
            Side::Sell
        });
        Some(UserTrade {
            order_id: self.order_id,
            side,
            price: num(&self.price),
            qty: num(&self.qty),
            quote_qty: num(&self.quote_qty),
            fee: num(&self.commission),
            time: millis(self.time)?,
        })
    }
}

/// Close price (index 4) of a raw kline array
pub(crate) fn kline_close(raw: &[serde_json::Value]) -> Option<f64> {
    raw.get(4)?.as_str()?.parse().ok()
}
