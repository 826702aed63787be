//! Core data types used across the trading system

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of an open basket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Direction implied by a signed position quantity
    pub fn from_position(qty: f64) -> Self {
        if qty > 0.0 {
            Direction::Long
        } else {
            Direction::Short
        }
    }

    /// Order side that adds to a position in this direction
    pub fn entry_side(&self) -> Side {
        match self {
            Direction::Long => Side::Buy,
            Direction::Short => Side::Sell,
        }
    }

    /// Order side that reduces a position in this direction
    pub fn exit_side(&self) -> Side {
        self.entry_side().opposite()
    }

    /// Next entry price one spacing further into the adverse move
    pub fn step_adverse(&self, price: f64, spacing: f64) -> f64 {
        match self {
            Direction::Long => price - spacing,
            Direction::Short => price + spacing,
        }
    }

    /// Whether `price` has moved through `trigger` against the basket
    pub fn is_adverse_cross(&self, price: f64, trigger: f64) -> bool {
        match self {
            Direction::Long => price <= trigger,
            Direction::Short => price >= trigger,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

/// Order side as understood by the venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    /// Parse a venue side string, case-insensitive
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("buy") {
            Some(Side::Buy)
        } else if s.eq_ignore_ascii_case("sell") {
            Some(Side::Sell)
        } else {
            None
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A confirmed execution of a market entry order
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub order_id: u64,
    pub qty: f64,
    pub price: f64,
    pub time: DateTime<Utc>,
}

/// Summary of a basket emitted when its position returns to zero
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasketSummary {
    pub basket_id: u64,
    pub levels: u32,
    pub max_volume: f64,
    /// Most negative unrealized pnl / notional seen while open
    pub worst_drawdown: f64,
    /// Wallet delta since the basket opened, when both balances are known
    pub pnl: Option<f64>,
    pub direction: Direction,
    pub open_at: Option<DateTime<Utc>>,
    pub closed_at: DateTime<Utc>,
}
