//! Grid Band Bot
//!
//! Bollinger-band grid trading for a single USDT-M futures symbol. One
//! basket is open at a time; its state is persisted after every change and
//! rebuilt from the exchange when local state is missing or stale.

pub mod config;
pub mod exchange;
pub mod grid;
pub mod indicators;
pub mod ledger;
pub mod reconcile;
pub mod risk;
pub mod state_manager;
pub mod strategy;
pub mod types;

pub use config::{BotConfig, SymbolConfig};
pub use exchange::{BinanceFuturesClient, Exchange, ExchangeError};
pub use ledger::BasketLedger;
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use risk::{BasketCloseHook, SessionTracker};
pub use state_manager::{GridState, StateStore};
pub use strategy::{GridBandStrategy, StrategyError};
pub use types::*;
