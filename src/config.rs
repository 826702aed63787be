//! Configuration management
//!
//! Handles loading and parsing of the JSON configuration file with
//! environment variable support for API credentials.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::grid::is_representable_step;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    pub exchange: ExchangeConfig,
    pub symbol: SymbolConfig,
    #[serde(default = "default_state_file")]
    pub state_file: String,
    /// Start without opening new baskets
    #[serde(default)]
    pub drain_mode: bool,
    #[serde(default = "default_balance_log_interval")]
    pub balance_log_interval_seconds: u64,
    #[serde(default)]
    pub session_limits: SessionLimits,
}

impl BotConfig {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: BotConfig =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        // Load API credentials from environment if not set
        if let Ok(api_key) = std::env::var("BINANCE_API_KEY") {
            config.exchange.api_key = Some(api_key);
        }
        if let Ok(api_secret) = std::env::var("BINANCE_API_SECRET") {
            config.exchange.api_secret = Some(api_secret);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject shapes the grid arithmetic cannot work with
    pub fn validate(&self) -> Result<()> {
        let s = &self.symbol;
        if s.name.trim().is_empty() {
            bail!("symbol.name must not be empty");
        }
        if s.max_levels == 0 {
            bail!("symbol.max_levels must be at least 1");
        }
        if s.grid_spacing_usd <= 0.0 {
            bail!("symbol.grid_spacing_usd must be positive");
        }
        if !is_representable_step(s.min_qty_step) || !is_representable_step(s.price_tick) {
            bail!("symbol.min_qty_step and symbol.price_tick must be positive and at least 1e-28");
        }
        if s.lot_size <= 0.0 {
            bail!("symbol.lot_size must be positive");
        }
        if s.grid.base_qty <= 0.0 || s.grid.repeat_every == 0 {
            bail!("symbol.grid.base_qty must be positive and repeat_every at least 1");
        }
        if s.bands.period == 0 {
            bail!("symbol.bands.period must be at least 1");
        }
        Ok(())
    }

    /// Label used for log files and startup messages
    pub fn env_label(&self) -> &'static str {
        if self.exchange.testnet {
            "testnet"
        } else {
            "live"
        }
    }

    /// Ledger path next to the state file: `<dir>/baskets-<SYMBOL>.csv`
    pub fn ledger_path(&self) -> PathBuf {
        let dir = Path::new(&self.state_file)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        dir.join(format!("baskets-{}.csv", self.symbol.name))
    }
}

/// Exchange configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub base_url: String,
    #[serde(default = "default_recv_window")]
    pub recv_window: u64,
    #[serde(default)]
    pub testnet: bool,
    /// Per-request timeout
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
}

/// Margin mode requested from the venue at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarginMode {
    #[serde(alias = "cross", alias = "CROSSED")]
    Cross,
    #[serde(alias = "isolated")]
    Isolated,
}

impl MarginMode {
    /// Venue spelling for `marginType`
    pub fn as_venue_str(&self) -> &'static str {
        match self {
            MarginMode::Cross => "CROSSED",
            MarginMode::Isolated => "ISOLATED",
        }
    }
}

/// Instrument and grid shape; immutable for the process lifetime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolConfig {
    pub name: String,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    #[serde(default = "default_leverage")]
    pub leverage: u32,
    #[serde(default = "default_margin_mode")]
    pub margin_mode: MarginMode,
    #[serde(default = "default_max_levels")]
    pub max_levels: u32,
    /// Price distance between consecutive entries, quote currency
    pub grid_spacing_usd: f64,
    /// Take-profit target per lot, quote currency
    pub target_profit_per_lot_usd: f64,
    #[serde(default = "default_lot_size")]
    pub lot_size: f64,
    #[serde(default = "default_min_qty_step")]
    pub min_qty_step: f64,
    #[serde(default = "default_min_notional")]
    pub min_notional_usd: f64,
    #[serde(default = "default_price_tick")]
    pub price_tick: f64,
    pub grid: GridShapeConfig,
    #[serde(default)]
    pub bands: BandConfig,
    #[serde(default)]
    pub cooldown_minutes: u64,
}

impl SymbolConfig {
    /// Quantity for a 1-indexed level under this symbol's grid shape
    pub fn level_qty(&self, level: u32) -> f64 {
        crate::grid::level_qty(
            level,
            self.grid.base_qty,
            self.grid.repeat_every,
            self.grid.multiplier,
            self.min_qty_step,
        )
    }

    /// Position size once levels `1..=level` have filled
    pub fn cumulative_qty(&self, level: u32) -> f64 {
        crate::grid::cumulative_qty(
            level,
            self.grid.base_qty,
            self.grid.repeat_every,
            self.grid.multiplier,
            self.min_qty_step,
        )
    }
}

/// Laddered quantity schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridShapeConfig {
    pub base_qty: f64,
    #[serde(default = "default_repeat_every")]
    pub repeat_every: u32,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

/// Bollinger band parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandConfig {
    #[serde(default = "default_band_period")]
    pub period: usize,
    #[serde(default = "default_band_stddev")]
    pub stddev: f64,
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            period: default_band_period(),
            stddev: default_band_stddev(),
        }
    }
}

/// Per-session limits; 0 disables a limit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionLimits {
    #[serde(default)]
    pub max_grids: u32,
    #[serde(default)]
    pub max_gain_usd: f64,
}

fn default_poll_interval() -> u64 {
    10
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_state_file() -> String {
    "state/state.json".to_string()
}

fn default_balance_log_interval() -> u64 {
    60
}

fn default_recv_window() -> u64 {
    5000
}

fn default_timeout() -> u64 {
    10
}

fn default_timeframe() -> String {
    "1m".to_string()
}

fn default_leverage() -> u32 {
    25
}

fn default_margin_mode() -> MarginMode {
    MarginMode::Cross
}

fn default_max_levels() -> u32 {
    10
}

fn default_lot_size() -> f64 {
    1.0
}

fn default_min_qty_step() -> f64 {
    0.001
}

fn default_min_notional() -> f64 {
    20.0
}

fn default_price_tick() -> f64 {
    0.01
}

fn default_repeat_every() -> u32 {
    2
}

fn default_multiplier() -> f64 {
    1.5
}

fn default_band_period() -> usize {
    100
}

fn default_band_stddev() -> f64 {
    2.0
}
