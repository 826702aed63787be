//! Session risk controls
//!
//! Tracks how many baskets closed during this process lifetime and the
//! realized gain they produced. When a configured limit is reached the
//! strategy is told to stop opening new baskets (drain mode); baskets that
//! are already open keep being managed to completion.

use anyhow::Result;
use tracing::info;

use crate::config::SessionLimits;
use crate::types::BasketSummary;

/// Hook invoked once per closed basket
///
/// Returning `Ok(true)` asks the strategy to engage drain mode. Errors are
/// logged by the caller and never stop the basket reset.
pub trait BasketCloseHook {
    fn on_basket_close(&mut self, summary: &BasketSummary) -> Result<bool>;
}

/// Counts closed baskets and cumulative gain against session limits
#[derive(Debug, Clone, Default)]
pub struct SessionTracker {
    /// 0 disables the basket-count limit
    pub max_baskets: u32,
    /// 0 disables the gain limit
    pub max_gain: f64,
    pub baskets_closed: u32,
    pub cumulative_gain: f64,
}

impl SessionTracker {
    pub fn new(limits: &SessionLimits) -> Self {
        Self {
            max_baskets: limits.max_grids,
            max_gain: limits.max_gain_usd,
            ..Default::default()
        }
    }

    /// Fold a closed basket into the session totals
    ///
    /// Returns true when drain mode should engage.
    pub fn record_close(&mut self, summary: &BasketSummary) -> bool {
        self.baskets_closed += 1;
        if let Some(pnl) = summary.pnl {
            self.cumulative_gain += pnl;
        }

        if self.max_baskets > 0 && self.baskets_closed >= self.max_baskets {
            info!(
                "Session max_grids={} reached; enabling drain mode.",
                self.max_baskets
            );
            return true;
        }
        if self.max_gain > 0.0 && self.cumulative_gain >= self.max_gain {
            info!(
                "Session max_gain_usd={:.2} reached ({:.2}); enabling drain mode.",
                self.max_gain, self.cumulative_gain
            );
            return true;
        }
        false
    }
}

impl BasketCloseHook for SessionTracker {
    fn on_basket_close(&mut self, summary: &BasketSummary) -> Result<bool> {
        Ok(self.record_close(summary))
    }
}
