//! Reconciliation of local grid state against the exchange
//!
//! The exchange is the source of truth for position size. Whenever local
//! state is missing or stale, the [`Reconciler`] rebuilds what it can from
//! the position snapshot, the resting orders and the account's trade
//! history. Every sub-query returns a [`ReconcileError`] that the engine
//! logs and discards, so a partial view never aborts the caller.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::SymbolConfig;
use crate::exchange::{Exchange, ExchangeError, OpenOrder, PositionSnapshot, UserTrade};
use crate::state_manager::{basket_id_for, GridState};
use crate::types::Direction;

/// Positions smaller than this are treated as flat
pub const POSITION_EPSILON: f64 = 1e-8;

/// Share of the position the trade-history slice may fall short by
const HISTORY_TOLERANCE: f64 = 0.01;

/// Trades requested when rebuilding entry order ids
const HISTORY_LIMIT: usize = 1000;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("open orders unavailable: {0}")]
    OpenOrders(#[source] ExchangeError),

    #[error("trade history unavailable: {0}")]
    TradeHistory(#[source] ExchangeError),

    #[error("trade history covers {covered} of position size {needed}")]
    InsufficientHistory { covered: f64, needed: f64 },
}

/// What a reconciliation pass did to the state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Local state already agreed with the exchange
    Unchanged,
    /// Exchange is flat; stale local basket cleared
    Reset,
    /// Local state was empty and has been rebuilt from the position
    Rebuilt,
    /// Only the entry order ids were filled in from trade history
    Backfilled,
}

impl ReconcileOutcome {
    /// Whether the state must be persisted
    pub fn changed(&self) -> bool {
        !matches!(self, ReconcileOutcome::Unchanged)
    }
}

pub struct Reconciler<'a, E: Exchange> {
    exchange: &'a E,
    cfg: &'a SymbolConfig,
}

impl<'a, E: Exchange> Reconciler<'a, E> {
    pub fn new(exchange: &'a E, cfg: &'a SymbolConfig) -> Self {
        Self { exchange, cfg }
    }

    /// Bring `state` in line with `position`
    ///
    /// Running it twice on the same snapshot yields the same state as
    /// running it once.
    pub fn reconcile(
        &self,
        state: &mut GridState,
        price: f64,
        position: &PositionSnapshot,
        now: DateTime<Utc>,
    ) -> ReconcileOutcome {
        if position.abs_qty() < POSITION_EPSILON {
            if state.is_active() {
                info!("No position on exchange; clearing saved grid state.");
                state.reset();
                return ReconcileOutcome::Reset;
            }
            return ReconcileOutcome::Unchanged;
        }

        let mut outcome = ReconcileOutcome::Unchanged;
        if !state.is_active() {
            let open_orders = match self.fetch_open_orders() {
                Ok(orders) => orders,
                Err(e) => {
                    warn!("Reconcile continuing without open orders: {}", e);
                    Vec::new()
                }
            };
            self.rebuild(state, price, position, &open_orders);
            outcome = ReconcileOutcome::Rebuilt;
        }

        if state.entry_order_ids.is_empty() {
            match self.backfill_entries(state, position) {
                Ok(()) => {
                    if outcome == ReconcileOutcome::Unchanged {
                        outcome = ReconcileOutcome::Backfilled;
                    }
                }
                Err(e) => warn!("Entry order ids not recovered: {}", e),
            }
        }

        if state.basket_id == 0 {
            let opened = *state.basket_open_ts.get_or_insert(now);
            state.basket_id = basket_id_for(opened);
            if outcome == ReconcileOutcome::Unchanged {
                outcome = ReconcileOutcome::Backfilled;
            }
        }

        if outcome == ReconcileOutcome::Rebuilt {
            info!(
                "Reconstructed basket #{} from live position qty={:.6} as level {} {} entry={:.2} next_entry={:.2}",
                state.basket_id,
                position.qty,
                state.levels_filled,
                state.direction.map(|d| d.to_string()).unwrap_or_default(),
                state.last_entry_price.unwrap_or_default(),
                state.next_entry_price.unwrap_or_default()
            );
        }
        outcome
    }

    fn fetch_open_orders(&self) -> Result<Vec<OpenOrder>, ReconcileError> {
        self.exchange
            .get_open_orders(&self.cfg.name)
            .map_err(ReconcileError::OpenOrders)
    }

    /// Infer direction, level count and prices from the position alone
    fn rebuild(
        &self,
        state: &mut GridState,
        price: f64,
        position: &PositionSnapshot,
        open_orders: &[OpenOrder],
    ) {
        let direction = Direction::from_position(position.qty);
        let mut levels = self.infer_levels(position.abs_qty());

        let reduce_only = open_orders.iter().filter(|o| o.reduce_only).count() as u32;
        let reduce_only = reduce_only.min(self.cfg.max_levels);
        if reduce_only > levels {
            levels = reduce_only;
        }

        let entry = if position.entry_price > 0.0 {
            position.entry_price
        } else {
            price
        };

        state.direction = Some(direction);
        state.levels_filled = levels;
        state.last_entry_price = Some(entry);
        state.next_entry_price = Some(direction.step_adverse(entry, self.cfg.grid_spacing_usd));
        state.max_volume = state.max_volume.max(position.abs_qty());
    }

    /// Smallest level count whose cumulative size covers `abs_qty`
    fn infer_levels(&self, abs_qty: f64) -> u32 {
        let tolerance = self.cfg.min_qty_step / 2.0;
        (1..=self.cfg.max_levels)
            .find(|&level| self.cfg.cumulative_qty(level) + tolerance >= abs_qty)
            .unwrap_or(self.cfg.max_levels)
            .max(1)
    }

    fn backfill_entries(
        &self,
        state: &mut GridState,
        position: &PositionSnapshot,
    ) -> Result<(), ReconcileError> {
        let Some(direction) = state.direction else {
            return Ok(());
        };
        let trades = self
            .exchange
            .get_user_trades(&self.cfg.name, None, HISTORY_LIMIT)
            .map_err(ReconcileError::TradeHistory)?;

        let basket = basket_trades(&trades, direction, position.abs_qty())?;
        for trade in &basket {
            state.push_entry_order(trade.order_id);
        }
        if state.basket_open_ts.is_none() {
            state.basket_open_ts = basket.first().map(|t| t.time);
        }
        info!(
            "Recovered {} entry order(s) for basket from trade history",
            state.entry_order_ids.len()
        );
        Ok(())
    }
}

/// Trades that built the current position, oldest first
///
/// Everything up to and including the last trade on the exit side belongs
/// to earlier baskets. From what remains, the shortest run of trailing
/// entry-side trades whose quantity covers `size` (less 1%) is returned.
pub fn basket_trades(
    trades: &[UserTrade],
    direction: Direction,
    size: f64,
) -> Result<Vec<&UserTrade>, ReconcileError> {
    let entry_side = direction.entry_side();
    let start = trades
        .iter()
        .rposition(|t| t.side != entry_side)
        .map(|i| i + 1)
        .unwrap_or(0);
    let current = &trades[start..];

    let needed = size * (1.0 - HISTORY_TOLERANCE);
    let mut covered = 0.0;
    for (i, trade) in current.iter().enumerate().rev() {
        covered += trade.qty;
        if covered >= needed {
            return Ok(current[i..].iter().collect());
        }
    }
    Err(ReconcileError::InsufficientHistory {
        covered,
        needed: size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;
    use chrono::TimeZone;

    fn trade(order_id: u64, side: Side, qty: f64, secs: i64) -> UserTrade {
        UserTrade {
            order_id,
            side,
            price: 3000.0,
            qty,
            quote_qty: 3000.0 * qty,
            fee: 0.0,
            time: Utc.timestamp_opt(1_741_944_000 + secs, 0).unwrap(),
        }
    }

    #[test]
    fn test_slice_starts_after_last_exit() {
        let trades = vec![
            trade(1, Side::Sell, 0.01, 0),
            trade(2, Side::Buy, 0.01, 10),
            trade(3, Side::Sell, 0.01, 20),
            trade(4, Side::Sell, 0.02, 30),
        ];
        let picked = basket_trades(&trades, Direction::Short, 0.03).unwrap();
        let ids: Vec<u64> = picked.iter().map(|t| t.order_id).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[test]
    fn test_minimal_suffix_within_tolerance() {
        let trades = vec![
            trade(1, Side::Buy, 0.5, 0),
            trade(2, Side::Buy, 1.0, 10),
            trade(3, Side::Buy, 0.995, 20),
        ];
        // 0.995 is within 1% of 1.0, so one trade suffices
        let picked = basket_trades(&trades, Direction::Long, 1.0).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].order_id, 3);
    }

    #[test]
    fn test_partial_fills_of_one_order() {
        let trades = vec![
            trade(9, Side::Buy, 0.004, 0),
            trade(9, Side::Buy, 0.006, 0),
        ];
        let picked = basket_trades(&trades, Direction::Long, 0.01).unwrap();
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn test_insufficient_history() {
        let trades = vec![trade(1, Side::Buy, 0.01, 0), trade(2, Side::Sell, 0.01, 10)];
        match basket_trades(&trades, Direction::Short, 0.03) {
            Err(ReconcileError::InsufficientHistory { covered, needed }) => {
                assert_eq!(covered, 0.01);
                assert_eq!(needed, 0.03);
            }
            other => panic!("unexpected {:?}", other.map(|v| v.len())),
        }
        assert!(basket_trades(&[], Direction::Long, 0.01).is_err());
    }
}
