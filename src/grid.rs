//! Grid sizing and price arithmetic
//!
//! Quantities follow a laddered schedule: the base quantity repeats for
//! `repeat_every` levels, then is scaled by `multiplier` and rounded up to
//! the venue's quantity step. All step/tick rounding goes through
//! `rust_decimal` so results land exactly on the venue grid.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::types::Direction;

/// Round `value` up to the nearest multiple of `step`
pub fn round_up(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    let exact = decimal_pair(value, step).and_then(|(v, s)| {
        v.checked_div(s)
            .and_then(|units| units.ceil().checked_mul(s))
            .and_then(|d| d.to_f64())
    });
    exact.unwrap_or_else(|| (value / step).ceil() * step)
}

/// Round `value` to the nearest multiple of `step`, ties to even
pub fn round_to_step(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    let exact = decimal_pair(value, step).and_then(|(v, s)| {
        v.checked_div(s)
            .map(|units| units.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven))
            .and_then(|units| units.checked_mul(s))
            .and_then(|d| d.to_f64())
    });
    exact.unwrap_or_else(|| (value / step).round() * step)
}

/// Whether `step` survives conversion to a non-zero `Decimal`
///
/// Steps finer than `Decimal`'s 28 fractional digits collapse to zero.
pub fn is_representable_step(step: f64) -> bool {
    step > 0.0 && Decimal::from_f64(step).map_or(false, |s| !s.is_zero())
}

fn decimal_pair(value: f64, step: f64) -> Option<(Decimal, Decimal)> {
    let s = Decimal::from_f64(step).filter(|s| !s.is_zero())?;
    Some((Decimal::from_f64(value)?, s))
}

/// Render `value` with exactly as many decimals as `step` carries
///
/// Used for quantities and prices sent to the venue, which rejects
/// over-precise values.
pub fn format_to_step(value: f64, step: f64) -> String {
    let (Some(v), Some(s)) = (Decimal::from_f64(value), Decimal::from_f64(step)) else {
        return value.to_string();
    };
    let scale = s.normalize().scale();
    v.round_dp_with_strategy(scale, RoundingStrategy::MidpointNearestEven)
        .normalize()
        .to_string()
}

/// Quantity for a 1-indexed grid level
///
/// Walking from level 1 to `level`, every time the running level counter is
/// an exact multiple of `repeat_every` the quantity is multiplied and
/// rounded up to `step`.
pub fn level_qty(level: u32, base_qty: f64, repeat_every: u32, multiplier: f64, step: f64) -> f64 {
    let mut qty = base_qty;
    if repeat_every == 0 {
        return qty;
    }
    let mut current = 1;
    while current < level {
        if current % repeat_every == 0 {
            qty = round_up(qty * multiplier, step);
        }
        current += 1;
    }
    qty
}

/// Total quantity held once levels `1..=level` have filled
pub fn cumulative_qty(
    level: u32,
    base_qty: f64,
    repeat_every: u32,
    multiplier: f64,
    step: f64,
) -> f64 {
    (1..=level)
        .map(|l| level_qty(l, base_qty, repeat_every, multiplier, step))
        .sum()
}

/// Aggregate take-profit price for a position
///
/// The target is `(qty / lot_size) * profit_per_lot` in quote currency,
/// spread across the whole position, then rounded to the price tick.
/// Returns `None` for an empty position or a degenerate lot size.
pub fn tp_price(
    entry_price: f64,
    qty: f64,
    direction: Direction,
    lot_size: f64,
    profit_per_lot: f64,
    tick: f64,
) -> Option<f64> {
    if qty <= 0.0 || lot_size <= 0.0 {
        return None;
    }
    let target = qty / lot_size * profit_per_lot;
    let delta = target / qty;
    let raw = match direction {
        Direction::Short => entry_price - delta,
        Direction::Long => entry_price + delta,
    };
    Some(round_to_step(raw, tick))
}
