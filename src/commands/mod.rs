//! Command implementations for the grid-band-bot binary

pub mod live;
