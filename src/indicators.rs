//! Technical indicators
//!
//! Rolling Bollinger Bands used to decide when a new basket opens. The window
//! keeps a running sum and sum of squares so each update is O(1).

use std::collections::VecDeque;

/// Lower, middle and upper band for the current window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bands {
    pub lower: f64,
    pub mean: f64,
    pub upper: f64,
}

/// Fixed-window Bollinger Bands over the last `period` samples
#[derive(Debug, Clone)]
pub struct BollingerBands {
    period: usize,
    num_std: f64,
    window: VecDeque<f64>,
    sum: f64,
    sum_sq: f64,
}

impl BollingerBands {
    pub fn new(period: usize, num_std: f64) -> Self {
        Self {
            period,
            num_std,
            window: VecDeque::with_capacity(period),
            sum: 0.0,
            sum_sq: 0.0,
        }
    }

    /// Add a sample, evicting the oldest one once the window is full
    pub fn add(&mut self, value: f64) {
        if self.period == 0 {
            return;
        }
        if self.window.len() == self.period {
            if let Some(oldest) = self.window.pop_front() {
                self.sum -= oldest;
                self.sum_sq -= oldest * oldest;
            }
        }
        self.window.push_back(value);
        self.sum += value;
        self.sum_sq += value * value;
    }

    /// Feed a series of closes, keeping only the trailing `period` of them
    pub fn seed(&mut self, closes: &[f64]) {
        let start = closes.len().saturating_sub(self.period);
        for &close in &closes[start..] {
            self.add(close);
        }
    }

    pub fn ready(&self) -> bool {
        self.period > 0 && self.window.len() == self.period
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Current bands, or `None` until the window holds `period` samples
    pub fn bands(&self) -> Option<Bands> {
        if !self.ready() {
            return None;
        }
        let n = self.period as f64;
        let mean = self.sum / n;
        // Running sums can drift slightly negative for flat windows
        let variance = (self.sum_sq / n - mean * mean).max(0.0);
        let std_dev = variance.sqrt();

        Some(Bands {
            lower: mean - self.num_std * std_dev,
            mean,
            upper: mean + self.num_std * std_dev,
        })
    }
}
