use crate::config::OverlayConfig;
use crate::domain::indicators;
use crate::domain::Signal;
use chrono::{DateTime, Timelike, Utc};
use statrs::statistics::Statistics;

const TREND_FAST: usize = 20;
const TREND_SLOW: usize = 50;
const MOMENTUM_LAG: usize = 3;
const MOMENTUM_SUM: usize = 5;

/// Weighted sum of member signals.
pub fn consensus_score(signals: &[Signal], weights: &[f64]) -> f64 {
    signals.iter().zip(weights).map(|(s, w)| s.as_f64() * w).sum()
}

/// Outcome of one consensus step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    /// Score after time-of-day scaling, before thresholding.
    pub score: f64,
    /// Thresholded score before overlays.
    pub thresholded: Signal,
    pub signal: Signal,
}

/// Thresholds the weighted score and applies the post-consensus overlays.
#[derive(Debug, Clone)]
pub struct ConsensusAggregator {
    threshold: f64,
    overlays: OverlayConfig,
}

impl ConsensusAggregator {
    pub fn new(threshold: f64, overlays: OverlayConfig) -> Self {
        Self {
            threshold,
            overlays,
        }
    }

    /// `closes` is the full history up to and including the current bar.
    pub fn decide(&self, signals: &[Signal], weights: &[f64], closes: &[f64], now: DateTime<Utc>) -> Decision {
        let score = self.derisk(consensus_score(signals, weights), now);
        let thresholded = Signal::from_threshold(score, self.threshold);
        let signal = self.apply_overlays(thresholded, closes);
        Decision {
            score,
            thresholded,
            signal,
        }
    }

    /// Scale the score down late in the day when de-risking is on.
    pub fn derisk(&self, score: f64, now: DateTime<Utc>) -> f64 {
        if !self.overlays.time_derisk {
            return score;
        }
        let hour = now.hour();
        let fraction = hour as f64 / 24.0;
        if fraction > 0.5 && hour >= self.overlays.derisk_after_hour {
            score * (1.0 - fraction)
        } else {
            score
        }
    }

    pub fn apply_overlays(&self, signal: Signal, closes: &[f64]) -> Signal {
        let mut signal = signal;
        if self.overlays.extreme_volatility && self.extreme_volatility(closes) {
            signal = Signal::Neutral;
        }
        if self.overlays.trend_alignment {
            signal = trend_alignment(signal, closes);
        }
        if self.overlays.momentum {
            signal = momentum_filter(signal, closes, self.overlays.momentum_threshold);
        }
        signal
    }

    fn extreme_volatility(&self, closes: &[f64]) -> bool {
        let window = self.overlays.volatility_window;
        if closes.len() <= 20 || closes.len() <= window {
            return false;
        }
        let tail = &closes[closes.len() - window - 1..];
        let returns: Vec<f64> = tail.windows(2).map(|w| w[1] / w[0] - 1.0).collect();
        if returns.iter().any(|r| !r.is_finite()) {
            return false;
        }
        returns.iter().std_dev() > self.overlays.extreme_volatility_threshold
    }
}

/// No shorts in a stacked uptrend, no longs in a stacked downtrend.
fn trend_alignment(signal: Signal, closes: &[f64]) -> Signal {
    if closes.len() <= TREND_SLOW {
        return signal;
    }
    let price = closes[closes.len() - 1];
    let fast = closes[closes.len() - TREND_FAST..].iter().mean();
    let slow = closes[closes.len() - TREND_SLOW..].iter().mean();

    let strong_up = price > fast && fast > slow;
    let strong_down = price < fast && fast < slow;
    match signal {
        Signal::Short if strong_up => Signal::Neutral,
        Signal::Long if strong_down => Signal::Neutral,
        other => other,
    }
}

/// Sum of the last five 3-bar returns vetoes signals against it.
fn momentum_filter(signal: Signal, closes: &[f64], threshold: f64) -> Signal {
    if closes.len() <= 14 {
        return signal;
    }
    let tail = &closes[closes.len() - (MOMENTUM_LAG + MOMENTUM_SUM)..];
    let changes = indicators::pct_change(tail, MOMENTUM_LAG);
    let momentum: f64 = changes[MOMENTUM_LAG..].iter().sum();
    if !momentum.is_finite() {
        return signal;
    }
    match signal {
        Signal::Short if momentum > threshold => Signal::Neutral,
        Signal::Long if momentum < -threshold => Signal::Neutral,
        other => other,
    }
}
