//! Market regime classification.
//!
//! Checks run in priority order over the trailing regime window:
//! - **Volatile**: wide Bollinger bandwidth of typical price inside the
//!   window, or a volume spike
//! - **Trend**: net close change is a large share of the window's high-low range
//! - **Range**: everything else

use crate::config::RegimeConfig;
use crate::domain::indicators;
use crate::domain::{Candle, RegimeLabel, Result, SignalError};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::debug;

/// Regime decision plus the measurements behind it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeReading {
    pub label: RegimeLabel,
    /// Bollinger bandwidth of typical price; 0 when undefined.
    pub bandwidth: f64,
    /// Current volume over the window mean volume.
    pub volume_ratio: f64,
    /// |Δclose| / (max high − min low) over the window.
    pub trend_strength: f64,
}

impl RegimeReading {
    fn default_trend() -> Self {
        Self {
            label: RegimeLabel::Trend,
            bandwidth: 0.0,
            volume_ratio: 1.0,
            trend_strength: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegimeDetector {
    config: RegimeConfig,
}

impl RegimeDetector {
    pub fn new(config: RegimeConfig) -> Self {
        Self { config }
    }

    /// Classify the last bar of `history`. No hysteresis: each call depends
    /// only on the trailing bars.
    pub fn detect(&self, history: &[Candle]) -> RegimeReading {
        let w = self.config.regime_window;
        if history.len() < w {
            return RegimeReading::default_trend();
        }
        let window = &history[history.len() - w..];

        let bandwidth = self.bandwidth(window);
        let volume_ratio = volume_ratio(window);
        let trend_strength = trend_strength(window).unwrap_or_else(|e| {
            debug!(error = %e, "trend strength recovered as 0");
            0.0
        });

        let volume_spike = volume_ratio > self.config.volume_spike_multiplier;
        let label = if bandwidth > self.config.volatility_threshold || volume_spike {
            debug!(bandwidth, volume_spike, "volatile regime");
            RegimeLabel::Volatile
        } else if trend_strength > self.config.trend_threshold {
            debug!(trend_strength, "trending regime");
            RegimeLabel::Trend
        } else {
            debug!(trend_strength, "ranging regime");
            RegimeLabel::Range
        };

        RegimeReading {
            label,
            bandwidth,
            volume_ratio,
            trend_strength,
        }
    }

    /// Bandwidth of the bands measured inside the regime window. A window
    /// shorter than `bb_period` has no bands and reads 0.
    fn bandwidth(&self, window: &[Candle]) -> f64 {
        let typical: Vec<f64> = window.iter().map(|c| c.typical_price()).collect();
        indicators::bollinger_bandwidth(&typical, self.config.bb_period, self.config.bb_std)
            .filter(|b| b.is_finite())
            .unwrap_or(0.0)
    }
}

fn volume_ratio(window: &[Candle]) -> f64 {
    let mean = window.iter().map(|c| c.volume).mean();
    let current = window.last().map(|c| c.volume).unwrap_or(0.0);
    if mean > 0.0 && mean.is_finite() {
        current / mean
    } else {
        1.0
    }
}

fn trend_strength(window: &[Candle]) -> Result<f64> {
    let (first, last) = match (window.first(), window.last()) {
        (Some(f), Some(l)) => (f, l),
        _ => return Err(SignalError::InsufficientData { required: 1, actual: 0 }),
    };
    let high = window.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let low = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    let range = high - low;
    if range <= 0.0 || !range.is_finite() {
        return Err(SignalError::NumericDegeneracy("zero price range"));
    }
    Ok((last.close - first.close).abs() / range)
}
