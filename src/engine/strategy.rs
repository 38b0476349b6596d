use crate::config::EnsembleConfig;
use crate::domain::{Candle, RegimeLabel, Signal};

/// Where the session gets an ensemble member's signal for the current bar.
///
/// Batch runs precompute every member over the whole history once; live
/// sessions regenerate the active members on each new candle. Members are
/// causal, so both sources agree bar for bar.
pub trait SignalSource {
    /// Signal of member `member` of `regime`'s ensemble at the last bar of
    /// `history`.
    fn member_signal(&self, regime: RegimeLabel, member: usize, history: &[Candle]) -> Signal;
}

/// Full member series computed once over a known history.
#[derive(Debug, Clone, Default)]
pub struct PrecomputedSignals {
    trend: Vec<Vec<Signal>>,
    range: Vec<Vec<Signal>>,
    volatile: Vec<Vec<Signal>>,
}

impl PrecomputedSignals {
    pub fn compute(config: &EnsembleConfig, candles: &[Candle]) -> Self {
        let series = |regime: RegimeLabel| -> Vec<Vec<Signal>> {
            config
                .members(regime)
                .iter()
                .map(|m| m.indicator.generate_signals(candles, config.holding_period))
                .collect()
        };
        Self {
            trend: series(RegimeLabel::Trend),
            range: series(RegimeLabel::Range),
            volatile: series(RegimeLabel::Volatile),
        }
    }

    fn table(&self, regime: RegimeLabel) -> &[Vec<Signal>] {
        match regime {
            RegimeLabel::Trend => &self.trend,
            RegimeLabel::Range => &self.range,
            RegimeLabel::Volatile => &self.volatile,
        }
    }
}

impl SignalSource for PrecomputedSignals {
    fn member_signal(&self, regime: RegimeLabel, member: usize, history: &[Candle]) -> Signal {
        let bar = match history.len().checked_sub(1) {
            Some(b) => b,
            None => return Signal::Neutral,
        };
        self.table(regime)
            .get(member)
            .and_then(|s| s.get(bar))
            .copied()
            .unwrap_or_default()
    }
}

/// Evaluates a member on the last bar of the history it is handed.
#[derive(Debug, Clone, Copy)]
pub struct OnDemandSignals<'a> {
    config: &'a EnsembleConfig,
}

impl<'a> OnDemandSignals<'a> {
    pub fn new(config: &'a EnsembleConfig) -> Self {
        Self { config }
    }
}

impl SignalSource for OnDemandSignals<'_> {
    fn member_signal(&self, regime: RegimeLabel, member: usize, history: &[Candle]) -> Signal {
        self.config
            .members(regime)
            .get(member)
            .map(|m| m.indicator.latest_signal(history, self.config.holding_period))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.4).sin() * 6.0;
                Candle {
                    timestamp: i as i64 * 60_000,
                    open: close,
                    high: close + 0.8,
                    low: close - 0.8,
                    close,
                    volume: 500.0,
                }
            })
            .collect()
    }

    /// Accepts any source through the trait bound.
    fn last_signal(source: &impl SignalSource, history: &[Candle]) -> Signal {
        source.member_signal(RegimeLabel::Range, 0, history)
    }

    #[test]
    fn test_sources_agree() {
        let config = EnsembleConfig::default();
        let data = candles(80);
        let batch = PrecomputedSignals::compute(&config, &data);
        let live = OnDemandSignals::new(&config);
        for end in [20, 35, 36, 45, 80] {
            for regime in RegimeLabel::ALL {
                for member in 0..3 {
                    assert_eq!(
                        batch.member_signal(regime, member, &data[..end]),
                        live.member_signal(regime, member, &data[..end]),
                        "{} member {} at bar {}",
                        regime,
                        member,
                        end - 1
                    );
                }
            }
        }
    }

    #[test]
    fn test_empty_history_is_neutral() {
        let config = EnsembleConfig::default();
        let batch = PrecomputedSignals::compute(&config, &[]);
        assert_eq!(last_signal(&batch, &[]), Signal::Neutral);
        assert_eq!(last_signal(&OnDemandSignals::new(&config), &[]), Signal::Neutral);
    }

    #[test]
    fn test_unknown_member_is_neutral() {
        let config = EnsembleConfig::default();
        let data = candles(30);
        let batch = PrecomputedSignals::compute(&config, &data);
        assert_eq!(batch.member_signal(RegimeLabel::Trend, 9, &data), Signal::Neutral);
    }
}
