use crate::config::EnsembleConfig;
use crate::domain::{RegimeLabel, Signal};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Whether `signal` called the direction of `realised_return`.
/// Neutral signals are never correct.
pub fn called_direction(signal: Signal, realised_return: f64) -> bool {
    match signal {
        Signal::Long => realised_return > 0.0,
        Signal::Short => realised_return < 0.0,
        Signal::Neutral => false,
    }
}

/// Multiplicative reward/penalty update followed by renormalisation to
/// `Σw = len(w)`. A non-finite or non-positive total leaves the weights as
/// they were.
pub fn reweight(weights: &[f64], correct: &[bool], reward: f64, penalty: f64) -> Vec<f64> {
    let updated: Vec<f64> = weights
        .iter()
        .zip(correct)
        .map(|(w, ok)| if *ok { w * reward } else { w * penalty })
        .collect();

    let total: f64 = updated.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return weights.to_vec();
    }
    let scale = updated.len() as f64 / total;
    updated.iter().map(|w| w * scale).collect()
}

/// Per-regime weight vectors, persisted across bars of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeWeights {
    pub trend: Vec<f64>,
    pub range: Vec<f64>,
    pub volatile: Vec<f64>,
    pub updates: u64,
}

impl RegimeWeights {
    pub fn from_config(config: &EnsembleConfig) -> Self {
        let weights = |regime: RegimeLabel| -> Vec<f64> {
            config.members(regime).iter().map(|m| m.weight).collect()
        };
        Self {
            trend: weights(RegimeLabel::Trend),
            range: weights(RegimeLabel::Range),
            volatile: weights(RegimeLabel::Volatile),
            updates: 0,
        }
    }

    pub fn get(&self, regime: RegimeLabel) -> &[f64] {
        match regime {
            RegimeLabel::Trend => &self.trend,
            RegimeLabel::Range => &self.range,
            RegimeLabel::Volatile => &self.volatile,
        }
    }

    fn get_mut(&mut self, regime: RegimeLabel) -> &mut Vec<f64> {
        match regime {
            RegimeLabel::Trend => &mut self.trend,
            RegimeLabel::Range => &mut self.range,
            RegimeLabel::Volatile => &mut self.volatile,
        }
    }

    /// Reward members whose recent signal called `realised_return`, penalise
    /// the rest, and store the renormalised vector for `regime`.
    pub fn adapt(
        &mut self,
        regime: RegimeLabel,
        recent_signals: &[Signal],
        realised_return: f64,
        reward: f64,
        penalty: f64,
    ) -> &[f64] {
        let correct: Vec<bool> = recent_signals
            .iter()
            .map(|s| called_direction(*s, realised_return))
            .collect();
        let before = self.get(regime).to_vec();
        let after = reweight(&before, &correct, reward, penalty);
        debug!(%regime, ?before, ?after, "ensemble weights adapted");
        *self.get_mut(regime) = after;
        self.updates += 1;
        self.get(regime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_called_direction() {
        assert!(called_direction(Signal::Long, 0.01));
        assert!(called_direction(Signal::Short, -0.01));
        assert!(!called_direction(Signal::Long, -0.01));
        assert!(!called_direction(Signal::Neutral, 0.05));
        assert!(!called_direction(Signal::Long, 0.0));
    }

    #[test]
    fn test_reweight_normalises_to_length() {
        let w = reweight(&[0.5, 0.3, 0.2], &[true, false, false], 1.10, 0.95);
        let sum: f64 = w.iter().sum();
        assert!((sum - 3.0).abs() < 1e-9, "sum = {}", sum);
        assert!(w[0] > w[1]);
    }

    #[test]
    fn test_reweight_exact_values() {
        // 0.55 + 0.285 + 0.19 = 1.025
        let w = reweight(&[0.5, 0.3, 0.2], &[true, false, false], 1.10, 0.95);
        assert!((w[0] - 0.55 * 3.0 / 1.025).abs() < 1e-12);
        assert!((w[2] - 0.19 * 3.0 / 1.025).abs() < 1e-12);
    }

    #[test]
    fn test_reweight_all_wrong_keeps_ratios() {
        let w = reweight(&[0.5, 0.3, 0.2], &[false, false, false], 1.10, 0.95);
        assert!((w[0] / w[1] - 0.5 / 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_reweight_degenerate_total_unchanged() {
        let w = reweight(&[f64::INFINITY, 1.0], &[true, true], 1.10, 0.95);
        assert!(w[0].is_infinite());
        assert_eq!(w[1], 1.0);
    }

    #[test]
    fn test_regime_weights_adapt_only_active_regime() {
        let mut weights = RegimeWeights::from_config(&EnsembleConfig::default());
        let range_before = weights.range.clone();
        weights.adapt(
            RegimeLabel::Trend,
            &[Signal::Long, Signal::Short, Signal::Neutral],
            0.02,
            1.10,
            0.95,
        );
        assert_eq!(weights.range, range_before);
        assert_eq!(weights.updates, 1);
        let sum: f64 = weights.trend.iter().sum();
        assert!((sum - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_repeated_adaptation_stays_normalised() {
        let mut weights = RegimeWeights::from_config(&EnsembleConfig::default());
        for k in 0..200 {
            let r = if k % 3 == 0 { -0.01 } else { 0.01 };
            weights.adapt(
                RegimeLabel::Volatile,
                &[Signal::Long, Signal::Short, Signal::Long],
                r,
                1.10,
                0.95,
            );
            let sum: f64 = weights.volatile.iter().sum();
            assert!((sum - 3.0).abs() < 1e-9);
        }
    }
}
