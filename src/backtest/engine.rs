use crate::config::EngineConfig;
use crate::domain::{Candle, RegimeLabel, Result, Signal};
use crate::engine::session::{SessionReport, SignalSession};
use crate::evaluation::metrics::{self, RegimeQuality, SignalMetrics};
use std::collections::HashMap;
use tracing::info;

/// Replays candles through a `SignalSession` in temporal order and scores
/// the resulting signal stream. No orders, fees or sizing: each signal is
/// held for exactly one bar.
pub struct SignalBacktest {
    session: SignalSession,
    periods_per_year: f64,
}

impl SignalBacktest {
    pub fn new(config: EngineConfig, periods_per_year: f64) -> Result<Self> {
        Ok(Self {
            session: SignalSession::new(config)?,
            periods_per_year,
        })
    }

    pub fn session(&self) -> &SignalSession {
        &self.session
    }

    /// Batch evaluation of the whole history.
    pub fn run(&mut self, candles: &[Candle]) -> Result<BacktestResult> {
        let report = self.session.run(candles)?;
        Ok(self.score(candles, report))
    }

    /// Feed candles one at a time, as a live session would see them.
    pub fn run_streaming(&mut self, candles: &[Candle]) -> Result<BacktestResult> {
        self.session.reset();
        for c in candles {
            self.session.on_candle(*c)?;
        }
        let report = SessionReport {
            signals: self.session.signals().to_vec(),
            diagnostics: self.session.diagnostics().to_vec(),
        };
        Ok(self.score(candles, report))
    }

    fn score(&self, candles: &[Candle], report: SessionReport) -> BacktestResult {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let metrics = metrics::calculate_metrics(&report.signals, &closes, self.periods_per_year);
        let regime_counts = report.regime_counts();
        let regimes: Vec<RegimeLabel> = report.diagnostics.iter().map(|d| d.regime.label).collect();
        let regime_quality = metrics::regime_quality(&report.signals, &regimes, &closes);
        info!(
            bars = candles.len(),
            total_return_pct = metrics.total_return_pct,
            hit_rate = metrics.hit_rate,
            "signal backtest scored"
        );
        BacktestResult {
            metrics,
            regime_counts,
            regime_quality,
            final_weights: RegimeLabel::ALL
                .iter()
                .map(|r| (*r, self.session.weights().get(*r).to_vec()))
                .collect(),
            report,
        }
    }
}

/// Complete signal backtest result
pub struct BacktestResult {
    pub metrics: SignalMetrics,
    pub report: SessionReport,
    pub regime_counts: HashMap<RegimeLabel, usize>,
    /// Mean signal × next return per regime.
    pub regime_quality: HashMap<RegimeLabel, RegimeQuality>,
    pub final_weights: Vec<(RegimeLabel, Vec<f64>)>,
}

impl BacktestResult {
    pub fn signals(&self) -> &[Signal] {
        &self.report.signals
    }

    pub fn print_summary(&self) {
        let m = &self.metrics;
        let bars = self.report.signals.len();

        println!("\n{}", "=".repeat(60));
        println!("  SIGNAL BACKTEST RESULTS");
        println!("{}", "=".repeat(60));
        println!("  Bars:               {:>10}", bars);
        println!("  Total Return:       {:>10.2}%", m.total_return_pct);
        println!("  Sharpe Ratio:       {:>10.2}", m.sharpe_ratio);
        println!("  Sortino Ratio:      {:>10.2}", m.sortino_ratio);
        println!("  Max Drawdown:       {:>10.2}%", m.max_drawdown_pct);
        println!("  Profit Factor:      {:>10.2}", m.profit_factor);
        println!("  Hit Rate:           {:>10.2}%", m.hit_rate * 100.0);
        println!("  Directional Bars:   {:>10}", m.directional_bars);
        println!("  Signal Flips:       {:>10}", m.signal_flips);
        println!("  Max Consec. Hits:   {:>10}", m.max_consecutive_hits);
        println!("  Max Consec. Misses: {:>10}", m.max_consecutive_misses);

        println!("\n  --- Signal Breakdown ---");
        println!(
            "  Long:  {:>6}  hit {:>5.1}%",
            m.long_signals,
            m.long_hit_rate * 100.0
        );
        println!(
            "  Short: {:>6}  hit {:>5.1}%",
            m.short_signals,
            m.short_hit_rate * 100.0
        );
        println!("  Flat:  {:>6}", m.neutral_signals);

        println!("\n  --- Regimes ---");
        for regime in RegimeLabel::ALL {
            let count = self.regime_counts.get(&regime).copied().unwrap_or(0);
            let pct = if bars > 0 {
                count as f64 / bars as f64 * 100.0
            } else {
                0.0
            };
            let quality = self
                .regime_quality
                .get(&regime)
                .map(|q| format!("{:+.5}", q.avg_quality))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {:10} {:>6} bars ({:>5.1}%)  quality {}",
                regime.to_string(),
                count,
                pct,
                quality
            );
        }

        println!("\n  --- Final Weights ---");
        for (regime, weights) in &self.final_weights {
            let formatted: Vec<String> = weights.iter().map(|w| format!("{:.3}", w)).collect();
            println!("  {:10} [{}]", regime.to_string(), formatted.join(", "));
        }
        println!("{}", "=".repeat(60));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::random_walk;

    #[test]
    fn test_backtest_scores_every_bar() {
        let candles = random_walk(120, 42, 100.0);
        let mut bt = SignalBacktest::new(EngineConfig::default(), 8760.0).unwrap();
        let result = bt.run(&candles).unwrap();
        assert_eq!(result.signals().len(), 120);
        assert_eq!(result.metrics.equity_curve.len(), 120);
        let counted: usize = result.regime_counts.values().sum();
        assert_eq!(counted, 120);
        let m = &result.metrics;
        assert_eq!(m.long_signals + m.short_signals + m.neutral_signals, 120);
    }

    #[test]
    fn test_regime_quality_covers_scored_bars() {
        let candles = random_walk(100, 4, 100.0);
        let mut bt = SignalBacktest::new(EngineConfig::default(), 8760.0).unwrap();
        let result = bt.run(&candles).unwrap();
        let samples: usize = result.regime_quality.values().map(|q| q.samples).sum();
        assert_eq!(samples, 99);
        for (regime, q) in &result.regime_quality {
            assert!(result.regime_counts[regime] >= q.samples);
            assert!(q.avg_quality.is_finite());
        }
    }

    #[test]
    fn test_streaming_matches_batch() {
        let candles = random_walk(60, 9, 50.0);
        let mut bt = SignalBacktest::new(EngineConfig::default(), 8760.0).unwrap();
        let batch = bt.run(&candles).unwrap();
        let streamed = bt.run_streaming(&candles).unwrap();
        assert_eq!(batch.signals(), streamed.signals());
        assert_eq!(batch.final_weights, streamed.final_weights);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.ensemble.consensus_threshold = f64::NAN;
        assert!(SignalBacktest::new(config, 365.0).is_err());
    }
}
