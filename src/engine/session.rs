use crate::config::EngineConfig;
use crate::domain::{Candle, PriceSeries, RegimeLabel, Result, Signal, SignalError};
use crate::engine::adaptive::RegimeWeights;
use crate::engine::consensus::ConsensusAggregator;
use crate::engine::kernel::KernelEstimates;
use crate::engine::regime::{RegimeDetector, RegimeReading};
use crate::engine::strategy::{OnDemandSignals, PrecomputedSignals, SignalSource};
use crate::strategy::features::FeatureMatrix;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

/// Read-only record of how one bar's signal was reached.
#[derive(Debug, Clone, Serialize)]
pub struct BarDiagnostics {
    pub index: usize,
    pub timestamp: i64,
    pub regime: RegimeReading,
    pub member_signals: Vec<Signal>,
    /// Ensemble weights this bar's consensus used, before its adaptive pass.
    pub weights: Vec<f64>,
    pub score: f64,
    /// Thresholded score before the overlays.
    pub thresholded: Signal,
    /// Rational-quadratic kernel estimate of the close.
    pub kernel_estimate: f64,
    pub features: Vec<f64>,
    pub signal: Signal,
}

/// Output of a batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionReport {
    pub signals: Vec<Signal>,
    pub diagnostics: Vec<BarDiagnostics>,
}

impl SessionReport {
    pub fn regime_counts(&self) -> HashMap<RegimeLabel, usize> {
        let mut counts = HashMap::new();
        for d in &self.diagnostics {
            *counts.entry(d.regime.label).or_insert(0) += 1;
        }
        counts
    }

    /// (long, short, neutral)
    pub fn signal_counts(&self) -> (usize, usize, usize) {
        self.signals.iter().fold((0, 0, 0), |(l, s, n), sig| match sig {
            Signal::Long => (l + 1, s, n),
            Signal::Short => (l, s + 1, n),
            Signal::Neutral => (l, s, n + 1),
        })
    }
}

/// Per-bar evaluation state that persists across bars.
#[derive(Debug, Clone)]
struct SessionCore {
    config: EngineConfig,
    detector: RegimeDetector,
    aggregator: ConsensusAggregator,
    weights: RegimeWeights,
}

impl SessionCore {
    fn new(config: EngineConfig) -> Self {
        Self {
            detector: RegimeDetector::new(config.regime.clone()),
            aggregator: ConsensusAggregator::new(config.ensemble.consensus_threshold, config.overlays.clone()),
            weights: RegimeWeights::from_config(&config.ensemble),
            config,
        }
    }

    /// Evaluate the last bar of `history`.
    fn evaluate(
        &mut self,
        history: &[Candle],
        source: &impl SignalSource,
        kernel_estimate: f64,
        features: Vec<f64>,
    ) -> BarDiagnostics {
        let i = history.len() - 1;
        let candle = history[i];
        let reading = self.detector.detect(history);
        let regime = reading.label;
        let member_count = self.config.ensemble.members(regime).len();

        let member_signals: Vec<Signal> = (0..member_count)
            .map(|k| source.member_signal(regime, k, history))
            .collect();

        let closes: Vec<f64> = history.iter().map(|c| c.close).collect();
        let weights = self.weights.get(regime).to_vec();
        let decision = self
            .aggregator
            .decide(&member_signals, &weights, &closes, candle.datetime());

        // the update only takes effect from the next bar
        self.adapt(regime, history);

        BarDiagnostics {
            index: i,
            timestamp: candle.timestamp,
            regime: reading,
            member_signals,
            weights,
            score: decision.score,
            thresholded: decision.thresholded,
            kernel_estimate,
            features,
            signal: decision.signal,
        }
    }

    /// Re-score the active members on the trailing window against the last
    /// realised return.
    fn adapt(&mut self, regime: RegimeLabel, history: &[Candle]) {
        let ensemble = &self.config.ensemble;
        if !ensemble.adaptive_weights || history.len() < ensemble.min_adaptive_bars || history.len() < 2 {
            return;
        }
        let n = history.len();
        let prev_close = history[n - 2].close;
        if prev_close.abs() < 1e-12 {
            debug!(bar = n - 1, "adaptive pass skipped on zero close");
            return;
        }
        let realised = history[n - 1].close / prev_close - 1.0;
        let window = &history[n.saturating_sub(ensemble.adaptive_window)..];

        let recent: Vec<Signal> = ensemble
            .members(regime)
            .iter()
            .map(|m| {
                let s = m.indicator.generate_signals(window, ensemble.holding_period);
                if s.len() >= 2 {
                    s[s.len() - 2]
                } else {
                    Signal::Neutral
                }
            })
            .collect();

        self.weights.adapt(
            regime,
            &recent,
            realised,
            ensemble.reward_factor,
            ensemble.penalty_factor,
        );
    }
}

/// Per-symbol signal session. Owns the candle history and the per-regime
/// weights; one instance per instrument.
#[derive(Debug, Clone)]
pub struct SignalSession {
    core: SessionCore,
    history: Vec<Candle>,
    signals: Vec<Signal>,
    diagnostics: Vec<BarDiagnostics>,
}

impl SignalSession {
    /// Validates `config`; invalid configuration is fatal.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            core: SessionCore::new(config),
            history: Vec::new(),
            signals: Vec::new(),
            diagnostics: Vec::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.core.config
    }

    pub fn history(&self) -> &[Candle] {
        &self.history
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub fn diagnostics(&self) -> &[BarDiagnostics] {
        &self.diagnostics
    }

    pub fn weights(&self) -> &RegimeWeights {
        &self.core.weights
    }

    /// Drop all history and restore the configured weights.
    pub fn reset(&mut self) {
        self.core = SessionCore::new(self.core.config.clone());
        self.history.clear();
        self.signals.clear();
        self.diagnostics.clear();
    }

    /// Evaluate a complete history from a fresh state.
    pub fn run(&mut self, candles: &[Candle]) -> Result<SessionReport> {
        check_order(candles)?;
        self.reset();

        let series = PriceSeries::from_candles(candles);
        let lorentzian = &self.core.config.lorentzian;
        let kernels = KernelEstimates::compute(&series.close, &lorentzian.kernel);
        let features = FeatureMatrix::build(&series, &lorentzian.features, lorentzian.feature_count);
        let source = PrecomputedSignals::compute(&self.core.config.ensemble, candles);

        for i in 0..candles.len() {
            let diag = self.core.evaluate(
                &candles[..=i],
                &source,
                kernels.rational_quadratic[i],
                features.row(i).to_vec(),
            );
            self.signals.push(diag.signal);
            self.diagnostics.push(diag);
        }
        self.history = candles.to_vec();

        let report = SessionReport {
            signals: self.signals.clone(),
            diagnostics: self.diagnostics.clone(),
        };
        let (long, short, neutral) = report.signal_counts();
        info!(bars = candles.len(), long, short, neutral, "batch run complete");
        Ok(report)
    }

    /// Append one candle and evaluate it. Produces the same signal a batch
    /// run over the same history would.
    pub fn on_candle(&mut self, candle: Candle) -> Result<Signal> {
        if let Some(last) = self.history.last() {
            if candle.timestamp <= last.timestamp {
                return Err(SignalError::OutOfOrder {
                    index: self.history.len(),
                    previous: last.timestamp,
                    current: candle.timestamp,
                });
            }
        }
        self.history.push(candle);

        let i = self.history.len() - 1;
        let series = PriceSeries::from_candles(&self.history);
        let lorentzian = &self.core.config.lorentzian;
        let kernels = KernelEstimates::compute(&series.close, &lorentzian.kernel);
        let features = FeatureMatrix::build(&series, &lorentzian.features, lorentzian.feature_count);

        let ensemble = self.core.config.ensemble.clone();
        let source = OnDemandSignals::new(&ensemble);
        let diag = self.core.evaluate(
            &self.history,
            &source,
            kernels.rational_quadratic[i],
            features.row(i).to_vec(),
        );
        let signal = diag.signal;
        self.signals.push(signal);
        self.diagnostics.push(diag);
        Ok(signal)
    }
}

fn check_order(candles: &[Candle]) -> Result<()> {
    for (i, w) in candles.windows(2).enumerate() {
        if w[1].timestamp <= w[0].timestamp {
            return Err(SignalError::OutOfOrder {
                index: i + 1,
                previous: w[0].timestamp,
                current: w[1].timestamp,
            });
        }
    }
    Ok(())
}
