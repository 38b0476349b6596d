use crate::config::LorentzianSettings;
use crate::domain::indicators;
use crate::domain::{PriceSeries, Signal};
use crate::engine::kernel::KernelEstimates;

/// Lookback of the regime slope gate.
const REGIME_SLOPE_BARS: usize = 5;

/// One AND-gate. A gate can only turn a directional signal into Neutral.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gate {
    /// ATR(14) > ATR(28).
    Volatility,
    /// Buys need a rising kernel, sells a falling one.
    KernelTrend,
    /// Buys need Gaussian ≥ rational-quadratic, sells the reverse.
    KernelCrossCheck,
    /// `close[i] − close[i−5] > threshold`.
    Regime { threshold: f64 },
    /// ADX(14) ≥ threshold.
    Adx { threshold: f64 },
    /// Buys only: close above EMA.
    Ema,
    /// Buys only: close above SMA.
    Sma,
}

/// Indicator series the gates read, computed once per history.
#[derive(Debug, Clone, Default)]
pub struct FilterInputs {
    pub closes: Vec<f64>,
    pub atr_fast: Vec<f64>,
    pub atr_slow: Vec<f64>,
    pub adx: Vec<f64>,
    pub ema: Vec<f64>,
    pub sma: Vec<f64>,
}

impl FilterInputs {
    pub fn compute(series: &PriceSeries, settings: &LorentzianSettings) -> Self {
        let (h, l, c) = (&series.high, &series.low, &series.close);
        let f = &settings.filters;
        let n = c.len();
        Self {
            closes: c.clone(),
            atr_fast: indicators::atr(h, l, c, 14),
            atr_slow: indicators::atr(h, l, c, 28),
            adx: if f.use_adx_filter {
                indicators::adx(h, l, c, 14)
            } else {
                vec![f64::NAN; n]
            },
            ema: if f.use_ema_filter {
                indicators::ema(c, f.ema_period)
            } else {
                vec![f64::NAN; n]
            },
            sma: if f.use_sma_filter {
                indicators::sma(c, f.sma_period)
            } else {
                vec![f64::NAN; n]
            },
        }
    }
}

/// Ordered gate list built from the filter toggles.
#[derive(Debug, Clone)]
pub struct FilterChain {
    gates: Vec<Gate>,
}

impl FilterChain {
    pub fn from_settings(settings: &LorentzianSettings) -> Self {
        let f = &settings.filters;
        let mut gates = Vec::new();
        if f.use_volatility_filter {
            gates.push(Gate::Volatility);
        }
        gates.push(Gate::KernelTrend);
        if settings.kernel.use_kernel_smoothing {
            gates.push(Gate::KernelCrossCheck);
        }
        if f.use_regime_filter {
            gates.push(Gate::Regime {
                threshold: f.regime_threshold,
            });
        }
        if f.use_adx_filter {
            gates.push(Gate::Adx {
                threshold: f.adx_threshold,
            });
        }
        if f.use_ema_filter {
            gates.push(Gate::Ema);
        }
        if f.use_sma_filter {
            gates.push(Gate::Sma);
        }
        Self { gates }
    }

    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    /// Pass `signal` through every gate at bar `i`.
    pub fn apply(&self, signal: Signal, i: usize, inputs: &FilterInputs, kernels: &KernelEstimates) -> Signal {
        if !signal.is_directional() {
            return signal;
        }
        let passes = self.gates.iter().all(|g| g.passes(signal, i, inputs, kernels));
        if passes {
            signal
        } else {
            Signal::Neutral
        }
    }
}

impl Gate {
    fn passes(&self, signal: Signal, i: usize, inputs: &FilterInputs, kernels: &KernelEstimates) -> bool {
        let close = inputs.closes[i];
        match *self {
            // NaN comparisons are false, so undefined indicators fail.
            Gate::Volatility => inputs.atr_fast[i] > inputs.atr_slow[i],
            Gate::KernelTrend => match signal {
                Signal::Long => kernels.is_bullish(i),
                Signal::Short => kernels.is_bearish(i),
                Signal::Neutral => true,
            },
            Gate::KernelCrossCheck => {
                let rq = kernels.rational_quadratic[i];
                let gauss = kernels.gaussian[i];
                match signal {
                    Signal::Long => gauss >= rq,
                    Signal::Short => gauss <= rq,
                    Signal::Neutral => true,
                }
            }
            Gate::Regime { threshold } => {
                i >= REGIME_SLOPE_BARS && close - inputs.closes[i - REGIME_SLOPE_BARS] > threshold
            }
            Gate::Adx { threshold } => inputs.adx[i] >= threshold,
            Gate::Ema => signal != Signal::Long || close > inputs.ema[i],
            Gate::Sma => signal != Signal::Long || close > inputs.sma[i],
        }
    }
}
