use crate::config::KernelSettings;
use crate::domain::{Result, SignalError};
use tracing::trace;

/// Nadaraya-Watson estimates over closes, one value per bar.
#[derive(Debug, Clone, Default)]
pub struct KernelEstimates {
    pub rational_quadratic: Vec<f64>,
    pub gaussian: Vec<f64>,
}

impl KernelEstimates {
    pub fn compute(closes: &[f64], settings: &KernelSettings) -> Self {
        let h = settings.lookback;
        let r = settings.relative_weight;
        let x = settings.regression_level;
        let gaussian_window = h.saturating_sub(settings.lag).max(1);

        Self {
            rational_quadratic: estimate_series(closes, h, |delta| {
                rational_quadratic_weight(delta, r, x)
            }),
            gaussian: estimate_series(closes, gaussian_window, |delta| gaussian_weight(delta, x)),
        }
    }

    pub fn is_bullish(&self, i: usize) -> bool {
        rising(&self.rational_quadratic, i)
    }

    pub fn is_bearish(&self, i: usize) -> bool {
        falling(&self.rational_quadratic, i)
    }

    /// Rising now after not rising on the previous bar.
    pub fn bullish_change(&self, i: usize) -> bool {
        i >= 2 && rising(&self.rational_quadratic, i) && !rising(&self.rational_quadratic, i - 1)
    }

    /// Falling now after not falling on the previous bar.
    pub fn bearish_change(&self, i: usize) -> bool {
        i >= 2 && falling(&self.rational_quadratic, i) && !falling(&self.rational_quadratic, i - 1)
    }
}

fn rising(est: &[f64], i: usize) -> bool {
    i >= 1 && i < est.len() && est[i] > est[i - 1]
}

fn falling(est: &[f64], i: usize) -> bool {
    i >= 1 && i < est.len() && est[i] < est[i - 1]
}

/// `(1 + Δ²/(2rX))^(−r)`, evaluated as `exp(−r·ln_1p(Δ²/(2rX)))`.
pub fn rational_quadratic_weight(delta: f64, r: f64, x: f64) -> f64 {
    (-r * (delta * delta / (2.0 * r * x)).ln_1p()).exp()
}

/// `exp(−Δ²/(2X))`
pub fn gaussian_weight(delta: f64, x: f64) -> f64 {
    (-(delta * delta) / (2.0 * x)).exp()
}

fn estimate_series(closes: &[f64], window: usize, weight: impl Fn(f64) -> f64) -> Vec<f64> {
    (0..closes.len())
        .map(|i| match estimate_at(closes, i, window, &weight) {
            Ok(v) => v,
            Err(e) => {
                trace!(bar = i, error = %e, "kernel estimate recovered as 0");
                0.0
            }
        })
        .collect()
}

/// Weighted mean of `closes[i − window .. i]`, with `Δ = i − j`.
fn estimate_at(closes: &[f64], i: usize, window: usize, weight: &impl Fn(f64) -> f64) -> Result<f64> {
    if i < window {
        return Ok(0.0);
    }
    let mut weighted = 0.0;
    let mut total = 0.0;
    for j in (i - window)..i {
        let w = weight((i - j) as f64);
        weighted += w * closes[j];
        total += w;
    }
    if total <= 0.0 || !total.is_finite() {
        return Err(SignalError::NumericDegeneracy("zero kernel weight sum"));
    }
    Ok(weighted / total)
}
