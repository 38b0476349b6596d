use crate::domain::indicators;
use crate::domain::{PriceSeries, SignalError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Oscillator used as one KNN feature dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FeatureKind {
    Rsi,
    Wt,
    Cci,
    Adx,
}

impl FromStr for FeatureKind {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RSI" => Ok(FeatureKind::Rsi),
            "WT" => Ok(FeatureKind::Wt),
            "CCI" => Ok(FeatureKind::Cci),
            "ADX" => Ok(FeatureKind::Adx),
            other => Err(SignalError::InvalidConfiguration(format!(
                "unknown feature kind '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FeatureKind::Rsi => "RSI",
            FeatureKind::Wt => "WT",
            FeatureKind::Cci => "CCI",
            FeatureKind::Adx => "ADX",
        };
        write!(f, "{}", name)
    }
}

/// One configured feature: kind plus its two parameters.
/// For RSI, CCI and ADX `param_b > 1` applies EMA smoothing of that length.
/// For WT, `param_a` is the channel length and `param_b` the average length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub kind: FeatureKind,
    pub param_a: usize,
    pub param_b: usize,
}

impl FeatureSpec {
    pub fn new(kind: FeatureKind, param_a: usize, param_b: usize) -> Self {
        Self {
            kind,
            param_a,
            param_b,
        }
    }

    /// RSI(14,1), WT(10,11), CCI(20,1), ADX(20,2), RSI(9,1)
    pub fn defaults() -> Vec<FeatureSpec> {
        vec![
            FeatureSpec::new(FeatureKind::Rsi, 14, 1),
            FeatureSpec::new(FeatureKind::Wt, 10, 11),
            FeatureSpec::new(FeatureKind::Cci, 20, 1),
            FeatureSpec::new(FeatureKind::Adx, 20, 2),
            FeatureSpec::new(FeatureKind::Rsi, 9, 1),
        ]
    }

    /// Per-bar values of this feature over the whole series.
    pub fn compute(&self, series: &PriceSeries) -> Vec<f64> {
        let (h, l, c) = (&series.high, &series.low, &series.close);
        match self.kind {
            FeatureKind::Rsi => smooth(indicators::rsi(c, self.param_a), self.param_b),
            FeatureKind::Wt => indicators::wavetrend(h, l, c, self.param_a, self.param_b),
            FeatureKind::Cci => smooth(indicators::cci(h, l, c, self.param_a), self.param_b),
            FeatureKind::Adx => smooth(indicators::adx(h, l, c, self.param_a), self.param_b),
        }
    }
}

fn smooth(values: Vec<f64>, period: usize) -> Vec<f64> {
    if period > 1 {
        indicators::ema(&values, period)
    } else {
        values
    }
}

/// Feature rows for every bar, one column per configured feature.
#[derive(Debug, Clone, Default)]
pub struct FeatureMatrix {
    rows: Vec<Vec<f64>>,
    valid: Vec<bool>,
}

impl FeatureMatrix {
    /// Build rows from the first `feature_count` specs.
    pub fn build(series: &PriceSeries, specs: &[FeatureSpec], feature_count: usize) -> Self {
        let n = series.len();
        let used = &specs[..feature_count.min(specs.len())];
        let columns: Vec<Vec<f64>> = used.iter().map(|s| s.compute(series)).collect();

        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| columns.iter().map(|col| col[i]).collect())
            .collect();
        let valid = rows
            .iter()
            .map(|r: &Vec<f64>| !r.is_empty() && r.iter().all(|v| v.is_finite()))
            .collect();

        Self { rows, valid }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.rows[i]
    }

    /// False when any value in the row is NaN or infinite.
    pub fn is_valid(&self, i: usize) -> bool {
        self.valid.get(i).copied().unwrap_or(false)
    }

    pub fn first_valid(&self) -> Option<usize> {
        self.valid.iter().position(|v| *v)
    }
}
