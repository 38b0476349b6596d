use crate::config::LorentzianSettings;
use crate::domain::indicators;
use crate::domain::{Candle, PriceSeries, Result, Signal, SignalError};
use crate::engine::classifier::LorentzianClassifier;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Upper bound on KNN member neighbours.
pub const MAX_KNN_NEIGHBORS: usize = 252;

/// Bars the KNN member needs beyond its long period before voting.
const KNN_EXTRA_BARS: usize = 10;

/// Relative gap below which two crossing lines are treated as equal.
const CROSS_TOLERANCE: f64 = 1e-9;

const FALLBACK_FAST: usize = 10;
const FALLBACK_SLOW: usize = 30;

/// Ensemble member. Each variant turns a candle window into one signal per
/// bar, reading only bars at or before the one it labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Indicator {
    Rsi {
        period: usize,
        overbought: f64,
        oversold: f64,
    },
    Supertrend {
        atr_length: usize,
        factor: f64,
    },
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Knn {
        short_period: usize,
        long_period: usize,
        neighbors: usize,
        volatility_filter: bool,
    },
    Lorentzian {
        settings: Box<LorentzianSettings>,
        #[serde(default)]
        fallback: bool,
    },
}

impl Indicator {
    pub fn rsi(period: usize, overbought: f64, oversold: f64) -> Self {
        Indicator::Rsi {
            period,
            overbought,
            oversold,
        }
    }

    pub fn supertrend(atr_length: usize, factor: f64) -> Self {
        Indicator::Supertrend { atr_length, factor }
    }

    pub fn macd(fast: usize, slow: usize, signal: usize) -> Self {
        Indicator::Macd { fast, slow, signal }
    }

    /// KNN member with the maximum neighbour count and the volatility filter on.
    pub fn knn(short_period: usize, long_period: usize) -> Self {
        Indicator::Knn {
            short_period,
            long_period,
            neighbors: MAX_KNN_NEIGHBORS,
            volatility_filter: true,
        }
    }

    pub fn lorentzian(settings: LorentzianSettings) -> Self {
        Indicator::Lorentzian {
            settings: Box::new(settings),
            fallback: false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Indicator::Rsi { .. } => "rsi",
            Indicator::Supertrend { .. } => "supertrend",
            Indicator::Macd { .. } => "macd",
            Indicator::Knn { .. } => "knn",
            Indicator::Lorentzian { .. } => "lorentzian",
        }
    }

    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(SignalError::InvalidConfiguration(msg));
        match self {
            Indicator::Rsi {
                period,
                overbought,
                oversold,
            } => {
                if *period == 0 {
                    return bad("rsi period must be > 0".into());
                }
                if oversold >= overbought {
                    return bad(format!("rsi oversold {} must be below overbought {}", oversold, overbought));
                }
            }
            Indicator::Supertrend { atr_length, factor } => {
                if *atr_length == 0 || !(factor.is_finite() && *factor > 0.0) {
                    return bad("supertrend needs atr_length > 0 and a positive factor".into());
                }
            }
            Indicator::Macd { fast, slow, signal } => {
                if *fast == 0 || *slow == 0 || *signal == 0 || fast >= slow {
                    return bad(format!("invalid macd periods {}/{}/{}", fast, slow, signal));
                }
            }
            Indicator::Knn {
                short_period,
                long_period,
                neighbors,
                ..
            } => {
                if *short_period == 0 || short_period >= long_period {
                    return bad("knn needs 0 < short_period < long_period".into());
                }
                if *neighbors == 0 || *neighbors > MAX_KNN_NEIGHBORS {
                    return bad(format!("knn neighbors must be in 1..={}", MAX_KNN_NEIGHBORS));
                }
            }
            Indicator::Lorentzian { settings, .. } => settings.validate()?,
        }
        Ok(())
    }

    /// One signal per candle in `window`.
    pub fn generate_signals(&self, window: &[Candle], holding_period: usize) -> Vec<Signal> {
        let series = PriceSeries::from_candles(window);
        match self {
            Indicator::Rsi {
                period,
                overbought,
                oversold,
            } => {
                let raw = indicators::rsi(&series.close, *period)
                    .into_iter()
                    .map(|v| {
                        if !v.is_finite() {
                            None
                        } else if v > *overbought {
                            Some(Signal::Short)
                        } else if v < *oversold {
                            Some(Signal::Long)
                        } else {
                            Some(Signal::Neutral)
                        }
                    })
                    .collect::<Vec<_>>();
                apply_holding_period(&raw, holding_period)
            }
            Indicator::Supertrend { atr_length, factor } => {
                let trend = indicators::supertrend(&series.high, &series.low, &series.close, *atr_length, *factor);
                let raw: Vec<Option<Signal>> = (0..trend.len())
                    .map(|i| {
                        let now = trend[i]?;
                        let prev = if i > 0 { trend[i - 1] } else { None };
                        Some(match (prev, now) {
                            (Some(false), true) => Signal::Long,
                            (Some(true), false) => Signal::Short,
                            _ => Signal::Neutral,
                        })
                    })
                    .collect();
                apply_holding_period(&raw, holding_period)
            }
            Indicator::Macd { fast, slow, signal } => {
                let (line, sig, _) = indicators::macd(&series.close, *fast, *slow, *signal);
                let raw: Vec<Option<Signal>> = (0..line.len())
                    .map(|i| {
                        if !line[i].is_finite() || !sig[i].is_finite() {
                            return None;
                        }
                        Some(crossover(&line, &sig, i))
                    })
                    .collect();
                apply_holding_period(&raw, holding_period)
            }
            Indicator::Knn { .. } => match self.knn_vote() {
                Some(knn) => knn.signals(&series),
                None => vec![Signal::Neutral; series.len()],
            },
            Indicator::Lorentzian { settings, fallback } => {
                let classifier = LorentzianClassifier::new((**settings).clone());
                let signals = classifier.run(&series).signals;
                if *fallback {
                    with_crossover_fallback(signals, &series.close)
                } else {
                    signals
                }
            }
        }
    }
}

impl Indicator {
    /// Signal for the last candle of `window`; equal to the last element of
    /// `generate_signals`. The KNN member votes on that bar alone instead of
    /// replaying every bar.
    pub fn latest_signal(&self, window: &[Candle], holding_period: usize) -> Signal {
        match self.knn_vote() {
            Some(knn) => knn.latest(&PriceSeries::from_candles(window)),
            None => self
                .generate_signals(window, holding_period)
                .last()
                .copied()
                .unwrap_or_default(),
        }
    }

    fn knn_vote(&self) -> Option<KnnVote> {
        match self {
            Indicator::Knn {
                short_period,
                long_period,
                neighbors,
                volatility_filter,
            } => Some(KnnVote {
                short_period: *short_period,
                long_period: *long_period,
                neighbors: *neighbors,
                volatility_filter: *volatility_filter,
            }),
            _ => None,
        }
    }
}

/// `Long` when `a` crosses above `b` at `i`, `Short` when it crosses below.
/// Gaps within rounding noise of the operands count as touching.
fn crossover(a: &[f64], b: &[f64], i: usize) -> Signal {
    if i == 0 {
        return Signal::Neutral;
    }
    let before = gap(a[i - 1], b[i - 1]);
    let now = gap(a[i], b[i]);
    if before <= 0.0 && now > 0.0 {
        Signal::Long
    } else if before >= 0.0 && now < 0.0 {
        Signal::Short
    } else {
        Signal::Neutral
    }
}

/// `a − b`, snapped to 0 inside the tolerance. NaN stays NaN.
fn gap(a: f64, b: f64) -> f64 {
    let d = a - b;
    if d.abs() <= CROSS_TOLERANCE * a.abs().max(b.abs()).max(1.0) {
        0.0
    } else {
        d
    }
}

/// Drop a non-zero signal once it has repeated for `holding_period` bars.
/// `None` bars (indicator undefined) emit Neutral without touching the count.
pub fn apply_holding_period(raw: &[Option<Signal>], holding_period: usize) -> Vec<Signal> {
    let mut out = Vec::with_capacity(raw.len());
    let mut current = Signal::Neutral;
    let mut bar_count = 0usize;

    for r in raw {
        let mut signal = match r {
            Some(s) => *s,
            None => {
                out.push(Signal::Neutral);
                continue;
            }
        };
        if signal != current {
            bar_count = 0;
        } else {
            bar_count += 1;
        }
        if bar_count >= holding_period && signal.is_directional() {
            signal = Signal::Neutral;
            bar_count = 0;
        }
        out.push(signal);
        current = signal;
    }
    out
}

/// While `signals` has not produced a direction yet, substitute SMA(10)/SMA(30)
/// crossovers. Only bars before the first directional signal are replaced.
fn with_crossover_fallback(signals: Vec<Signal>, closes: &[f64]) -> Vec<Signal> {
    let fast = indicators::sma(closes, FALLBACK_FAST);
    let slow = indicators::sma(closes, FALLBACK_SLOW);
    let mut out = signals;
    for i in 0..out.len() {
        if out[i].is_directional() {
            break;
        }
        if i >= FALLBACK_SLOW {
            out[i] = crossover(&fast, &slow, i);
        }
    }
    out
}

/// Majority-vote KNN over standardised momentum, volume and volatility features.
#[derive(Debug, Clone, Copy)]
struct KnnVote {
    short_period: usize,
    long_period: usize,
    neighbors: usize,
    volatility_filter: bool,
}

impl KnnVote {
    fn signals(&self, series: &PriceSeries) -> Vec<Signal> {
        let n = series.len();
        let mut out = vec![Signal::Neutral; n];
        let start = self.long_period + KNN_EXTRA_BARS;
        if n < start {
            return out;
        }
        let columns = self.feature_columns(series);
        for (i, slot) in out.iter_mut().enumerate().skip(start - 1) {
            *slot = self.vote(&columns, &series.close, i);
        }
        out
    }

    fn latest(&self, series: &PriceSeries) -> Signal {
        let n = series.len();
        if n == 0 || n < self.long_period + KNN_EXTRA_BARS {
            return Signal::Neutral;
        }
        let columns = self.feature_columns(series);
        self.vote(&columns, &series.close, n - 1)
    }

    fn feature_columns(&self, series: &PriceSeries) -> Vec<Vec<f64>> {
        let close = &series.close;
        let returns = indicators::pct_change(close, 1);
        vec![
            indicators::pct_change(close, self.short_period),
            indicators::pct_change(close, self.long_period),
            indicators::sma(&series.volume, self.short_period),
            indicators::sma(&series.volume, self.long_period),
            indicators::rolling_std(&returns, self.long_period),
            indicators::sma(close, self.short_period),
            indicators::sma(close, self.long_period),
        ]
    }

    /// Vote for bar `i` using rows `long_period..=i`.
    fn vote(&self, columns: &[Vec<f64>], closes: &[f64], i: usize) -> Signal {
        let first = self.long_period;
        let rows: Vec<Vec<f64>> = (first..=i)
            .map(|r| columns.iter().map(|c| c[r]).collect())
            .collect();
        if rows.len() < 2 || rows.iter().any(|r| r.iter().any(|v| !v.is_finite())) {
            return Signal::Neutral;
        }
        // every row identical: no neighbour is nearer than another
        if rows.iter().all(|r| *r == rows[0]) {
            return Signal::Neutral;
        }

        let scaled = standardise(&rows);
        let (train, query) = scaled.split_at(scaled.len() - 1);
        let labels: Vec<i32> = (first..i)
            .map(|r| if closes[r + 1] > closes[r] { 1 } else { -1 })
            .collect();

        let k = self.neighbors.min(train.len());
        let mut dist: Vec<(f64, usize)> = train
            .iter()
            .enumerate()
            .map(|(idx, row)| (euclidean(row, &query[0]), idx))
            .collect();
        dist.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let votes: i32 = dist.iter().take(k).map(|(_, idx)| labels[*idx]).sum();
        // ties go to the lower class
        let prediction = if votes > 0 { Signal::Long } else { Signal::Short };

        if self.volatility_filter {
            let vol = &columns[4][first..=i];
            let avg = vol.iter().mean();
            if vol[vol.len() - 1] > avg * 2.0 {
                return Signal::Neutral;
            }
        }
        prediction
    }
}

/// Column-wise z-score with the population standard deviation; constant
/// columns are centred but not scaled.
fn standardise(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let width = rows.first().map(|r| r.len()).unwrap_or(0);
    let mut out = rows.to_vec();
    for c in 0..width {
        let column: Vec<f64> = rows.iter().map(|r| r[c]).collect();
        let mean = column.iter().mean();
        let std = column.iter().population_std_dev();
        let scale = if std > 1e-12 { std } else { 1.0 };
        for row in out.iter_mut() {
            row[c] = (row[c] - mean) / scale;
        }
    }
    out
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
}
