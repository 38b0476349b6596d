use crate::domain::{RegimeLabel, Signal};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Quality metrics of a signal stream scored as a position series: the
/// signal at bar `i` is held over the move from `close[i]` to `close[i + 1]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalMetrics {
    // Risk/return
    pub total_return_pct: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown_pct: f64,
    pub profit_factor: f64,
    // Direction quality
    pub hit_rate: f64,
    pub directional_bars: usize,
    pub long_signals: usize,
    pub short_signals: usize,
    pub neutral_signals: usize,
    pub long_hit_rate: f64,
    pub short_hit_rate: f64,
    pub max_consecutive_hits: usize,
    pub max_consecutive_misses: usize,
    /// Directional changes in the signal stream.
    pub signal_flips: usize,
    pub bar_returns: Vec<f64>,
    pub equity_curve: Vec<f64>,
}

/// Score `signals` against `closes`. `periods_per_year` annualises the
/// Sharpe and Sortino ratios of per-bar returns.
pub fn calculate_metrics(signals: &[Signal], closes: &[f64], periods_per_year: f64) -> SignalMetrics {
    let n = signals.len().min(closes.len());
    let mut bar_returns = Vec::with_capacity(n.saturating_sub(1));
    let mut equity_curve = Vec::with_capacity(n);
    let mut equity = 1.0;
    equity_curve.push(equity);

    // per directional bar: did the next move agree?
    let mut outcomes: Vec<(Signal, bool)> = Vec::new();

    for i in 0..n.saturating_sub(1) {
        let market = if closes[i].abs() > 1e-12 {
            closes[i + 1] / closes[i] - 1.0
        } else {
            0.0
        };
        let r = signals[i].as_f64() * market;
        bar_returns.push(r);
        equity *= 1.0 + r;
        equity_curve.push(equity);

        if signals[i].is_directional() {
            outcomes.push((signals[i], r > 0.0));
        }
    }

    let (long_signals, short_signals, neutral_signals) =
        signals[..n].iter().fold((0, 0, 0), |(l, s, z), sig| match sig {
            Signal::Long => (l + 1, s, z),
            Signal::Short => (l, s + 1, z),
            Signal::Neutral => (l, s, z + 1),
        });

    let hits: Vec<bool> = outcomes.iter().map(|(_, hit)| *hit).collect();
    let rate = |side: Signal| {
        let side_outcomes: Vec<bool> = outcomes.iter().filter(|(s, _)| *s == side).map(|(_, h)| *h).collect();
        hit_rate(&side_outcomes)
    };

    let gross_profit: f64 = bar_returns.iter().filter(|r| **r > 0.0).sum();
    let gross_loss: f64 = bar_returns.iter().filter(|r| **r < 0.0).map(|r| r.abs()).sum();
    let profit_factor = if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else if gross_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    let signal_flips = signals[..n]
        .iter()
        .filter(|s| s.is_directional())
        .collect::<Vec<_>>()
        .windows(2)
        .filter(|w| w[0] != w[1])
        .count();

    SignalMetrics {
        total_return_pct: (equity - 1.0) * 100.0,
        sharpe_ratio: sharpe(&bar_returns, periods_per_year),
        sortino_ratio: sortino(&bar_returns, periods_per_year),
        max_drawdown_pct: max_drawdown(&equity_curve),
        profit_factor,
        hit_rate: hit_rate(&hits),
        directional_bars: hits.len(),
        long_signals,
        short_signals,
        neutral_signals,
        long_hit_rate: rate(Signal::Long),
        short_hit_rate: rate(Signal::Short),
        max_consecutive_hits: max_run(&hits, true),
        max_consecutive_misses: max_run(&hits, false),
        signal_flips,
        bar_returns,
        equity_curve,
    }
}

/// Average of `signal × next-bar return` over the bars spent in one regime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RegimeQuality {
    pub samples: usize,
    pub avg_quality: f64,
}

/// Signal quality per regime. The last bar has no next return and is left
/// out, as are bars with a zero close. Regimes never visited are absent.
pub fn regime_quality(
    signals: &[Signal],
    regimes: &[RegimeLabel],
    closes: &[f64],
) -> HashMap<RegimeLabel, RegimeQuality> {
    let n = signals.len().min(regimes.len()).min(closes.len());
    let mut sums: HashMap<RegimeLabel, (usize, f64)> = HashMap::new();
    for i in 0..n.saturating_sub(1) {
        if closes[i].abs() <= 1e-12 {
            continue;
        }
        let next_return = closes[i + 1] / closes[i] - 1.0;
        let entry = sums.entry(regimes[i]).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += signals[i].as_f64() * next_return;
    }
    sums.into_iter()
        .map(|(regime, (samples, total))| {
            (
                regime,
                RegimeQuality {
                    samples,
                    avg_quality: total / samples as f64,
                },
            )
        })
        .collect()
}

fn hit_rate(hits: &[bool]) -> f64 {
    if hits.is_empty() {
        return 0.0;
    }
    hits.iter().filter(|h| **h).count() as f64 / hits.len() as f64
}

fn sharpe(returns: &[f64], periods_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
    let std = variance.sqrt();
    if std < 1e-10 {
        return 0.0;
    }
    (mean / std) * periods_per_year.sqrt()
}

fn sortino(returns: &[f64], periods_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let downside = returns.iter().filter(|&&r| r < 0.0).map(|r| r.powi(2)).sum::<f64>() / returns.len() as f64;
    let downside_std = downside.sqrt();
    if downside_std < 1e-10 {
        return if mean > 0.0 { 100.0 } else { 0.0 };
    }
    (mean / downside_std) * periods_per_year.sqrt()
}

fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = match equity.first() {
        Some(e) => *e,
        None => return 0.0,
    };
    let mut max_dd = 0.0;
    for &val in equity {
        if val > peak {
            peak = val;
        }
        if peak > 0.0 {
            let dd = (peak - val) / peak * 100.0;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

fn max_run(hits: &[bool], value: bool) -> usize {
    let mut best = 0;
    let mut current = 0;
    for &h in hits {
        if h == value {
            current += 1;
            best = best.max(current);
        } else {
            current = 0;
        }
    }
    best
}
