//! Per-bar technical indicator series.
//!
//! Every function returns one value per input bar and marks bars without
//! enough history as `NaN`. All computations are causal: the value at index
//! `i` only reads inputs `0..=i`.

use statrs::statistics::Statistics;

/// Simple moving average. Any NaN inside the window yields NaN.
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; data.len()];
    if period == 0 {
        return out;
    }
    for i in (period - 1)..data.len() {
        let window = &data[i + 1 - period..=i];
        if window.iter().all(|v| v.is_finite()) {
            out[i] = window.iter().sum::<f64>() / period as f64;
        }
    }
    out
}

/// Exponential moving average seeded with the SMA of the first `period`
/// valid values. Leading NaNs are skipped; a NaN after the seed produces a
/// NaN output without disturbing the running state.
pub fn ema(data: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; data.len()];
    if period == 0 {
        return out;
    }
    let first = match data.iter().position(|v| v.is_finite()) {
        Some(f) => f,
        None => return out,
    };
    let seed_end = first + period - 1;
    if seed_end >= data.len() {
        return out;
    }
    let seed = &data[first..=seed_end];
    if !seed.iter().all(|v| v.is_finite()) {
        return out;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema_val = seed.iter().sum::<f64>() / period as f64;
    out[seed_end] = ema_val;
    for i in (seed_end + 1)..data.len() {
        let val = data[i];
        if !val.is_finite() {
            continue;
        }
        ema_val = (val - ema_val) * multiplier + ema_val;
        out[i] = ema_val;
    }
    out
}

/// Wilder RSI, first defined at index `period`.
pub fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; closes.len()];
    if period == 0 || closes.len() < period + 1 {
        return out;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss += change.abs();
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    out[period] = rsi_value(avg_gain, avg_loss);

    for i in (period + 1)..closes.len() {
        let change = closes[i] - closes[i - 1];
        let (gain, loss) = if change > 0.0 {
            (change, 0.0)
        } else {
            (0.0, change.abs())
        };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        out[i] = rsi_value(avg_gain, avg_loss);
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_gain < 1e-12 && avg_loss < 1e-12 {
        return 50.0; // flat
    }
    if avg_loss < 1e-12 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

/// True range. Index 0 has no previous close and is NaN.
pub fn true_range(highs: &[f64], lows: &[f64], closes: &[f64]) -> Vec<f64> {
    let n = closes.len();
    let mut out = vec![f64::NAN; n];
    for i in 1..n {
        out[i] = (highs[i] - lows[i])
            .max((highs[i] - closes[i - 1]).abs())
            .max((lows[i] - closes[i - 1]).abs());
    }
    out
}

/// Wilder ATR, first defined at index `period`.
pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < period + 1 {
        return out;
    }
    let trs = true_range(highs, lows, closes);
    let mut atr_val = trs[1..=period].iter().sum::<f64>() / period as f64;
    out[period] = atr_val;
    for i in (period + 1)..n {
        atr_val = (atr_val * (period as f64 - 1.0) + trs[i]) / period as f64;
        out[i] = atr_val;
    }
    out
}

/// Wilder ADX, first defined at index `2 * period - 1`.
pub fn adx(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < 2 * period {
        return out;
    }

    let trs = true_range(highs, lows, closes);
    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    for i in 1..n {
        let up = highs[i] - highs[i - 1];
        let down = lows[i - 1] - lows[i];
        plus_dm[i] = if up > down && up > 0.0 { up } else { 0.0 };
        minus_dm[i] = if down > up && down > 0.0 { down } else { 0.0 };
    }

    let p = period as f64;
    let mut s_tr: f64 = trs[1..=period].iter().sum();
    let mut s_plus: f64 = plus_dm[1..=period].iter().sum();
    let mut s_minus: f64 = minus_dm[1..=period].iter().sum();

    let mut dx = vec![f64::NAN; n];
    dx[period] = directional_index(s_tr, s_plus, s_minus);
    for i in (period + 1)..n {
        s_tr = s_tr - s_tr / p + trs[i];
        s_plus = s_plus - s_plus / p + plus_dm[i];
        s_minus = s_minus - s_minus / p + minus_dm[i];
        dx[i] = directional_index(s_tr, s_plus, s_minus);
    }

    let first = 2 * period - 1;
    let mut adx_val = dx[period..=first].iter().sum::<f64>() / p;
    out[first] = adx_val;
    for i in (first + 1)..n {
        adx_val = (adx_val * (p - 1.0) + dx[i]) / p;
        out[i] = adx_val;
    }
    out
}

fn directional_index(s_tr: f64, s_plus: f64, s_minus: f64) -> f64 {
    if s_tr < 1e-12 {
        return 0.0;
    }
    let plus_di = 100.0 * s_plus / s_tr;
    let minus_di = 100.0 * s_minus / s_tr;
    let di_sum = plus_di + minus_di;
    if di_sum < 1e-12 {
        return 0.0;
    }
    100.0 * (plus_di - minus_di).abs() / di_sum
}

/// Commodity Channel Index over the typical price. Zero mean deviation gives 0.
pub fn cci(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < period {
        return out;
    }
    let tp: Vec<f64> = (0..n).map(|i| (highs[i] + lows[i] + closes[i]) / 3.0).collect();
    for i in (period - 1)..n {
        let window = &tp[i + 1 - period..=i];
        let mean = window.iter().sum::<f64>() / period as f64;
        let mean_dev = window.iter().map(|v| (v - mean).abs()).sum::<f64>() / period as f64;
        out[i] = if mean_dev < 1e-12 {
            0.0
        } else {
            (tp[i] - mean) / (0.015 * mean_dev)
        };
    }
    out
}

/// WaveTrend oscillator: EMA(`channel`) channel index smoothed by EMA(`average`).
pub fn wavetrend(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    channel: usize,
    average: usize,
) -> Vec<f64> {
    let n = closes.len();
    let hlc3: Vec<f64> = (0..n).map(|i| (highs[i] + lows[i] + closes[i]) / 3.0).collect();
    let esa = ema(&hlc3, channel);
    let abs_dev: Vec<f64> = hlc3.iter().zip(&esa).map(|(p, e)| (p - e).abs()).collect();
    let d = ema(&abs_dev, channel);
    let ci: Vec<f64> = (0..n)
        .map(|i| {
            if !esa[i].is_finite() || !d[i].is_finite() {
                f64::NAN
            } else if d[i] < 1e-12 {
                0.0
            } else {
                (hlc3[i] - esa[i]) / (0.015 * d[i])
            }
        })
        .collect();
    ema(&ci, average)
}

/// MACD line, signal line and histogram.
pub fn macd(
    closes: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let fast_ema = ema(closes, fast);
    let slow_ema = ema(closes, slow);
    let line: Vec<f64> = fast_ema.iter().zip(&slow_ema).map(|(f, s)| f - s).collect();
    let signal_line = ema(&line, signal);
    let hist: Vec<f64> = line.iter().zip(&signal_line).map(|(l, s)| l - s).collect();
    (line, signal_line, hist)
}

/// Rolling sample standard deviation (n − 1 denominator).
pub fn rolling_std(data: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; data.len()];
    if period < 2 {
        return out;
    }
    for i in (period - 1)..data.len() {
        let window = &data[i + 1 - period..=i];
        if window.iter().all(|v| v.is_finite()) {
            out[i] = window.iter().std_dev();
        }
    }
    out
}

/// Bollinger bandwidth `(upper − lower) / middle` of the last `period` values,
/// using the sample standard deviation. `None` without enough data or with a
/// zero middle band.
pub fn bollinger_bandwidth(data: &[f64], period: usize, num_std: f64) -> Option<f64> {
    if period < 2 || data.len() < period {
        return None;
    }
    let window = &data[data.len() - period..];
    let middle = window.iter().mean();
    if !middle.is_finite() || middle.abs() < 1e-12 {
        return None;
    }
    let std = window.iter().std_dev();
    Some(2.0 * num_std * std / middle)
}

/// Percentage change over `lag` bars.
pub fn pct_change(data: &[f64], lag: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; data.len()];
    if lag == 0 {
        return out;
    }
    for i in lag..data.len() {
        let prev = data[i - lag];
        if prev.abs() > 1e-12 {
            out[i] = data[i] / prev - 1.0;
        }
    }
    out
}

/// Supertrend direction per bar: `Some(true)` in an uptrend, `Some(false)` in
/// a downtrend, `None` before the ATR is defined. ATR is the rolling mean of
/// the true range.
pub fn supertrend(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    atr_length: usize,
    factor: f64,
) -> Vec<Option<bool>> {
    let n = closes.len();
    let mut out = vec![None; n];
    let atr_vals = sma(&true_range(highs, lows, closes), atr_length);

    let mut final_upper = f64::NAN;
    let mut final_lower = f64::NAN;
    let mut uptrend = true;
    let mut started = false;

    for i in 0..n {
        if !atr_vals[i].is_finite() {
            continue;
        }
        let hl2 = (highs[i] + lows[i]) / 2.0;
        let basic_upper = hl2 + factor * atr_vals[i];
        let basic_lower = hl2 - factor * atr_vals[i];

        if !started {
            final_upper = basic_upper;
            final_lower = basic_lower;
            started = true;
            out[i] = Some(uptrend);
            continue;
        }

        let prev_close = closes[i - 1];
        let prev_upper = final_upper;
        let prev_lower = final_lower;

        // Bands only ratchet toward price until price crosses them.
        final_upper = if basic_upper < prev_upper || prev_close > prev_upper {
            basic_upper
        } else {
            prev_upper
        };
        final_lower = if basic_lower > prev_lower || prev_close < prev_lower {
            basic_lower
        } else {
            prev_lower
        };

        if closes[i] > prev_upper {
            uptrend = true;
        } else if closes[i] < prev_lower {
            uptrend = false;
        }
        out[i] = Some(uptrend);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trending(n: usize, step: f64) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let closes: Vec<f64> = (0..n).map(|i| 100.0 + i as f64 * step).collect();
        let highs = closes.iter().map(|c| c + 1.0).collect();
        let lows = closes.iter().map(|c| c - 1.0).collect();
        (highs, lows, closes)
    }

    #[test]
    fn test_sma() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let s = sma(&data, 3);
        assert!(s[0].is_nan() && s[1].is_nan());
        assert!((s[2] - 2.0).abs() < 1e-10);
        assert!((s[4] - 4.0).abs() < 1e-10); // (3+4+5)/3
    }

    #[test]
    fn test_sma_nan_window() {
        let data = vec![f64::NAN, 2.0, 3.0, 4.0];
        let s = sma(&data, 2);
        assert!(s[1].is_nan());
        assert!((s[2] - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_ema_seed_and_lag() {
        let data: Vec<f64> = (1..=10).map(|i| i as f64).collect();
        let e = ema(&data, 3);
        assert!(e[1].is_nan());
        assert!((e[2] - 2.0).abs() < 1e-10); // SMA seed of 1,2,3
        assert!(e[9] > 8.0 && e[9] < 10.0); // EMA lags
    }

    #[test]
    fn test_ema_skips_leading_nan() {
        let data = vec![f64::NAN, f64::NAN, 1.0, 2.0, 3.0];
        let e = ema(&data, 2);
        assert!(e[2].is_nan());
        assert!((e[3] - 1.5).abs() < 1e-10);
        assert!(e[4].is_finite());
    }

    #[test]
    fn test_rsi_extremes() {
        let up: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let r = rsi(&up, 14);
        assert!(r[13].is_nan());
        assert_eq!(r[14], 100.0);

        let down: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        assert!(rsi(&down, 14)[29] < 1.0);
    }

    #[test]
    fn test_rsi_flat_is_neutral() {
        let flat = vec![100.0; 30];
        assert_eq!(rsi(&flat, 14)[29], 50.0);
    }

    #[test]
    fn test_rsi_midpoint() {
        let mut data = vec![100.0];
        for i in 0..30 {
            let last = data[data.len() - 1];
            data.push(if i % 2 == 0 { last + 1.0 } else { last - 1.0 });
        }
        let r = rsi(&data, 14)[30];
        assert!(r > 40.0 && r < 60.0, "equal gains/losses should give RSI near 50: {}", r);
    }

    #[test]
    fn test_atr_constant_range() {
        let n = 40;
        let highs = vec![102.0; n];
        let lows = vec![98.0; n];
        let closes = vec![100.0; n];
        let a = atr(&highs, &lows, &closes, 14);
        assert!(a[13].is_nan());
        assert!((a[14] - 4.0).abs() < 1e-10);
        assert!((a[39] - 4.0).abs() < 1e-10);
    }

    #[test]
    fn test_atr_flat_market_is_zero() {
        let flat = vec![100.0; 40];
        let a14 = atr(&flat, &flat, &flat, 14);
        let a28 = atr(&flat, &flat, &flat, 28);
        assert_eq!(a14[39], 0.0);
        assert_eq!(a28[39], 0.0);
    }

    #[test]
    fn test_adx_warmup_and_trend() {
        let (h, l, c) = trending(60, 1.0);
        let a = adx(&h, &l, &c, 14);
        assert!(a[26].is_nan());
        assert!(a[27].is_finite());
        assert!(a[59] > 50.0, "steady uptrend should have strong ADX: {}", a[59]);
    }

    #[test]
    fn test_cci_flat_is_zero() {
        let flat = vec![50.0; 25];
        let v = cci(&flat, &flat, &flat, 20);
        assert!(v[18].is_nan());
        assert_eq!(v[19], 0.0);
    }

    #[test]
    fn test_cci_uptrend_positive() {
        let (h, l, c) = trending(40, 0.5);
        assert!(cci(&h, &l, &c, 20)[39] > 0.0);
    }

    #[test]
    fn test_wavetrend_defined_after_warmup() {
        let (h, l, c) = trending(60, 0.5);
        let wt = wavetrend(&h, &l, &c, 10, 11);
        assert!(wt[20].is_nan());
        assert!(wt[59].is_finite());
        assert!(wt[59] > 0.0);
    }

    #[test]
    fn test_macd_trending() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64 * 0.5).collect();
        let (line, signal, _) = macd(&closes, 12, 26, 9);
        assert!(line[24].is_nan());
        assert!(line[59] > 0.0);
        assert!(signal[59].is_finite());
    }

    #[test]
    fn test_rolling_std_matches_sample_std() {
        let data = vec![1.0, 2.0, 3.0, 4.0];
        let s = rolling_std(&data, 4);
        // sample variance of 1..4 = 5/3
        assert!((s[3] - (5.0f64 / 3.0).sqrt()).abs() < 1e-10);
    }

    #[test]
    fn test_bollinger_bandwidth() {
        assert_eq!(bollinger_bandwidth(&[100.0; 20], 20, 2.0), Some(0.0));
        assert_eq!(bollinger_bandwidth(&[100.0; 5], 20, 2.0), None);
        let alternating: Vec<f64> = (0..20).map(|i| if i % 2 == 0 { 101.0 } else { 99.0 }).collect();
        assert!(bollinger_bandwidth(&alternating, 20, 2.0).unwrap() > 0.0);
    }

    #[test]
    fn test_pct_change() {
        let p = pct_change(&[100.0, 110.0, 99.0], 1);
        assert!(p[0].is_nan());
        assert!((p[1] - 0.1).abs() < 1e-10);
        assert!((p[2] + 0.1).abs() < 1e-10);
    }

    #[test]
    fn test_supertrend_flips_on_reversal() {
        let mut closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        closes.extend((0..40).map(|i| 139.0 - 3.0 * i as f64));
        let highs: Vec<f64> = closes.iter().map(|c| c + 1.0).collect();
        let lows: Vec<f64> = closes.iter().map(|c| c - 1.0).collect();
        let st = supertrend(&highs, &lows, &closes, 10, 3.0);
        assert!(st[5].is_none());
        assert_eq!(st[39], Some(true));
        assert_eq!(st[79], Some(false));
    }
}
