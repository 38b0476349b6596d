use chrono::{TimeZone, Utc};
use lorentz::config::{EngineConfig, LorentzianSettings, OverlayConfig};
use lorentz::data::synthetic::{from_closes, random_walk, BAR_MS, START_MS};
use lorentz::domain::{Candle, PriceSeries, RegimeLabel, Signal};
use lorentz::engine::{
    consensus_score, lorentzian_distance, ConsensusAggregator, LorentzianClassifier, RegimeWeights,
    SignalSession,
};

/// Candles whose high-low range widens every bar, so ATR(14) stays above ATR(28).
fn widening(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let spread = 0.5 + 0.05 * i as f64;
            Candle {
                timestamp: START_MS + i as i64 * BAR_MS,
                open: if i > 0 { closes[i - 1] } else { close },
                high: close + spread,
                low: close - spread,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

fn short_lookback() -> LorentzianSettings {
    LorentzianSettings {
        max_bars_back: 20,
        ..LorentzianSettings::default()
    }
}

#[test]
fn test_same_input_same_output() {
    let candles = random_walk(150, 11, 100.0);
    let a = SignalSession::new(EngineConfig::default()).unwrap().run(&candles).unwrap();
    let b = SignalSession::new(EngineConfig::default()).unwrap().run(&candles).unwrap();
    assert_eq!(a.signals, b.signals);
    assert_eq!(a.signals.len(), 150);
}

#[test]
fn test_batch_and_incremental_agree() {
    let candles = random_walk(90, 5, 100.0);
    let mut batch = SignalSession::new(EngineConfig::default()).unwrap();
    let report = batch.run(&candles).unwrap();

    let mut live = SignalSession::new(EngineConfig::default()).unwrap();
    let streamed: Vec<Signal> = candles.iter().map(|c| live.on_candle(*c).unwrap()).collect();

    assert_eq!(report.signals, streamed);
    assert_eq!(batch.weights(), live.weights());
}

#[test]
fn test_weights_stay_normalised() {
    let candles = random_walk(120, 21, 100.0);
    let mut session = SignalSession::new(EngineConfig::default()).unwrap();
    session.run(&candles).unwrap();

    let initial = RegimeWeights::from_config(&EngineConfig::default().ensemble);
    let adapted = session.weights();
    assert!(adapted.updates > 0);
    for regime in RegimeLabel::ALL {
        let w = adapted.get(regime);
        if w != initial.get(regime) {
            let total: f64 = w.iter().sum();
            assert!((total - w.len() as f64).abs() < 1e-9);
        }
        assert!(w.iter().all(|v| *v > 0.0));
    }
}

#[test]
fn test_classifier_warmup_is_neutral() {
    let candles = random_walk(100, 2, 100.0);
    let series = PriceSeries::from_candles(&candles);
    let out = LorentzianClassifier::new(short_lookback()).run(&series);
    // default features are first valid at bar 40
    assert!(out.predictions[..40].iter().all(|p| *p == 0));
    assert!(out.signals[..40].iter().all(|s| *s == Signal::Neutral));
}

#[test]
fn test_prediction_bounded_by_neighbors() {
    let candles = random_walk(300, 8, 100.0);
    let series = PriceSeries::from_candles(&candles);
    let settings = LorentzianSettings {
        neighbors_count: 5,
        max_bars_back: 120,
        ..LorentzianSettings::default()
    };
    let out = LorentzianClassifier::new(settings).run(&series);
    assert!(out.predictions.iter().all(|p| p.abs() <= 5));
}

fn uptrend() -> Vec<Candle> {
    let closes: Vec<f64> = (0..200).map(|i| 100.0 + 0.5 * i as f64).collect();
    from_closes(&closes, 1.0)
}

#[test]
fn test_monotonic_uptrend() {
    let series = PriceSeries::from_candles(&uptrend());
    let out = LorentzianClassifier::new(short_lookback()).run(&series);

    for i in 9..200 {
        assert!(out.kernels.rational_quadratic[i] >= out.kernels.rational_quadratic[i - 1]);
    }
    // once a neighbour label is known, every one points up
    assert!(out.predictions[50..].iter().all(|p| *p > 0));
    assert!(out.signals.iter().all(|s| *s != Signal::Short));
}

#[test]
fn test_monotonic_uptrend_session_never_shorts() {
    let mut session = SignalSession::new(EngineConfig::default()).unwrap();
    let report = session.run(&uptrend()).unwrap();

    let shorts: Vec<usize> = (0..report.signals.len())
        .filter(|i| report.signals[*i] == Signal::Short)
        .collect();
    assert!(shorts.is_empty(), "shorts at {:?}", shorts);
    assert!(report
        .diagnostics
        .iter()
        .all(|d| d.regime.label == RegimeLabel::Trend));
}

#[test]
fn test_flat_market_is_blocked_by_volatility_gate() {
    let series = PriceSeries::from_candles(&from_closes(&[100.0; 120], 0.0));
    let out = LorentzianClassifier::new(short_lookback()).run(&series);
    assert!(out.signals.iter().all(|s| *s == Signal::Neutral));
}

#[test]
fn test_flat_market_session_stays_neutral() {
    let candles = from_closes(&[100.0; 120], 1.0);
    let mut session = SignalSession::new(EngineConfig::default()).unwrap();
    let report = session.run(&candles).unwrap();
    assert!(report.signals.iter().all(|s| *s == Signal::Neutral));
    assert!(report.diagnostics.iter().all(|d| d.score == 0.0));
}

#[test]
fn test_identical_vectors_have_zero_distance() {
    let v = [0.3, 42.0, -7.5, 1e6, 0.0];
    assert_eq!(lorentzian_distance(&v, &v), 0.0);
}

#[test]
fn test_scan_respects_cutoff() {
    let candles = random_walk(60, 13, 100.0);
    let series = PriceSeries::from_candles(&candles);
    let classifier = LorentzianClassifier::new(LorentzianSettings {
        neighbors_count: 3,
        max_bars_back: 50,
        ..LorentzianSettings::default()
    });

    for i in 50..60 {
        let outcome = classifier.scan(&series, i).unwrap();
        assert!(outcome.neighbors.len() <= 3);
        for step in &outcome.trace {
            assert!(step.distance >= step.cutoff);
        }
    }
}

#[test]
fn test_scan_respects_cutoff_with_evictions() {
    let candles = random_walk(400, 17, 100.0);
    let series = PriceSeries::from_candles(&candles);
    let classifier = LorentzianClassifier::new(LorentzianSettings {
        neighbors_count: 4,
        max_bars_back: 200,
        ..LorentzianSettings::default()
    });

    for i in (300..400).step_by(7) {
        let outcome = classifier.scan(&series, i).unwrap();
        assert!(outcome.neighbors.len() <= 4);
        for step in &outcome.trace {
            assert!(step.distance >= step.cutoff);
            assert!(step.index < i && step.index % 4 == 0);
        }
    }
}

#[test]
fn test_reversal_flips_signal() {
    let closes: Vec<f64> = (0..100)
        .map(|i| if i < 50 { 100.0 + i as f64 } else { 149.0 - (i - 49) as f64 })
        .collect();
    let series = PriceSeries::from_candles(&widening(&closes));
    let out = LorentzianClassifier::new(short_lookback()).run(&series);

    let first_long = out.signals.iter().position(|s| *s == Signal::Long);
    let first_short = out.signals.iter().position(|s| *s == Signal::Short);
    let (long_at, short_at) = match (first_long, first_short) {
        (Some(l), Some(s)) => (l, s),
        other => panic!("expected both directions, got {:?}", other),
    };
    assert!(long_at < 50);
    assert!(short_at >= 50 && short_at <= 65, "short at {}", short_at);
}

#[test]
fn test_weighted_consensus_goes_long() {
    let signals = [Signal::Long, Signal::Long, Signal::Short];
    let weights = [0.5, 0.3, 0.2];
    assert!((consensus_score(&signals, &weights) - 0.6).abs() < 1e-12);

    let overlays = OverlayConfig {
        extreme_volatility: false,
        trend_alignment: false,
        momentum: false,
        ..OverlayConfig::default()
    };
    let aggregator = ConsensusAggregator::new(0.15, overlays);
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    let decision = aggregator.decide(&signals, &weights, &[100.0, 101.0], now);
    assert_eq!(decision.signal, Signal::Long);
}

#[test]
fn test_out_of_order_candle_rejected() {
    let candles = random_walk(5, 1, 100.0);
    let mut session = SignalSession::new(EngineConfig::default()).unwrap();
    session.on_candle(candles[1]).unwrap();
    assert!(session.on_candle(candles[0]).is_err());
    assert_eq!(session.signals().len(), 1);
}
