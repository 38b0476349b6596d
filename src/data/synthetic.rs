use crate::domain::Candle;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Hourly bars starting at 2024-01-01T00:00:00Z.
pub const START_MS: i64 = 1_704_067_200_000;
pub const BAR_MS: i64 = 3_600_000;

/// Seeded geometric random walk with ±1% steps and wicks around each body.
pub fn random_walk(bars: usize, seed: u64, start_price: f64) -> Vec<Candle> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut close = start_price;
    let mut candles = Vec::with_capacity(bars);

    for i in 0..bars {
        let open = close;
        close = open * (1.0 + rng.gen_range(-0.01..0.01));
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.004));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.004));
        candles.push(Candle {
            timestamp: START_MS + i as i64 * BAR_MS,
            open,
            high,
            low,
            close,
            volume: rng.gen_range(800.0..1200.0),
        });
    }
    candles
}

/// Candles from a close path, with fixed wicks of `spread` and constant volume.
pub fn from_closes(closes: &[f64], spread: f64) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            timestamp: START_MS + i as i64 * BAR_MS,
            open: if i > 0 { closes[i - 1] } else { close },
            high: close + spread,
            low: close - spread,
            close,
            volume: 1000.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_walk_is_seeded() {
        let a = random_walk(50, 7, 100.0);
        let b = random_walk(50, 7, 100.0);
        let c = random_walk(50, 8, 100.0);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_random_walk_candles_are_consistent() {
        for c in random_walk(200, 3, 100.0) {
            assert!(c.high >= c.open.max(c.close));
            assert!(c.low <= c.open.min(c.close));
            assert!(c.volume > 0.0);
        }
    }

    #[test]
    fn test_timestamps_increase() {
        let candles = random_walk(10, 1, 10.0);
        assert!(candles.windows(2).all(|w| w[1].timestamp > w[0].timestamp));
    }

    #[test]
    fn test_from_closes() {
        let candles = from_closes(&[1.0, 2.0, 3.0], 0.5);
        assert_eq!(candles[1].open, 1.0);
        assert_eq!(candles[2].high, 3.5);
    }
}
