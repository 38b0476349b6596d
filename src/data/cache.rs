use crate::domain::{Candle, Result, Signal, SignalError};
use crate::engine::session::BarDiagnostics;
use std::path::Path;

/// Save candles as `timestamp,open,high,low,close,volume`.
pub fn save_candles_csv(candles: &[Candle], path: impl AsRef<Path>) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["timestamp", "open", "high", "low", "close", "volume"])?;
    for c in candles {
        writer.write_record(&[
            c.timestamp.to_string(),
            c.open.to_string(),
            c.high.to_string(),
            c.low.to_string(),
            c.close.to_string(),
            c.volume.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Load candles from a CSV file with a header row. Timestamps must be
/// strictly increasing.
pub fn load_candles_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut candles = Vec::new();
    for record in reader.deserialize() {
        let candle: Candle = record?;
        candles.push(candle);
    }

    for (i, w) in candles.windows(2).enumerate() {
        if w[1].timestamp <= w[0].timestamp {
            return Err(SignalError::OutOfOrder {
                index: i + 1,
                previous: w[0].timestamp,
                current: w[1].timestamp,
            });
        }
    }
    Ok(candles)
}

/// Write one row per bar: signal, regime, score, kernel estimate and weights.
pub fn save_signals_csv(
    candles: &[Candle],
    signals: &[Signal],
    diagnostics: &[BarDiagnostics],
    path: impl AsRef<Path>,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "timestamp",
        "close",
        "signal",
        "regime",
        "score",
        "kernel_estimate",
        "weights",
    ])?;

    for ((c, s), d) in candles.iter().zip(signals).zip(diagnostics) {
        let weights: Vec<String> = d.weights.iter().map(|w| format!("{:.6}", w)).collect();
        writer.write_record(&[
            c.timestamp.to_string(),
            c.close.to_string(),
            s.to_string(),
            d.regime.label.to_string(),
            format!("{:.6}", d.score),
            format!("{:.6}", d.kernel_estimate),
            weights.join(";"),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
