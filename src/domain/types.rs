use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV bar. `timestamp` is the bar open time in milliseconds since epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.timestamp).unwrap_or_default()
    }

    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// Column views over a candle slice, so indicator code can work on plain `&[f64]`.
#[derive(Debug, Clone, Default)]
pub struct PriceSeries {
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl PriceSeries {
    pub fn from_candles(candles: &[Candle]) -> Self {
        let mut s = PriceSeries {
            open: Vec::with_capacity(candles.len()),
            high: Vec::with_capacity(candles.len()),
            low: Vec::with_capacity(candles.len()),
            close: Vec::with_capacity(candles.len()),
            volume: Vec::with_capacity(candles.len()),
        };
        for c in candles {
            s.open.push(c.open);
            s.high.push(c.high);
            s.low.push(c.low);
            s.close.push(c.close);
            s.volume.push(c.volume);
        }
        s
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }
}

/// Discrete trading decision for one bar. The only externally consumed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum Signal {
    Short,
    #[default]
    Neutral,
    Long,
}

impl Signal {
    pub fn as_i8(self) -> i8 {
        match self {
            Signal::Short => -1,
            Signal::Neutral => 0,
            Signal::Long => 1,
        }
    }

    pub fn as_f64(self) -> f64 {
        self.as_i8() as f64
    }

    /// Sign of a raw value. NaN maps to Neutral.
    pub fn from_sign(value: f64) -> Self {
        if value > 0.0 {
            Signal::Long
        } else if value < 0.0 {
            Signal::Short
        } else {
            Signal::Neutral
        }
    }

    /// `> threshold` is Long, `< -threshold` is Short, everything else Neutral.
    pub fn from_threshold(score: f64, threshold: f64) -> Self {
        if score > threshold {
            Signal::Long
        } else if score < -threshold {
            Signal::Short
        } else {
            Signal::Neutral
        }
    }

    pub fn is_directional(self) -> bool {
        self != Signal::Neutral
    }
}

impl From<Signal> for i8 {
    fn from(s: Signal) -> i8 {
        s.as_i8()
    }
}

impl TryFrom<i8> for Signal {
    type Error = String;

    fn try_from(v: i8) -> Result<Self, Self::Error> {
        match v {
            -1 => Ok(Signal::Short),
            0 => Ok(Signal::Neutral),
            1 => Ok(Signal::Long),
            other => Err(format!("signal out of range: {}", other)),
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_i8())
    }
}

/// Market condition governing which ensemble is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegimeLabel {
    Trend,
    Range,
    Volatile,
}

impl RegimeLabel {
    pub const ALL: [RegimeLabel; 3] = [RegimeLabel::Trend, RegimeLabel::Range, RegimeLabel::Volatile];
}

impl std::fmt::Display for RegimeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegimeLabel::Trend => write!(f, "trend"),
            RegimeLabel::Range => write!(f, "range"),
            RegimeLabel::Volatile => write!(f, "volatile"),
        }
    }
}
