pub mod backtest;
pub mod config;
pub mod data;
pub mod domain;
pub mod engine;
pub mod evaluation;
pub mod strategy;

pub use config::EngineConfig;
pub use domain::{Candle, RegimeLabel, Signal, SignalError};
pub use engine::session::{BarDiagnostics, SessionReport, SignalSession};
