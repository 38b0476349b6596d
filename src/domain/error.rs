use thiserror::Error;

/// Errors raised by the signal engine.
///
/// `InsufficientData` and `NumericDegeneracy` never escape a run: the affected
/// bar is recorded as a neutral signal. `InvalidConfiguration` is raised once,
/// when a session is built.
#[derive(Error, Debug)]
pub enum SignalError {
    #[error("Insufficient data: need at least {required} bars, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Numeric degeneracy: {0}")]
    NumericDegeneracy(&'static str),

    #[error("Candle {index} is out of order: timestamp {current} after {previous}")]
    OutOfOrder {
        index: usize,
        previous: i64,
        current: i64,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SignalError {
    /// Whether a bar hitting this error should degrade to a neutral signal
    /// instead of aborting the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SignalError::InsufficientData { .. } | SignalError::NumericDegeneracy(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SignalError>;
