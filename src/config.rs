use crate::domain::{RegimeLabel, Result, SignalError};
use crate::strategy::ensemble::Indicator;
use crate::strategy::features::FeatureSpec;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level engine configuration. Every field falls back to its default
/// when missing from a JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub lorentzian: LorentzianSettings,
    pub regime: RegimeConfig,
    pub ensemble: EnsembleConfig,
    pub overlays: OverlayConfig,
}

impl EngineConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.lorentzian.validate()?;
        self.regime.validate()?;
        self.ensemble.validate()?;
        self.overlays.validate()?;
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> SignalError {
    SignalError::InvalidConfiguration(msg.into())
}

// ── Lorentzian classifier ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LorentzianSettings {
    /// Maximum size of the neighbour set.
    pub neighbors_count: usize,
    /// How far back the neighbour scan reaches; also the warm-up length.
    pub max_bars_back: usize,
    /// Number of leading `features` used as distance dimensions.
    pub feature_count: usize,
    pub features: Vec<FeatureSpec>,
    pub kernel: KernelSettings,
    pub filters: FilterSettings,
    pub use_dynamic_exits: bool,
}

impl Default for LorentzianSettings {
    fn default() -> Self {
        Self {
            neighbors_count: 8,
            max_bars_back: 2000,
            feature_count: 5,
            features: FeatureSpec::defaults(),
            kernel: KernelSettings::default(),
            filters: FilterSettings::default(),
            use_dynamic_exits: false,
        }
    }
}

impl LorentzianSettings {
    pub fn validate(&self) -> Result<()> {
        if self.neighbors_count == 0 {
            return Err(invalid("neighbors_count must be > 0"));
        }
        if self.max_bars_back == 0 {
            return Err(invalid("max_bars_back must be > 0"));
        }
        if !(1..=5).contains(&self.feature_count) {
            return Err(invalid(format!(
                "feature_count must be in 1..=5, got {}",
                self.feature_count
            )));
        }
        if self.feature_count > self.features.len() {
            return Err(invalid(format!(
                "feature_count {} exceeds the {} configured features",
                self.feature_count,
                self.features.len()
            )));
        }
        for feature in &self.features[..self.feature_count] {
            if feature.param_a == 0 {
                return Err(invalid(format!("{} period must be > 0", feature.kind)));
            }
        }
        self.kernel.validate()?;
        self.filters.validate()
    }
}

/// Nadaraya-Watson kernel parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelSettings {
    /// Lookback window `h`.
    pub lookback: usize,
    /// Rational-quadratic relative weight `r`.
    pub relative_weight: f64,
    /// Regression level `X`.
    pub regression_level: f64,
    /// Gaussian window shortening.
    pub lag: usize,
    /// Require the Gaussian estimate to agree with the rational-quadratic one.
    pub use_kernel_smoothing: bool,
}

impl Default for KernelSettings {
    fn default() -> Self {
        Self {
            lookback: 8,
            relative_weight: 8.0,
            regression_level: 25.0,
            lag: 2,
            use_kernel_smoothing: false,
        }
    }
}

impl KernelSettings {
    pub fn validate(&self) -> Result<()> {
        if self.lookback == 0 {
            return Err(invalid("kernel lookback must be > 0"));
        }
        if !(self.relative_weight.is_finite() && self.relative_weight > 0.0) {
            return Err(invalid("kernel relative_weight must be finite and > 0"));
        }
        if !(self.regression_level.is_finite() && self.regression_level > 0.0) {
            return Err(invalid("kernel regression_level must be finite and > 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub use_volatility_filter: bool,
    pub use_regime_filter: bool,
    pub regime_threshold: f64,
    pub use_adx_filter: bool,
    pub adx_threshold: f64,
    pub use_ema_filter: bool,
    pub ema_period: usize,
    pub use_sma_filter: bool,
    pub sma_period: usize,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            use_volatility_filter: true,
            use_regime_filter: false,
            regime_threshold: -0.1,
            use_adx_filter: false,
            adx_threshold: 20.0,
            use_ema_filter: false,
            ema_period: 200,
            use_sma_filter: false,
            sma_period: 200,
        }
    }
}

impl FilterSettings {
    pub fn validate(&self) -> Result<()> {
        if self.use_ema_filter && self.ema_period == 0 {
            return Err(invalid("ema_period must be > 0"));
        }
        if self.use_sma_filter && self.sma_period == 0 {
            return Err(invalid("sma_period must be > 0"));
        }
        if !self.regime_threshold.is_finite() || !self.adx_threshold.is_finite() {
            return Err(invalid("filter thresholds must be finite"));
        }
        Ok(())
    }
}

// ── Regime detection ──

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    pub regime_window: usize,
    pub trend_threshold: f64,
    /// Bollinger bandwidth above which the market is volatile.
    pub volatility_threshold: f64,
    /// Current volume above this multiple of the window mean is volatile.
    pub volume_spike_multiplier: f64,
    pub bb_period: usize,
    pub bb_std: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            regime_window: 15,
            trend_threshold: 0.45,
            volatility_threshold: 0.06,
            volume_spike_multiplier: 2.0,
            bb_period: 20,
            bb_std: 2.0,
        }
    }
}

impl RegimeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.regime_window < 2 {
            return Err(invalid("regime_window must be >= 2"));
        }
        if self.bb_period < 2 {
            return Err(invalid("bb_period must be >= 2"));
        }
        Ok(())
    }
}

// ── Ensembles and consensus ──

/// One ensemble slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightedMember {
    pub indicator: Indicator,
    pub weight: f64,
}

impl WeightedMember {
    pub fn new(indicator: Indicator, weight: f64) -> Self {
        Self { indicator, weight }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub trend: Vec<WeightedMember>,
    pub range: Vec<WeightedMember>,
    pub volatile: Vec<WeightedMember>,
    pub adaptive_weights: bool,
    pub consensus_threshold: f64,
    /// Bars a repeated RSI/Supertrend/MACD signal survives before it is dropped.
    pub holding_period: usize,
    /// Trailing bars used to re-evaluate members in the adaptive pass.
    pub adaptive_window: usize,
    /// Minimum history before the adaptive pass runs.
    pub min_adaptive_bars: usize,
    pub reward_factor: f64,
    pub penalty_factor: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        let mut volatile_lorentzian = LorentzianSettings::default();
        volatile_lorentzian.filters.use_adx_filter = true;
        volatile_lorentzian.filters.adx_threshold = 30.0;

        Self {
            trend: vec![
                WeightedMember::new(Indicator::supertrend(10, 2.5), 0.5),
                WeightedMember::new(Indicator::lorentzian(LorentzianSettings::default()), 0.3),
                WeightedMember::new(Indicator::macd(10, 21, 9), 0.2),
            ],
            range: vec![
                WeightedMember::new(Indicator::rsi(14, 68.0, 32.0), 0.5),
                WeightedMember::new(Indicator::knn(12, 26), 0.3),
                WeightedMember::new(Indicator::supertrend(14, 3.0), 0.2),
            ],
            volatile: vec![
                WeightedMember::new(Indicator::supertrend(8, 2.0), 0.4),
                WeightedMember::new(Indicator::rsi(10, 75.0, 25.0), 0.4),
                WeightedMember::new(Indicator::lorentzian(volatile_lorentzian), 0.2),
            ],
            adaptive_weights: true,
            consensus_threshold: 0.15,
            holding_period: 5,
            adaptive_window: 30,
            min_adaptive_bars: 20,
            reward_factor: 1.10,
            penalty_factor: 0.95,
        }
    }
}

impl EnsembleConfig {
    pub fn members(&self, regime: RegimeLabel) -> &[WeightedMember] {
        match regime {
            RegimeLabel::Trend => &self.trend,
            RegimeLabel::Range => &self.range,
            RegimeLabel::Volatile => &self.volatile,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for regime in RegimeLabel::ALL {
            let members = self.members(regime);
            if members.is_empty() {
                return Err(invalid(format!("{} ensemble is empty", regime)));
            }
            for m in members {
                if !(m.weight.is_finite() && m.weight > 0.0) {
                    return Err(invalid(format!(
                        "{} ensemble weight must be finite and > 0, got {}",
                        regime, m.weight
                    )));
                }
                m.indicator.validate()?;
            }
        }
        if !(self.consensus_threshold.is_finite() && self.consensus_threshold >= 0.0) {
            return Err(invalid("consensus_threshold must be finite and >= 0"));
        }
        if self.adaptive_window < 2 {
            return Err(invalid("adaptive_window must be >= 2"));
        }
        if !(self.reward_factor.is_finite() && self.reward_factor > 0.0)
            || !(self.penalty_factor.is_finite() && self.penalty_factor > 0.0)
        {
            return Err(invalid("reward and penalty factors must be finite and > 0"));
        }
        Ok(())
    }
}

// ── Overlays ──

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub extreme_volatility: bool,
    pub volatility_window: usize,
    pub extreme_volatility_threshold: f64,
    pub trend_alignment: bool,
    pub momentum: bool,
    pub momentum_threshold: f64,
    pub time_derisk: bool,
    pub derisk_after_hour: u32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            extreme_volatility: true,
            volatility_window: 10,
            extreme_volatility_threshold: 0.05,
            trend_alignment: true,
            momentum: true,
            momentum_threshold: 0.1,
            time_derisk: false,
            derisk_after_hour: 12,
        }
    }
}

impl OverlayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.derisk_after_hour >= 24 {
            return Err(invalid("derisk_after_hour must be < 24"));
        }
        if self.volatility_window < 2 {
            return Err(invalid("volatility_window must be >= 2"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_default_ensembles() {
        let e = EnsembleConfig::default();
        let weights: Vec<f64> = e.trend.iter().map(|m| m.weight).collect();
        assert_eq!(weights, vec![0.5, 0.3, 0.2]);
        assert_eq!(e.range.len(), 3);
        assert_eq!(e.volatile.len(), 3);
        assert!(matches!(e.range[1].indicator, Indicator::Knn { .. }));
    }

    #[test]
    fn test_zero_neighbors_rejected() {
        let mut c = EngineConfig::default();
        c.lorentzian.neighbors_count = 0;
        assert!(matches!(c.validate(), Err(SignalError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_feature_count_bounds() {
        let mut c = EngineConfig::default();
        c.lorentzian.feature_count = 6;
        assert!(c.validate().is_err());
        c.lorentzian.feature_count = 0;
        assert!(c.validate().is_err());
        c.lorentzian.feature_count = 2;
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_feature_count_exceeding_features_rejected() {
        let mut c = EngineConfig::default();
        c.lorentzian.features.truncate(2);
        c.lorentzian.feature_count = 3;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_empty_ensemble_rejected() {
        let mut c = EngineConfig::default();
        c.ensemble.volatile.clear();
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_non_positive_weight_rejected() {
        let mut c = EngineConfig::default();
        c.ensemble.trend[0].weight = 0.0;
        assert!(c.validate().is_err());
        c.ensemble.trend[0].weight = f64::NAN;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let mut c = EngineConfig::default();
        c.ensemble.consensus_threshold = -0.1;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_kernel_params_rejected() {
        let mut c = EngineConfig::default();
        c.lorentzian.kernel.relative_weight = 0.0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "lorentzian": { "neighbors_count": 4 }, "overlays": { "time_derisk": true } }"#;
        let c: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(c.lorentzian.neighbors_count, 4);
        assert_eq!(c.lorentzian.max_bars_back, 2000);
        assert!(c.overlays.time_derisk);
        assert_eq!(c.ensemble.trend.len(), 3);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_config_json_roundtrip_through_file() {
        let path = std::env::temp_dir().join("lorentz_config_test.json");
        let mut c = EngineConfig::default();
        c.regime.regime_window = 21;
        std::fs::write(&path, serde_json::to_string_pretty(&c).unwrap()).unwrap();
        let loaded = EngineConfig::from_json_file(&path).unwrap();
        assert_eq!(loaded.regime.regime_window, 21);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = EngineConfig::from_json_file("/nonexistent/lorentz.json").unwrap_err();
        assert!(matches!(err, SignalError::Io(_)));
    }
}
