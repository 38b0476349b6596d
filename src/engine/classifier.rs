use crate::config::LorentzianSettings;
use crate::domain::{PriceSeries, Result, Signal};
use crate::engine::exits::DynamicExitManager;
use crate::engine::filters::{FilterChain, FilterInputs};
use crate::engine::kernel::KernelEstimates;
use crate::engine::lorentzian::{ApproximateKnn, KnnOutcome};
use crate::strategy::features::FeatureMatrix;
use tracing::{trace, warn};

/// Every intermediate series of one classifier pass.
#[derive(Debug, Clone, Default)]
pub struct ClassifierOutput {
    pub predictions: Vec<i32>,
    /// sign(prediction) before any gate.
    pub raw_signals: Vec<Signal>,
    /// After the filter chain, before exits.
    pub filtered: Vec<Signal>,
    pub signals: Vec<Signal>,
    pub kernels: KernelEstimates,
    pub features: FeatureMatrix,
}

/// Lorentzian KNN classifier with kernel filtering and dynamic exits.
#[derive(Debug, Clone)]
pub struct LorentzianClassifier {
    settings: LorentzianSettings,
    knn: ApproximateKnn,
    chain: FilterChain,
}

impl LorentzianClassifier {
    pub fn new(settings: LorentzianSettings) -> Self {
        let knn = ApproximateKnn::new(settings.neighbors_count, settings.max_bars_back);
        let chain = FilterChain::from_settings(&settings);
        Self {
            settings,
            knn,
            chain,
        }
    }

    pub fn settings(&self) -> &LorentzianSettings {
        &self.settings
    }

    pub fn features(&self, series: &PriceSeries) -> FeatureMatrix {
        FeatureMatrix::build(series, &self.settings.features, self.settings.feature_count)
    }

    /// Neighbour scan for a single bar, with its acceptance trace.
    pub fn scan(&self, series: &PriceSeries, i: usize) -> Result<KnnOutcome> {
        let features = self.features(series);
        self.knn.predict(&features, &series.close, i)
    }

    pub fn run(&self, series: &PriceSeries) -> ClassifierOutput {
        let n = series.len();
        let features = self.features(series);
        let kernels = KernelEstimates::compute(&series.close, &self.settings.kernel);
        let inputs = FilterInputs::compute(series, &self.settings);

        trace!(bars = n, first_valid = ?features.first_valid(), "classifier pass");

        let predictions: Vec<i32> = (0..n)
            .map(|i| match self.knn.predict(&features, &series.close, i) {
                Ok(outcome) => outcome.prediction,
                Err(e) if e.is_recoverable() => {
                    trace!(bar = i, error = %e, "prediction recovered as 0");
                    0
                }
                Err(e) => {
                    warn!(bar = i, error = %e, "prediction failed, emitting 0");
                    0
                }
            })
            .collect();

        let raw_signals: Vec<Signal> = predictions.iter().map(|p| Signal::from_sign(*p as f64)).collect();
        let filtered: Vec<Signal> = raw_signals
            .iter()
            .enumerate()
            .map(|(i, s)| self.chain.apply(*s, i, &inputs, &kernels))
            .collect();

        let signals = if self.settings.use_dynamic_exits {
            DynamicExitManager::apply(&filtered, &kernels)
        } else {
            filtered.clone()
        };

        ClassifierOutput {
            predictions,
            raw_signals,
            filtered,
            signals,
            kernels,
            features,
        }
    }
}
