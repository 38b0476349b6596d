use crate::domain::{Result, SignalError};
use crate::strategy::features::FeatureMatrix;
use std::collections::VecDeque;

/// Bars between a training bar and the close that labels it.
pub const LABEL_HORIZON: usize = 4;

/// Only every `SCAN_STRIDE`-th historical bar is considered as a neighbour.
pub const SCAN_STRIDE: usize = 4;

/// Lorentzian distance: Σ ln(1 + |a_k − b_k|).
///
/// The log compresses large single-feature gaps, so one outlier dimension
/// cannot dominate the way it would under a Euclidean metric.
pub fn lorentzian_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs().ln_1p()).sum()
}

/// Label of training bar `j` as seen from bar `current`.
///
/// `+1` when `close[j + 4] > close[j]`, `-1` otherwise. Returns 0 while the
/// label is still in the future of `current`.
pub fn known_label(closes: &[f64], j: usize, current: usize) -> i32 {
    let target = j + LABEL_HORIZON;
    if target > current || target >= closes.len() {
        return 0;
    }
    if closes[target] > closes[j] {
        1
    } else {
        -1
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub distance: f64,
    pub index: usize,
}

/// One accepted candidate and the cutoff it had to clear.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Acceptance {
    pub index: usize,
    pub distance: f64,
    pub cutoff: f64,
}

/// Bounded FIFO neighbour set with a ratcheting distance cutoff.
///
/// A candidate is accepted when its distance is at least the current cutoff.
/// On overflow the cutoff moves to the distance at rank `floor(k * 3 / 4)`
/// among the members, then the oldest member is evicted. This is an
/// approximation of nearest-neighbour search, not an exact top-k.
#[derive(Debug, Clone)]
pub struct NeighborSet {
    capacity: usize,
    members: VecDeque<Neighbor>,
    last_distance: f64,
}

impl NeighborSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            members: VecDeque::with_capacity(capacity + 1),
            last_distance: -1.0,
        }
    }

    /// Offer a candidate. Returns true when it was accepted.
    pub fn offer(&mut self, distance: f64, index: usize) -> bool {
        if distance.is_nan() || distance < self.last_distance {
            return false;
        }
        self.members.push_back(Neighbor { distance, index });
        if self.members.len() > self.capacity {
            let mut sorted: Vec<f64> = self.members.iter().map(|n| n.distance).collect();
            sorted.sort_by(|a, b| a.total_cmp(b));
            let rank = (self.capacity * 3) / 4;
            if let Some(d) = sorted.get(rank) {
                self.last_distance = *d;
            }
            self.members.pop_front();
        }
        true
    }

    pub fn cutoff(&self) -> f64 {
        self.last_distance
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Neighbor> {
        self.members.iter()
    }
}

/// Result of one neighbour scan.
#[derive(Debug, Clone)]
pub struct KnnOutcome {
    /// Sum of the known labels of the accepted neighbours.
    pub prediction: i32,
    pub neighbors: Vec<Neighbor>,
    pub trace: Vec<Acceptance>,
}

/// Approximate KNN over Lorentzian distance.
#[derive(Debug, Clone, Copy)]
pub struct ApproximateKnn {
    pub neighbors_count: usize,
    pub max_bars_back: usize,
}

impl ApproximateKnn {
    pub fn new(neighbors_count: usize, max_bars_back: usize) -> Self {
        Self {
            neighbors_count,
            max_bars_back,
        }
    }

    /// Scan the history behind bar `i` and sum the neighbours' labels.
    ///
    /// Fails with `InsufficientData` during warm-up and `NumericDegeneracy`
    /// when the current feature row is not finite; callers treat both as a
    /// neutral prediction.
    pub fn predict(&self, features: &FeatureMatrix, closes: &[f64], i: usize) -> Result<KnnOutcome> {
        if i < self.max_bars_back {
            return Err(SignalError::InsufficientData {
                required: self.max_bars_back,
                actual: i,
            });
        }
        if !features.is_valid(i) {
            return Err(SignalError::NumericDegeneracy("non-finite feature row"));
        }

        let current = features.row(i);
        let mut set = NeighborSet::new(self.neighbors_count);
        let mut trace = Vec::new();

        for j in (i - self.max_bars_back)..i {
            if j % SCAN_STRIDE != 0 || !features.is_valid(j) {
                continue;
            }
            let d = lorentzian_distance(current, features.row(j));
            let cutoff = set.cutoff();
            if set.offer(d, j) {
                trace.push(Acceptance {
                    index: j,
                    distance: d,
                    cutoff,
                });
            }
        }

        let prediction = set.iter().map(|n| known_label(closes, n.index, i)).sum();
        Ok(KnnOutcome {
            prediction,
            neighbors: set.iter().copied().collect(),
            trace,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_identity_and_symmetry() {
        let a = [1.0, 2.0, 3.0];
        let b = [2.0, 0.5, 3.5];
        assert_eq!(lorentzian_distance(&a, &a), 0.0);
        assert!((lorentzian_distance(&a, &b) - lorentzian_distance(&b, &a)).abs() < 1e-12);
        assert!(lorentzian_distance(&a, &b) > 0.0);
    }

    #[test]
    fn test_distance_value() {
        let d = lorentzian_distance(&[0.0, 0.0], &[1.0, 3.0]);
        assert!((d - (2.0f64.ln() + 4.0f64.ln())).abs() < 1e-12);
    }

    #[test]
    fn test_known_label_causality() {
        let closes = vec![10.0, 11.0, 9.0, 12.0, 13.0, 8.0];
        assert_eq!(known_label(&closes, 0, 3), 0); // close[4] not seen yet
        assert_eq!(known_label(&closes, 0, 4), 1);
        assert_eq!(known_label(&closes, 1, 5), -1);
        assert_eq!(known_label(&closes, 2, 5), 0); // past the end
    }

    #[test]
    fn test_equal_closes_label_negative() {
        let closes = vec![5.0; 6];
        assert_eq!(known_label(&closes, 0, 5), -1);
    }

    #[test]
    fn test_neighbor_set_bounded() {
        let mut set = NeighborSet::new(3);
        for (k, d) in [0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 3.5].iter().enumerate() {
            set.offer(*d, k);
            assert!(set.len() <= 3);
        }
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_neighbor_set_cutoff_ratchets() {
        let mut set = NeighborSet::new(2);
        assert!(set.offer(1.0, 0));
        assert!(set.offer(2.0, 4));
        assert!(set.offer(3.0, 8));
        // overflow: sorted [1,2,3], rank floor(2*3/4)=1 -> cutoff 2.0, oldest evicted
        assert_eq!(set.cutoff(), 2.0);
        assert_eq!(set.iter().map(|n| n.index).collect::<Vec<_>>(), vec![4, 8]);
        assert!(!set.offer(1.5, 12));
        assert!(set.offer(2.0, 16));
    }

    #[test]
    fn test_nan_distance_rejected() {
        let mut set = NeighborSet::new(2);
        assert!(!set.offer(f64::NAN, 0));
        assert!(set.is_empty());
    }

    #[test]
    fn test_predict_warmup_is_insufficient_data() {
        let knn = ApproximateKnn::new(8, 100);
        let features = FeatureMatrix::default();
        let err = knn.predict(&features, &[], 50).unwrap_err();
        assert!(matches!(err, SignalError::InsufficientData { required: 100, actual: 50 }));
    }
}
