//! Per-node trust scores

use dashmap::DashMap;
use qltr_common::{NodeId, QltrError, QltrResult};
use tracing::debug;

/// Exponential moving average of observed success rates, per node
///
/// Unseen nodes are fully trusted. Scores stay in `[0, 1]` because every
/// update mixes the previous score with a success rate that is itself
/// checked to lie in `[0, 1]`.
#[derive(Debug, Default)]
pub struct TrustModel {
    scores: DashMap<NodeId, f64>,
}

impl TrustModel {
    /// Weight of the previous score
    pub const SMOOTHING: f64 = 0.9;
    /// Weight of the new observation
    pub const OBSERVATION_WEIGHT: f64 = 0.1;
    /// Score of a node never rated
    pub const DEFAULT_TRUST: f64 = 1.0;

    /// Create empty model
    pub fn new() -> Self {
        Self::default()
    }

    /// Current trust in `node`
    pub fn get(&self, node: NodeId) -> f64 {
        self.scores
            .get(&node)
            .map(|s| *s)
            .unwrap_or(Self::DEFAULT_TRUST)
    }

    /// Fold an observed success rate into the node's score, returning the new score
    pub fn update(&self, node: NodeId, success_rate: f64) -> QltrResult<f64> {
        if !(0.0..=1.0).contains(&success_rate) {
            return Err(QltrError::InvalidFeedback(format!(
                "success rate {} outside [0, 1]",
                success_rate
            )));
        }

        let mut score = self.scores.entry(node).or_insert(Self::DEFAULT_TRUST);
        let prev = *score;
        *score = Self::SMOOTHING * prev + Self::OBSERVATION_WEIGHT * success_rate;
        let updated = *score;
        drop(score);

        debug!(node = %node, prev, updated, "Trust updated");
        Ok(updated)
    }

    /// Whether `node` scores at least `min_trust`
    pub fn is_trusted(&self, node: NodeId, min_trust: f64) -> bool {
        self.get(node) >= min_trust
    }

    /// All rated nodes, sorted by id
    pub fn snapshot(&self) -> Vec<(NodeId, f64)> {
        let mut all: Vec<_> = self.scores.iter().map(|e| (*e.key(), *e.value())).collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_trust() {
        let model = TrustModel::new();
        assert_eq!(model.get(NodeId(42)), 1.0);
        assert!(model.snapshot().is_empty());
    }

    #[test]
    fn test_update_is_ema() {
        let model = TrustModel::new();
        let first = model.update(NodeId(1), 0.0).unwrap();
        assert_eq!(first, 0.9 * 1.0 + 0.1 * 0.0);

        let prev = model.get(NodeId(1));
        let second = model.update(NodeId(1), 0.5).unwrap();
        assert_eq!(second, 0.9 * prev + 0.1 * 0.5);
        assert_eq!(model.get(NodeId(1)), second);
    }

    #[test]
    fn test_update_rejects_out_of_range() {
        let model = TrustModel::new();
        assert!(model.update(NodeId(1), 1.5).is_err());
        assert!(model.update(NodeId(1), -0.1).is_err());
        assert!(model.update(NodeId(1), f64::NAN).is_err());
        assert_eq!(model.get(NodeId(1)), 1.0);
    }

    #[test]
    fn test_is_trusted() {
        let model = TrustModel::new();
        for _ in 0..20 {
            model.update(NodeId(1), 0.0).unwrap();
        }
        assert!(!model.is_trusted(NodeId(1), 0.5));
        assert!(model.is_trusted(NodeId(2), 0.5));
        assert!(model.is_trusted(NodeId(1), 0.0));
    }

    proptest! {
        #[test]
        fn prop_trust_stays_in_unit_interval(rates in proptest::collection::vec(0.0f64..=1.0, 1..50)) {
            let model = TrustModel::new();
            for rate in rates {
                let score = model.update(NodeId(1), rate).unwrap();
                prop_assert!(score.is_finite());
                prop_assert!((0.0..=1.0).contains(&score));
            }
        }
    }
}
