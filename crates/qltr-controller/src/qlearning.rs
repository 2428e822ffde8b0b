//! Q-learning path selection
//!
//! Q-values are keyed `(source switch, destination switch)`. Host
//! destinations are mapped to their attachment switch before they reach the
//! router, so every key is a [`NodeId`].

use crate::config::{validate_epsilon, LearningConfig};
use parking_lot::Mutex;
use qltr_common::{NodeId, Path, QltrError, QltrResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};
use std::collections::HashMap;
use tracing::debug;

/// Upper bound on random intermediate hops when exploring
pub const MAX_EXPLORATION_HOPS: usize = 3;

type QTable = HashMap<NodeId, HashMap<NodeId, f64>>;

struct RouterState {
    table: QTable,
    rng: Box<dyn RngCore + Send>,
    epsilon: f64,
}

/// How a path was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Random intermediate hops
    Exploration,
    /// Best-known hops
    Exploitation,
}

/// Epsilon-greedy path selector over a Q-table
///
/// Table and random source share one lock, so a whole `select_path` or
/// `update_q` call is atomic with respect to other callers.
pub struct QLearningRouter {
    state: Mutex<RouterState>,
    alpha: f64,
    gamma: f64,
}

impl QLearningRouter {
    /// Create router drawing randomness from OS entropy
    pub fn new(params: LearningConfig) -> QltrResult<Self> {
        Self::with_rng(params, StdRng::from_entropy())
    }

    /// Create router with an explicit random source
    pub fn with_rng(params: LearningConfig, rng: impl RngCore + Send + 'static) -> QltrResult<Self> {
        params.validate()?;
        Ok(Self {
            state: Mutex::new(RouterState {
                table: HashMap::new(),
                rng: Box::new(rng),
                epsilon: params.epsilon,
            }),
            alpha: params.alpha,
            gamma: params.gamma,
        })
    }

    /// Current parameters
    pub fn params(&self) -> LearningConfig {
        LearningConfig {
            alpha: self.alpha,
            gamma: self.gamma,
            epsilon: self.state.lock().epsilon,
        }
    }

    /// Exploration rate
    pub fn epsilon(&self) -> f64 {
        self.state.lock().epsilon
    }

    /// Change the exploration rate
    pub fn set_epsilon(&self, epsilon: f64) -> QltrResult<()> {
        validate_epsilon(epsilon)?;
        self.state.lock().epsilon = epsilon;
        Ok(())
    }

    /// Choose a path from `src` to `dst`
    ///
    /// `live` holds the candidate intermediate switches for exploration.
    pub fn select_path(&self, src: NodeId, dst: NodeId, live: &[NodeId]) -> Path {
        self.select_path_with(src, dst, live).0
    }

    /// Like [`select_path`](Self::select_path), also reporting how the path was chosen
    pub fn select_path_with(&self, src: NodeId, dst: NodeId, live: &[NodeId]) -> (Path, Selection) {
        let mut guard = self.state.lock();
        let RouterState { table, rng, epsilon } = &mut *guard;

        table
            .entry(src)
            .or_default()
            .entry(dst)
            .or_insert_with(|| rng.gen::<f64>());

        let u: f64 = rng.gen();
        let (path, selection) = if u < *epsilon {
            (Self::explore(rng.as_mut(), src, dst, live), Selection::Exploration)
        } else {
            (Self::exploit(table, src, dst), Selection::Exploitation)
        };

        debug!(src = %src, dst = %dst, ?selection, path = %path, "Path selected");
        (path, selection)
    }

    fn explore(rng: &mut (dyn RngCore + Send), src: NodeId, dst: NodeId, live: &[NodeId]) -> Path {
        if live.is_empty() {
            return Path::direct(src, dst);
        }

        let k = rng.gen_range(1..=live.len().min(MAX_EXPLORATION_HOPS));
        let via: Vec<NodeId> = live.choose_multiple(rng, k).copied().collect();

        // not checked against real adjacency
        Path::through(src, via, dst)
    }

    /// Every key tied for the best value becomes an intermediate hop, in id
    /// order. This mirrors the historical behaviour and is not a standard
    /// path construction; revisit once an adjacency service exists.
    fn exploit(table: &QTable, src: NodeId, dst: NodeId) -> Path {
        let candidates: Vec<(NodeId, f64)> = table
            .get(&src)
            .map(|row| {
                row.iter()
                    .filter(|(key, _)| **key != src && **key != dst)
                    .map(|(key, value)| (*key, *value))
                    .collect()
            })
            .unwrap_or_default();

        let best = match candidates.iter().map(|(_, v)| *v).reduce(f64::max) {
            Some(best) => best,
            None => return Path::direct(src, dst),
        };

        let mut tied: Vec<NodeId> = candidates
            .into_iter()
            .filter(|(_, v)| *v == best)
            .map(|(k, _)| k)
            .collect();
        tied.sort();

        Path::through(src, tied, dst)
    }

    /// One-step Q-learning update from an observed reward, returning the new value
    pub fn update_q(&self, src: NodeId, dst: NodeId, reward: f64) -> QltrResult<f64> {
        if !reward.is_finite() {
            return Err(QltrError::InvalidFeedback(format!("reward {} is not finite", reward)));
        }

        let mut guard = self.state.lock();
        let table = &mut guard.table;

        let best_next = table
            .get(&dst)
            .and_then(|row| row.values().copied().reduce(f64::max))
            .unwrap_or(0.0);
        let old = table.get(&src).and_then(|row| row.get(&dst)).copied().unwrap_or(0.0);
        let updated = old + self.alpha * (reward + self.gamma * best_next - old);

        if !updated.is_finite() {
            return Err(QltrError::InvalidFeedback(format!(
                "reward {} drives Q({}, {}) out of range",
                reward, src, dst
            )));
        }

        table.entry(src).or_default().insert(dst, updated);
        drop(guard);

        debug!(src = %src, dst = %dst, reward, old, updated, "Q-value updated");
        Ok(updated)
    }

    /// Stored Q-value, if any
    pub fn q_value(&self, src: NodeId, dst: NodeId) -> Option<f64> {
        self.state.lock().table.get(&src).and_then(|row| row.get(&dst)).copied()
    }

    /// Overwrite a Q-value
    pub fn set_q(&self, src: NodeId, dst: NodeId, value: f64) -> QltrResult<()> {
        if !value.is_finite() {
            return Err(QltrError::InvalidFeedback(format!("Q-value {} is not finite", value)));
        }
        self.state.lock().table.entry(src).or_default().insert(dst, value);
        Ok(())
    }

    /// Number of stored Q-values
    pub fn len(&self) -> usize {
        self.state.lock().table.values().map(|row| row.len()).sum()
    }

    /// No Q-value stored yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for QLearningRouter {
    fn default() -> Self {
        Self {
            state: Mutex::new(RouterState {
                table: HashMap::new(),
                rng: Box::new(StdRng::from_entropy()),
                epsilon: LearningConfig::default().epsilon,
            }),
            alpha: LearningConfig::default().alpha,
            gamma: LearningConfig::default().gamma,
        }
    }
}
