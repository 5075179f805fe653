use std::cmp::Ordering;
use std::collections::HashSet;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::event::key::EventKey;
use crate::event::prng::DEFAULT_SEED;
use crate::partition::candidate::{Candidate, CandidateCollector, ClassPool};
use crate::physics::derive::is_valid_weight;

pub const DEFAULT_SIGNAL_QUOTA: usize = 50_000;
pub const DEFAULT_BACKGROUND_QUOTA: usize = 50_000;

/// Sizes of the training sets and the seed of the sampling variates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    pub signal_quota: usize,
    pub background_quota: usize,
    pub seed: u64,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        PartitionConfig {
            signal_quota: DEFAULT_SIGNAL_QUOTA,
            background_quota: DEFAULT_BACKGROUND_QUOTA,
            seed: DEFAULT_SEED,
        }
    }
}

/// Rank order of candidates: larger sampling key first. Exact ties are
/// broken by event key, then by weight, so the order is total and the
/// selected set does not depend on scan order.
fn rank_order(a: &Candidate, b: &Candidate) -> Ordering {
    OrderedFloat(b.sampling_key)
        .cmp(&OrderedFloat(a.sampling_key))
        .then_with(|| a.event_key.cmp(&b.event_key))
        .then_with(|| OrderedFloat(b.weight).cmp(&OrderedFloat(a.weight)))
}

/// Pick the `n` best-ranked candidates.
///
/// Uses a partial order statistic around the n-th candidate; only the
/// selected head is sorted, to fix the summation order of its weight.
/// Returns the distinct selected keys and their summed weight.
///
/// Event keys must be unique across the corpus: a repeated key is kept
/// once and its weight counted once, yet every row carrying it is marked
/// as training.
pub fn select_top(candidates: &mut [Candidate], n: usize) -> (HashSet<EventKey>, f64) {
    if candidates.is_empty() || n == 0 {
        return (HashSet::new(), 0.0);
    }

    let head = if candidates.len() > n {
        candidates.select_nth_unstable_by(n - 1, rank_order);
        &mut candidates[..n]
    } else {
        &mut candidates[..]
    };
    head.sort_unstable_by(rank_order);

    let mut ids = HashSet::with_capacity(head.len());
    let mut weight = 0.0;
    let mut duplicates = 0usize;
    for c in head.iter() {
        if ids.insert(c.event_key) {
            weight += c.weight;
        } else {
            duplicates += 1;
        }
    }
    if duplicates > 0 {
        debug!(duplicates, "repeated event keys among selected candidates dropped");
    }
    (ids, weight)
}

/// Training set of one class and the factor that restores the class yield
/// on the remaining events.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassPartition {
    pub training_ids: HashSet<EventKey>,
    pub candidates: usize,
    pub total_weight: f64,
    pub training_weight: f64,
    pub rescale: f64,
}

impl Default for ClassPartition {
    fn default() -> Self {
        ClassPartition {
            training_ids: HashSet::new(),
            candidates: 0,
            total_weight: 0.0,
            training_weight: 0.0,
            rescale: 1.0,
        }
    }
}

impl ClassPartition {
    pub fn from_pool(pool: ClassPool, quota: usize) -> Self {
        let ClassPool { mut candidates, total_weight } = pool;
        let n_candidates = candidates.len();
        let (training_ids, mut training_weight) = select_top(&mut candidates, quota);

        // every candidate taken: the analysis share is exactly empty
        if n_candidates > 0 && quota >= n_candidates && training_ids.len() == n_candidates {
            training_weight = total_weight;
        }

        let analysis_weight = total_weight - training_weight;
        let rescale = if analysis_weight > 0.0 { total_weight / analysis_weight } else { 1.0 };

        ClassPartition {
            training_ids,
            candidates: n_candidates,
            total_weight,
            training_weight,
            rescale,
        }
    }

    pub fn contains(&self, key: &EventKey) -> bool {
        self.training_ids.contains(key)
    }

    pub fn training_count(&self) -> usize {
        self.training_ids.len()
    }
}

/// Corpus-wide split of simulated events into training and analysis sets.
///
/// Built once from a filled [`CandidateCollector`] and never modified.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingPartition {
    pub signal: ClassPartition,
    pub background: ClassPartition,
    pub config: PartitionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSummary {
    pub candidates: usize,
    pub training: usize,
    pub total_weight: f64,
    pub training_weight: f64,
    pub rescale: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionSummary {
    pub seed: u64,
    pub signal: ClassSummary,
    pub background: ClassSummary,
}

impl TrainingPartition {
    pub fn build(collector: CandidateCollector, config: &PartitionConfig) -> Self {
        if collector.seed() != config.seed {
            warn!(
                collector_seed = collector.seed(),
                config_seed = config.seed,
                "candidate collector seed differs from partition config"
            );
        }
        let (signal_pool, background_pool) = collector.into_pools();

        for (class, pool, quota) in [
            ("signal", &signal_pool, config.signal_quota),
            ("background", &background_pool, config.background_quota),
        ] {
            if quota > pool.candidates.len() {
                warn!(class, quota, candidates = pool.candidates.len(), "training quota exceeds candidate pool");
            }
        }

        let partition = TrainingPartition {
            signal: ClassPartition::from_pool(signal_pool, config.signal_quota),
            background: ClassPartition::from_pool(background_pool, config.background_quota),
            config: *config,
        };

        let summary = partition.summary();
        info!(
            signal_candidates = summary.signal.candidates,
            signal_training = summary.signal.training,
            signal_rescale = summary.signal.rescale,
            background_candidates = summary.background.candidates,
            background_training = summary.background.training,
            background_rescale = summary.background.rescale,
            "built training partition"
        );
        partition
    }

    /// Partition with no training events; every rescale factor is 1.
    pub fn empty(config: &PartitionConfig) -> Self {
        TrainingPartition {
            signal: ClassPartition::default(),
            background: ClassPartition::default(),
            config: *config,
        }
    }

    pub fn class(&self, is_signal: bool) -> &ClassPartition {
        if is_signal {
            &self.signal
        } else {
            &self.background
        }
    }

    /// Membership in the training set of the event's own class.
    pub fn is_training(&self, key: &EventKey, is_signal: bool) -> bool {
        self.class(is_signal).contains(key)
    }

    /// Weight an event carries in the analysis: zero for training events
    /// and invalid weights, otherwise the nominal weight times the class
    /// rescale factor.
    pub fn analysis_weight(&self, w_nominal: f64, is_signal: bool, is_training: bool) -> f64 {
        if !is_valid_weight(w_nominal) || is_training {
            return 0.0;
        }
        let w = w_nominal * self.class(is_signal).rescale;
        if !is_valid_weight(w) {
            return 0.0;
        }
        w
    }

    pub fn summary(&self) -> PartitionSummary {
        let class = |c: &ClassPartition| ClassSummary {
            candidates: c.candidates,
            training: c.training_count(),
            total_weight: c.total_weight,
            training_weight: c.training_weight,
            rescale: c.rescale,
        };
        PartitionSummary {
            seed: self.config.seed,
            signal: class(&self.signal),
            background: class(&self.background),
        }
    }
}
