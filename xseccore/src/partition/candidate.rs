//! Candidates for the training partition and the collector that gathers
//! them from concurrent sample scans.

use std::sync::Mutex;

use rayon::prelude::*;

use crate::event::key::EventKey;
use crate::event::prng::uniform;
use crate::physics::derive::is_valid_weight;

/// One event competing for a training slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub event_key: EventKey,
    /// `ln(u) / w`; the largest keys form a weighted sample without replacement.
    pub sampling_key: f64,
    pub weight: f64,
}

impl Candidate {
    /// `None` when the weight is not finite and strictly positive.
    pub fn new(event_key: EventKey, weight: f64, seed: u64) -> Option<Candidate> {
        if !is_valid_weight(weight) {
            return None;
        }
        let u = uniform(event_key, seed);
        Some(Candidate { event_key, sampling_key: u.ln() / weight, weight })
    }
}

/// Scanned event: key, signal flag and nominal weight.
pub type ScannedEvent = (EventKey, bool, f64);

/// Candidates of one sample, split by class, in row order.
#[derive(Debug, Clone, Default)]
pub struct CandidateBatch {
    pub signal: Vec<Candidate>,
    pub background: Vec<Candidate>,
}

impl CandidateBatch {
    /// Build candidates in parallel. Row order is kept, events with
    /// invalid weights are dropped.
    pub fn from_events(events: &[ScannedEvent], seed: u64) -> Self {
        let candidates: Vec<Option<(bool, Candidate)>> = events
            .par_iter()
            .map(|(key, is_signal, weight)| Candidate::new(*key, *weight, seed).map(|c| (*is_signal, c)))
            .collect();

        let mut batch = CandidateBatch::default();
        for (is_signal, candidate) in candidates.into_iter().flatten() {
            if is_signal {
                batch.signal.push(candidate);
            } else {
                batch.background.push(candidate);
            }
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.signal.len() + self.background.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Every candidate of one class, in canonical order, with its total weight.
#[derive(Debug, Clone, Default)]
pub struct ClassPool {
    pub candidates: Vec<Candidate>,
    pub total_weight: f64,
}

impl ClassPool {
    fn from_parts(mut parts: Vec<(usize, Vec<Candidate>)>) -> Self {
        parts.sort_by_key(|(order, _)| *order);
        let candidates: Vec<Candidate> = parts.into_iter().flat_map(|(_, c)| c).collect();
        let total_weight = candidates.iter().map(|c| c.weight).sum();
        ClassPool { candidates, total_weight }
    }
}

/// Thread-safe append target shared by the sample scans.
///
/// Scans submit whole batches tagged with their sample's position in the
/// catalog; each class list is behind its own lock and the lock is held only
/// for the push. Pools are rebuilt in catalog order, so the result does not
/// depend on which scan finished first.
#[derive(Debug)]
pub struct CandidateCollector {
    seed: u64,
    signal: Mutex<Vec<(usize, Vec<Candidate>)>>,
    background: Mutex<Vec<(usize, Vec<Candidate>)>>,
}

impl CandidateCollector {
    pub fn new(seed: u64) -> Self {
        CandidateCollector {
            seed,
            signal: Mutex::new(Vec::new()),
            background: Mutex::new(Vec::new()),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn submit(&self, order: usize, batch: CandidateBatch) {
        let CandidateBatch { signal, background } = batch;
        if !signal.is_empty() {
            let mut guard = self.signal.lock().unwrap_or_else(|e| e.into_inner());
            guard.push((order, signal));
        }
        if !background.is_empty() {
            let mut guard = self.background.lock().unwrap_or_else(|e| e.into_inner());
            guard.push((order, background));
        }
    }

    /// Consume the collector into (signal, background) pools.
    pub fn into_pools(self) -> (ClassPool, ClassPool) {
        let signal = self.signal.into_inner().unwrap_or_else(|e| e.into_inner());
        let background = self.background.into_inner().unwrap_or_else(|e| e.into_inner());
        (ClassPool::from_parts(signal), ClassPool::from_parts(background))
    }
}
