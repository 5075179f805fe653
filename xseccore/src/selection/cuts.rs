//! Thresholds and atomic predicates of the event selection.

use crate::physics::derive::DatasetKind;

pub const TRIGGER_MIN_BEAM_PE: f64 = 0.0;
pub const TRIGGER_MAX_VETO_PE: f64 = 20.0;

pub const SLICE_REQUIRED_COUNT: i64 = 1;
pub const SLICE_MIN_TOPOLOGY_SCORE: f64 = 0.06;

pub const TOPOLOGY_MIN_CONTAINED_FRACTION: f64 = 0.0;
pub const TOPOLOGY_MIN_CLUSTER_FRACTION: f64 = 0.5;

pub const MUON_MIN_TRACK_SCORE: f64 = 0.5;
pub const MUON_MIN_TRACK_LENGTH: f64 = 10.0;
pub const MUON_MAX_TRACK_DISTANCE: f64 = 4.0;
pub const MUON_REQUIRED_GENERATION: f64 = 2.0;

/// Optical and software trigger. Only simulation is gated; data and the
/// background estimate were already triggered online.
pub fn passes_trigger(kind: DatasetKind, pe_beam: f64, pe_veto: f64, software_trigger: i64) -> bool {
    if !kind.is_simulation() {
        return true;
    }
    pe_beam > TRIGGER_MIN_BEAM_PE && pe_veto < TRIGGER_MAX_VETO_PE && software_trigger > 0
}

/// Exactly one neutrino slice with a topological score above threshold.
pub fn passes_slice(num_slices: i64, topological_score: f64) -> bool {
    num_slices == SLICE_REQUIRED_COUNT && topological_score > SLICE_MIN_TOPOLOGY_SCORE
}

pub fn passes_topology(contained_fraction: f64, cluster_fraction: f64) -> bool {
    contained_fraction >= TOPOLOGY_MIN_CONTAINED_FRACTION && cluster_fraction >= TOPOLOGY_MIN_CLUSTER_FRACTION
}

/// At least one primary-daughter track that looks like a muon.
///
/// The four slices are per reconstructed particle and are read up to the
/// shortest of them.
pub fn has_muon_candidate(scores: &[f64], lengths: &[f64], distances: &[f64], generations: &[f64]) -> bool {
    scores
        .iter()
        .zip(lengths)
        .zip(distances)
        .zip(generations)
        .any(|(((score, length), distance), generation)| {
            *score > MUON_MIN_TRACK_SCORE
                && *length > MUON_MIN_TRACK_LENGTH
                && *distance < MUON_MAX_TRACK_DISTANCE
                && *generation == MUON_REQUIRED_GENERATION
        })
}
