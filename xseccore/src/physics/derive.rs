//! Per-event derived quantities.
//!
//! Every function here is a pure function of one event's raw values and the
//! static metadata of the sample it belongs to.

use serde::{Deserialize, Serialize};

use crate::physics::channel::Channel;

/// Minimum reconstructed-neutrino purity for a recognised signal event.
pub const RECOGNISED_PURITY_MIN: f64 = 0.5;
/// Minimum reconstructed-neutrino completeness for a recognised signal event.
pub const RECOGNISED_COMPLETENESS_MIN: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatasetKind {
    Data,
    Simulation,
    BackgroundEstimate,
}

impl DatasetKind {
    pub fn is_simulation(self) -> bool {
        self == DatasetKind::Simulation
    }

    /// Channel given to every event of a kind without truth information.
    pub fn fallback_channel(self) -> Channel {
        match self {
            DatasetKind::Data => Channel::DataInclusive,
            DatasetKind::BackgroundEstimate => Channel::External,
            DatasetKind::Simulation => Channel::Unknown,
        }
    }
}

/// Exposure bookkeeping of one sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Exposure {
    /// Protons on target of the data the sample is normalised to.
    pub pot_nominal: f64,
    /// Protons on target the simulated sample corresponds to.
    pub pot_equivalent: f64,
    pub trig_nominal: f64,
    pub trig_equivalent: f64,
}

fn ratio_or_one(nominal: f64, equivalent: f64) -> f64 {
    if nominal > 0.0 && equivalent > 0.0 {
        nominal / equivalent
    } else {
        1.0
    }
}

/// Exposure normalisation shared by every event of a sample.
pub fn base_weight(kind: DatasetKind, exposure: &Exposure) -> f64 {
    match kind {
        DatasetKind::Data => 1.0,
        DatasetKind::Simulation => ratio_or_one(exposure.pot_nominal, exposure.pot_equivalent),
        DatasetKind::BackgroundEstimate => ratio_or_one(exposure.trig_nominal, exposure.trig_equivalent),
    }
}

/// Base weight times the generator spline and tune weights, clamped to 0
/// when the product is negative or not finite.
pub fn nominal_weight(base: f64, spline: f64, tune: f64) -> f64 {
    let w = base * spline * tune;
    if !w.is_finite() || w < 0.0 {
        return 0.0;
    }
    w
}

/// Weights that take part in yields and in the training partition.
pub fn is_valid_weight(w: f64) -> bool {
    w.is_finite() && w > 0.0
}

/// Sum of the strange-hadron multiplicities.
pub fn count_strange(multiplicities: &[i64]) -> i64 {
    multiplicities.iter().sum()
}

/// Interaction-mode code: QE, RES, DIS, COH and MEC codes kept, anything
/// else becomes -1.
pub fn scattering_mode(mode: i64) -> i64 {
    match mode {
        0 | 1 | 2 | 3 | 10 => mode,
        _ => -1,
    }
}

pub fn is_recognised_signal(is_signal: bool, purity: f64, completeness: f64) -> bool {
    is_signal && purity > RECOGNISED_PURITY_MIN && completeness > RECOGNISED_COMPLETENESS_MIN
}
