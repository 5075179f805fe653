//! Derived per-event columns attached to every sample frame.

use std::sync::Arc;

use itertools::Itertools;
use tracing::debug;
use xseccore::physics::channel::{classify, Channel, TruthSummary};
use xseccore::physics::derive::{
    base_weight, count_strange, is_recognised_signal, nominal_weight, scattering_mode, DatasetKind, Exposure,
};
use xseccore::physics::fiducial::{DetectorFiducial, FiducialVolume};

use crate::data::frame::LazyFrame;
use crate::error::{Error, Result};
use crate::hub::entry::Slice;

pub const STRANGE_SPECIES: [&str; 7] =
    ["n_K_plus", "n_K_minus", "n_K0", "n_lambda", "n_sigma_plus", "n_sigma0", "n_sigma_minus"];

const TRUE_VERTEX: [&str; 3] = ["nu_vtx_x", "nu_vtx_y", "nu_vtx_z"];
const RECO_VERTEX: [&str; 3] =
    ["reco_neutrino_vertex_sce_x", "reco_neutrino_vertex_sce_y", "reco_neutrino_vertex_sce_z"];
const GENERATOR_WEIGHTS: [&str; 2] = ["weightSpline", "weightTune"];
const TRUTH_CHANNEL_INPUTS: [&str; 6] = ["nu_pdg", "int_ccnc", "n_p", "n_pi_minus", "n_pi_plus", "n_pi0"];
const PHOTON_COUNT: &str = "n_gamma";
const RECO_QUALITY: [&str; 2] = ["neutrino_purity_from_pfp", "neutrino_completeness_from_pfp"];
const INTERACTION_MODE: &str = "int_mode";

/// Raw columns a simulated sample must carry.
pub fn required_simulation_columns() -> Vec<&'static str> {
    GENERATOR_WEIGHTS
        .iter()
        .chain(TRUE_VERTEX.iter())
        .chain(STRANGE_SPECIES.iter())
        .chain(TRUTH_CHANNEL_INPUTS.iter())
        .chain(std::iter::once(&PHOTON_COUNT))
        .copied()
        .collect()
}

/// Names of the run / sub-run / event columns, accepting the usual aliases.
pub fn event_id_columns(frame: &LazyFrame) -> Option<[String; 3]> {
    let pick = |names: &[&str]| names.iter().find(|n| frame.has_column(n)).map(|n| n.to_string());
    Some([pick(&["run"])?, pick(&["sub", "subrun"])?, pick(&["evt", "event"])?])
}

/// Attaches the derived-attribute columns to a sample frame.
///
/// Applied identically to the nominal frame and every detector-variation
/// frame of an entry.
#[derive(Clone)]
pub struct Processor {
    fiducial: Arc<dyn FiducialVolume>,
}

impl Default for Processor {
    fn default() -> Self {
        Processor { fiducial: Arc::new(DetectorFiducial::default()) }
    }
}

impl Processor {
    pub fn new(fiducial: Arc<dyn FiducialVolume>) -> Self {
        Processor { fiducial }
    }

    pub fn run(&self, frame: LazyFrame, kind: DatasetKind, exposure: &Exposure) -> Result<LazyFrame> {
        let base = base_weight(kind, exposure);
        let mut node = frame.define("w_base", &[], move |_| base)?;

        node = if kind.is_simulation() {
            self.check_required(&node)?;
            let node = node.define("w_nominal", &["w_base", "weightSpline", "weightTune"], |r| {
                nominal_weight(r.float(0), r.float(1), r.float(2))
            })?;
            self.define_truth(node)?
        } else {
            let node = node.define("w_nominal", &["w_base"], |r| r.float(0))?;
            Self::define_truth_fallbacks(node, kind)?
        };

        if RECO_VERTEX.iter().all(|c| node.has_column(c)) {
            let fiducial = Arc::clone(&self.fiducial);
            node = node.define("in_reco_fiducial", &RECO_VERTEX, move |r| {
                fiducial.is_in_reco_volume(r.float(0), r.float(1), r.float(2))
            })?;
        } else {
            debug!("reco vertex columns absent, in_reco_fiducial not defined");
        }

        Ok(node)
    }

    fn check_required(&self, frame: &LazyFrame) -> Result<()> {
        let missing: Vec<&str> = required_simulation_columns().into_iter().filter(|c| !frame.has_column(c)).collect();
        if !missing.is_empty() {
            return Err(Error::MissingColumn(missing.iter().join(", ")));
        }
        if event_id_columns(frame).is_none() {
            return Err(Error::MissingColumn("run/sub/evt".to_string()));
        }
        Ok(())
    }

    fn define_truth(&self, node: LazyFrame) -> Result<LazyFrame> {
        let fiducial = Arc::clone(&self.fiducial);
        let mut node = node.define("in_fiducial", &TRUE_VERTEX, move |r| {
            fiducial.is_in_truth_volume(r.float(0), r.float(1), r.float(2))
        })?;

        node = node.define("count_strange", &STRANGE_SPECIES, |r| {
            let counts: [i64; 7] = std::array::from_fn(|i| r.int(i));
            count_strange(&counts)
        })?;
        node = node.define("is_strange", &["count_strange"], |r| r.int(0) > 0)?;

        node = if node.has_column(INTERACTION_MODE) {
            node.define("scattering_mode", &[INTERACTION_MODE], |r| scattering_mode(r.int(0)))?
        } else {
            debug!("int_mode absent, scattering_mode set to -1");
            node.define("scattering_mode", &[], |_| -1i64)?
        };

        node = node.define(
            "analysis_channels",
            &["in_fiducial", "nu_pdg", "int_ccnc", "count_strange", "n_p", "n_pi_minus", "n_pi_plus", "n_pi0", PHOTON_COUNT],
            |r| {
                let truth = TruthSummary {
                    in_fiducial: r.boolean(0),
                    nu_pdg: r.int(1),
                    ccnc: r.int(2),
                    count_strange: r.int(3),
                    n_proton: r.int(4),
                    n_pi_minus: r.int(5),
                    n_pi_plus: r.int(6),
                    n_pi_zero: r.int(7),
                    n_gamma: r.int(8),
                };
                i64::from(classify(&truth).code())
            },
        )?;

        node = node.define("is_signal", &["analysis_channels"], |r| Channel::from_code(r.int(0)).is_signal())?;

        node = if RECO_QUALITY.iter().all(|c| node.has_column(c)) {
            node.define("recognised_signal", &["is_signal", RECO_QUALITY[0], RECO_QUALITY[1]], |r| {
                is_recognised_signal(r.boolean(0), r.float(1), r.float(2))
            })?
        } else {
            debug!("purity/completeness absent, recognised_signal set to false");
            node.define("recognised_signal", &[], |_| false)?
        };

        Ok(node)
    }

    /// Constant truth columns for kinds without generator information.
    fn define_truth_fallbacks(node: LazyFrame, kind: DatasetKind) -> Result<LazyFrame> {
        let channel = i64::from(kind.fallback_channel().code());
        node.define("in_fiducial", &[], |_| false)?
            .define("count_strange", &[], |_| 0i64)?
            .define("is_strange", &[], |_| false)?
            .define("scattering_mode", &[], |_| -1i64)?
            .define("analysis_channels", &[], move |_| channel)?
            .define("is_signal", &[], |_| false)?
            .define("recognised_signal", &[], |_| false)
    }
}

/// Restrict a simulated sample to its physics slice.
pub fn apply_slice(frame: LazyFrame, slice: Slice) -> Result<LazyFrame> {
    match slice {
        Slice::None => Ok(frame),
        Slice::StrangenessInclusive => frame.filter("strangeness_slice", &["is_strange"], |r| r.boolean(0)),
        Slice::BeamInclusive => frame.filter("beam_slice", &["is_strange"], |r| !r.boolean(0)),
    }
}
