//! Selection presets, the efficiency/purity evaluator and the cutflow.

use std::fmt;

use xseccore::physics::channel::Channel;
use xseccore::physics::derive::{is_valid_weight, DatasetKind};
use xseccore::selection::cuts::{has_muon_candidate, passes_slice, passes_topology, passes_trigger};

use crate::data::frame::LazyFrame;
use crate::error::Result;
use crate::hub::entry::SampleEntry;

const TRIGGER_INPUTS: [&str; 3] = ["optical_filter_pe_beam", "optical_filter_pe_veto", "software_trigger"];
const SLICE_INPUTS: [&str; 2] = ["num_slices", "topological_score"];
const TOPOLOGY_INPUTS: [&str; 2] = ["contained_fraction", "slice_cluster_fraction"];
const MUON_INPUTS: [&str; 4] = ["track_shower_scores", "track_length", "track_distance_to_vertex", "pfp_generations"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    Empty,
    Trigger,
    Slice,
    Fiducial,
    Topology,
    Muon,
    /// Trigger, slice, fiducial, topology and muon, in that order.
    InclusiveMuCC,
}

impl Preset {
    pub const ATOMS: [Preset; 5] = [Preset::Trigger, Preset::Slice, Preset::Fiducial, Preset::Topology, Preset::Muon];

    /// Atomic presets this one is the conjunction of.
    pub fn atoms(self) -> &'static [Preset] {
        match self {
            Preset::Empty => &[],
            Preset::Trigger => &[Preset::Trigger],
            Preset::Slice => &[Preset::Slice],
            Preset::Fiducial => &[Preset::Fiducial],
            Preset::Topology => &[Preset::Topology],
            Preset::Muon => &[Preset::Muon],
            Preset::InclusiveMuCC => &Preset::ATOMS,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Preset::Empty => "Empty",
            Preset::Trigger => "Trigger",
            Preset::Slice => "Slice",
            Preset::Fiducial => "Fiducial",
            Preset::Topology => "Topology",
            Preset::Muon => "Muon",
            Preset::InclusiveMuCC => "InclusiveMuCC",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn apply_atom(frame: LazyFrame, atom: Preset, kind: DatasetKind) -> Result<LazyFrame> {
    match atom {
        Preset::Trigger if !kind.is_simulation() => Ok(frame),
        Preset::Trigger => frame.filter("trigger", &TRIGGER_INPUTS, move |r| {
            passes_trigger(kind, r.float(0), r.float(1), r.int(2))
        }),
        Preset::Slice => frame.filter("slice", &SLICE_INPUTS, |r| passes_slice(r.int(0), r.float(1))),
        Preset::Fiducial => frame.filter("fiducial", &["in_reco_fiducial"], |r| r.boolean(0)),
        Preset::Topology => frame.filter("topology", &TOPOLOGY_INPUTS, |r| passes_topology(r.float(0), r.float(1))),
        Preset::Muon => frame.filter("muon", &MUON_INPUTS, |r| {
            has_muon_candidate(r.floats(0), r.floats(1), r.floats(2), r.floats(3))
        }),
        Preset::Empty | Preset::InclusiveMuCC => apply(frame, atom, kind),
    }
}

/// Apply a preset to a frame of a sample of the given kind.
pub fn apply(frame: LazyFrame, preset: Preset, kind: DatasetKind) -> Result<LazyFrame> {
    preset.atoms().iter().try_fold(frame, |f, atom| apply_atom(f, *atom, kind))
}

/// Weighted totals of a selection against a truth definition.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EvalResult {
    /// Signal weight before any selection.
    pub denom: f64,
    /// Signal weight after the selection.
    pub numer: f64,
    /// Total weight after the selection.
    pub selected: f64,
}

impl EvalResult {
    pub fn efficiency(&self) -> f64 {
        if self.denom > 0.0 {
            self.numer / self.denom
        } else {
            0.0
        }
    }

    pub fn purity(&self) -> f64 {
        if self.selected > 0.0 {
            self.numer / self.selected
        } else {
            0.0
        }
    }
}

/// Selected weight, selected signal weight and row count of one frame.
/// Invalid nominal weights count as rows but carry no weight.
fn tally(frame: &LazyFrame, truth: &impl Fn(Channel) -> bool) -> Result<(f64, f64, usize)> {
    let rows = frame.map_rows(&["analysis_channels", "w_nominal"], |r| (r.int(0), r.float(1)))?;
    let mut all = 0.0;
    let mut signal = 0.0;
    for (code, w) in &rows {
        if !is_valid_weight(*w) {
            continue;
        }
        all += w;
        if truth(Channel::from_code(*code)) {
            signal += w;
        }
    }
    Ok((all, signal, rows.len()))
}

/// Efficiency and purity of `preset` over simulated entries, using
/// nominal weights. `truth` decides which channels count as signal.
pub fn evaluate(entries: &[&SampleEntry], truth: impl Fn(Channel) -> bool, preset: Preset) -> Result<EvalResult> {
    let mut out = EvalResult::default();
    for entry in entries {
        let base = entry.frame();
        out.denom += tally(base, &truth).map_err(|e| e.in_sample(entry.context()))?.1;
        let selected = apply(base.clone(), preset, entry.kind).map_err(|e| e.in_sample(entry.context()))?;
        let (all, signal, _) = tally(&selected, &truth).map_err(|e| e.in_sample(entry.context()))?;
        out.selected += all;
        out.numer += signal;
    }
    Ok(out)
}

/// One cumulative step of a cutflow.
#[derive(Debug, Clone, PartialEq)]
pub struct CutflowStage {
    /// Atoms applied so far, joined with `+`.
    pub label: String,
    pub result: EvalResult,
    /// Unweighted number of selected rows.
    pub rows: usize,
}

impl CutflowStage {
    pub fn efficiency(&self) -> f64 {
        self.result.efficiency()
    }

    pub fn purity(&self) -> f64 {
        self.result.purity()
    }
}

/// Apply `atoms` one after the other and report the totals after each.
pub fn cutflow(entries: &[&SampleEntry], truth: impl Fn(Channel) -> bool, atoms: &[Preset]) -> Result<Vec<CutflowStage>> {
    let mut denom = 0.0;
    let mut nodes = Vec::with_capacity(entries.len());
    for entry in entries {
        denom += tally(entry.frame(), &truth).map_err(|e| e.in_sample(entry.context()))?.1;
        nodes.push(entry.frame().clone());
    }

    let mut stages = Vec::with_capacity(atoms.len());
    let mut label = String::new();
    for atom in atoms {
        if !label.is_empty() {
            label.push('+');
        }
        label.push_str(atom.label());

        let mut result = EvalResult { denom, ..Default::default() };
        let mut rows = 0;
        for (node, entry) in nodes.iter_mut().zip(entries) {
            *node = apply(node.clone(), *atom, entry.kind).map_err(|e| e.in_sample(entry.context()))?;
            let (all, signal, n) = tally(node, &truth).map_err(|e| e.in_sample(entry.context()))?;
            result.selected += all;
            result.numer += signal;
            rows += n;
        }
        stages.push(CutflowStage { label: label.clone(), result, rows });
    }
    Ok(stages)
}
