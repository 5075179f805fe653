use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use xseccore::physics::derive::{DatasetKind, Exposure};

use crate::data::frame::LazyFrame;

/// Physics slice of a simulated sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slice {
    None,
    /// Beam simulation with strangeness-producing events removed.
    BeamInclusive,
    /// Dedicated strangeness-enriched simulation.
    StrangenessInclusive,
}

impl Slice {
    pub fn label(self) -> &'static str {
        match self {
            Slice::None => "none",
            Slice::BeamInclusive => "beam",
            Slice::StrangenessInclusive => "strangeness",
        }
    }
}

/// Production origin of a sample, used for labels and bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    Data,
    Ext,
    Beam,
    Strangeness,
    Dirt,
    Simulation,
}

impl Origin {
    pub fn from_kind_slice(kind: DatasetKind, slice: Slice) -> Origin {
        match (kind, slice) {
            (DatasetKind::Data, _) => Origin::Data,
            (DatasetKind::BackgroundEstimate, _) => Origin::Ext,
            (DatasetKind::Simulation, Slice::BeamInclusive) => Origin::Beam,
            (DatasetKind::Simulation, Slice::StrangenessInclusive) => Origin::Strangeness,
            (DatasetKind::Simulation, Slice::None) => Origin::Simulation,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Origin::Data => "data",
            Origin::Ext => "ext",
            Origin::Beam => "beam",
            Origin::Strangeness => "strangeness",
            Origin::Dirt => "dirt",
            Origin::Simulation => "mc",
        }
    }
}

/// One physical dataset slice of the catalog.
#[derive(Debug, Clone)]
pub struct SampleEntry {
    pub beamline: String,
    pub period: String,
    pub kind: DatasetKind,
    pub slice: Slice,
    pub origin: Origin,
    pub files: Vec<PathBuf>,
    pub exposure: Exposure,
    pub(crate) nominal: LazyFrame,
    pub(crate) variations: BTreeMap<String, LazyFrame>,
}

impl SampleEntry {
    pub fn label(&self) -> &'static str {
        self.origin.label()
    }

    /// `beamline/period/label`, used in log lines and error messages.
    pub fn context(&self) -> String {
        format!("{}/{}/{}", self.beamline, self.period, self.label())
    }

    pub fn is_simulation(&self) -> bool {
        self.kind.is_simulation()
    }

    /// Finalised nominal view, with derived and training/analysis columns.
    pub fn frame(&self) -> &LazyFrame {
        &self.nominal
    }

    /// Finalised view of a detector-variation child.
    pub fn variation(&self, tag: &str) -> Option<&LazyFrame> {
        self.variations.get(tag)
    }

    pub fn variation_tags(&self) -> impl Iterator<Item = &str> {
        self.variations.keys().map(String::as_str)
    }
}

impl fmt::Display for SampleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} file(s))", self.context(), self.files.len())
    }
}
