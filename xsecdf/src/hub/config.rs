//! Catalog configuration: beamline → period → sample descriptors.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use xseccore::partition::builder::PartitionConfig;
use xseccore::physics::derive::{DatasetKind, Exposure};

use crate::data::source::{EventSource, SqliteSource};
use crate::error::{Error, Result};
use crate::hub::entry::{Origin, Slice};

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub training: PartitionConfig,
    pub beamlines: BTreeMap<String, BTreeMap<String, PeriodConfig>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PeriodConfig {
    pub samples: Vec<SampleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SampleConfig {
    pub kind: String,
    #[serde(default)]
    pub slice: Option<String>,
    #[serde(default)]
    pub files: Option<Vec<String>>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub pot: Option<f64>,
    #[serde(default)]
    pub pot_eff: Option<f64>,
    #[serde(default)]
    pub trig: Option<f64>,
    #[serde(default)]
    pub trig_eff: Option<f64>,
    #[serde(default)]
    pub detvars: BTreeMap<String, VariationConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VariationConfig {
    #[serde(default)]
    pub files: Option<Vec<String>>,
    #[serde(default)]
    pub file: Option<String>,
}

/// Everything the catalog needs to build one entry.
#[derive(Clone)]
pub struct SampleDescriptor {
    pub beamline: String,
    pub period: String,
    pub kind: DatasetKind,
    pub slice: Slice,
    pub origin: Origin,
    pub files: Vec<PathBuf>,
    pub exposure: Exposure,
    pub source: Arc<dyn EventSource>,
    pub variations: BTreeMap<String, Arc<dyn EventSource>>,
}

impl SampleDescriptor {
    pub fn new(beamline: &str, period: &str, kind: DatasetKind, slice: Slice, source: Arc<dyn EventSource>) -> Self {
        SampleDescriptor {
            beamline: beamline.to_string(),
            period: period.to_string(),
            kind,
            slice,
            origin: Origin::from_kind_slice(kind, slice),
            files: Vec::new(),
            exposure: Exposure::default(),
            source,
            variations: BTreeMap::new(),
        }
    }

    pub fn with_exposure(mut self, exposure: Exposure) -> Self {
        self.exposure = exposure;
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_variation(mut self, tag: &str, source: Arc<dyn EventSource>) -> Self {
        self.variations.insert(tag.to_string(), source);
        self
    }

    pub fn context(&self) -> String {
        format!("{}/{}/{}", self.beamline, self.period, self.origin.label())
    }
}

fn parse_slice(slice: &str) -> std::result::Result<Slice, String> {
    match slice.to_lowercase().as_str() {
        "beam" | "beaminclusive" => Ok(Slice::BeamInclusive),
        "strange" | "strangeness" | "strangenessinclusive" => Ok(Slice::StrangenessInclusive),
        other => Err(format!("unknown slice: {}", other)),
    }
}

/// Map a sample `kind` string (and optional `slice`) onto kind, slice and
/// origin. Kind strings are case-insensitive.
pub fn parse_kind(kind: &str, slice: Option<&str>) -> std::result::Result<(DatasetKind, Slice, Origin), String> {
    let kind = kind.to_lowercase();
    let (dataset_kind, parsed_slice, origin) = match kind.as_str() {
        "data" => (DatasetKind::Data, Slice::None, Origin::Data),
        "ext" | "external" => (DatasetKind::BackgroundEstimate, Slice::None, Origin::Ext),
        "mc" => {
            let s = slice.map(parse_slice).transpose()?.unwrap_or(Slice::None);
            (DatasetKind::Simulation, s, Origin::from_kind_slice(DatasetKind::Simulation, s))
        }
        "beam" => (DatasetKind::Simulation, Slice::BeamInclusive, Origin::Beam),
        "strangeness" => (DatasetKind::Simulation, Slice::StrangenessInclusive, Origin::Strangeness),
        "dirt" => (DatasetKind::Simulation, Slice::None, Origin::Dirt),
        other => return Err(format!("unknown kind: {}", other)),
    };
    if slice.is_some() && dataset_kind != DatasetKind::Simulation {
        return Err(format!("slice requested for non-simulation kind '{}'", kind));
    }
    Ok((dataset_kind, parsed_slice, origin))
}

fn resolve_files(base_dir: &Path, files: &Option<Vec<String>>, file: &Option<String>) -> Option<Vec<PathBuf>> {
    let listed: Vec<String> = match (files, file) {
        (Some(files), _) => files.clone(),
        (None, Some(file)) if file.is_empty() => Vec::new(),
        (None, Some(file)) => vec![file.clone()],
        (None, None) => return None,
    };
    Some(listed.iter().map(|f| base_dir.join(f)).collect())
}

fn non_negative(context: &str, name: &str, value: Option<f64>) -> Result<f64> {
    let value = value.unwrap_or(0.0);
    if !(value >= 0.0) {
        return Err(Error::config(context, format!("'{}' must be non-negative, got {}", name, value)));
    }
    Ok(value)
}

impl CatalogConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(e.kind(), format!("cannot open {}: {}", path.display(), e)))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Validate every sample and turn it into a descriptor backed by its
    /// SQLite files. Relative paths are taken relative to `base_dir`.
    pub fn descriptors(&self, base_dir: &Path) -> Result<Vec<SampleDescriptor>> {
        let mut out = Vec::new();
        for (beamline, periods) in &self.beamlines {
            for (period, period_config) in periods {
                for (index, sample) in period_config.samples.iter().enumerate() {
                    let context = format!("{}/{}/sample[{}]", beamline, period, index);
                    out.push(Self::descriptor(beamline, period, sample, base_dir, &context)?);
                }
            }
        }
        Ok(out)
    }

    fn descriptor(
        beamline: &str,
        period: &str,
        sample: &SampleConfig,
        base_dir: &Path,
        context: &str,
    ) -> Result<SampleDescriptor> {
        let (kind, slice, origin) =
            parse_kind(&sample.kind, sample.slice.as_deref()).map_err(|m| Error::config(context, m))?;

        let files = resolve_files(base_dir, &sample.files, &sample.file)
            .ok_or_else(|| Error::config(context, "sample missing 'file' or 'files'"))?;
        if files.is_empty() {
            return Err(Error::config(context, "empty 'files'"));
        }

        let mut exposure = Exposure::default();
        match kind {
            DatasetKind::Simulation => {
                exposure.pot_nominal = non_negative(context, "pot", sample.pot)?;
                exposure.pot_equivalent = non_negative(context, "pot_eff", sample.pot_eff)?;
            }
            DatasetKind::BackgroundEstimate => {
                exposure.trig_nominal = non_negative(context, "trig", sample.trig)?;
                exposure.trig_equivalent = non_negative(context, "trig_eff", sample.trig_eff)?;
            }
            DatasetKind::Data => {}
        }

        let mut descriptor =
            SampleDescriptor::new(beamline, period, kind, slice, Arc::new(SqliteSource::new(files.clone())))
                .with_exposure(exposure)
                .with_origin(origin);
        descriptor.files = files;

        for (tag, variation) in &sample.detvars {
            match resolve_files(base_dir, &variation.files, &variation.file) {
                Some(files) if !files.is_empty() => {
                    descriptor = descriptor.with_variation(tag, Arc::new(SqliteSource::new(files)));
                }
                _ => {}
            }
        }
        Ok(descriptor)
    }
}
