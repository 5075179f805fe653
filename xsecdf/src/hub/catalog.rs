//! The catalog: every sample of every beamline and period, with derived,
//! training and analysis columns attached.
//!
//! Construction runs in strict phases:
//!
//! 1. derive: each descriptor becomes an entry whose frames carry the
//!    derived-attribute columns (and the slice filter for sliced samples);
//! 2. scan: every simulated entry is scanned in parallel and its valid
//!    events are submitted to one [`CandidateCollector`];
//! 3. partition: the collector is consumed into a [`TrainingPartition`];
//! 4. annotate: `is_training` and `w_analysis` are defined on every frame
//!    from that one partition.
//!
//! Entries are only handed out once all four phases have completed.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, info};
use xseccore::event::key::EventKey;
use xseccore::partition::builder::{PartitionConfig, TrainingPartition};
use xseccore::partition::candidate::{CandidateBatch, CandidateCollector, ScannedEvent};
use xseccore::physics::derive::{is_valid_weight, DatasetKind};

use crate::data::frame::LazyFrame;
use crate::data::source::EventSource;
use crate::error::{Error, Result};
use crate::hub::config::{CatalogConfig, SampleDescriptor};
use crate::hub::entry::{SampleEntry, Slice};
use crate::hub::processor::{apply_slice, event_id_columns, Processor};

/// Knobs of catalog construction that do not come from the configuration.
#[derive(Clone, Default)]
pub struct HubOptions {
    /// Worker count for the candidate scan and for later frame actions;
    /// `None` uses the global rayon pool.
    pub threads: Option<usize>,
    /// Overrides the `training` block of the configuration.
    pub partition: Option<PartitionConfig>,
    pub processor: Processor,
}

impl HubOptions {
    pub fn with_threads(mut self, n: usize) -> Self {
        self.threads = Some(n);
        self
    }

    pub fn with_partition(mut self, partition: PartitionConfig) -> Self {
        self.partition = Some(partition);
        self
    }

    pub fn with_processor(mut self, processor: Processor) -> Self {
        self.processor = processor;
        self
    }
}

type Catalog = BTreeMap<String, BTreeMap<String, Vec<SampleEntry>>>;

pub struct Hub {
    db: Catalog,
    partition: Arc<TrainingPartition>,
}

impl Hub {
    /// Load a catalog configuration file with default options.
    pub fn load(path: &Path) -> Result<Hub> {
        Self::load_with(path, &HubOptions::default())
    }

    pub fn load_with(path: &Path, options: &HubOptions) -> Result<Hub> {
        let config = CatalogConfig::from_path(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let descriptors = config.descriptors(base_dir)?;
        info!(config = %path.display(), samples = descriptors.len(), "loading catalog");

        let options = HubOptions { partition: options.partition.or(Some(config.training)), ..options.clone() };
        Self::from_descriptors(descriptors, &options)
    }

    pub fn from_descriptors(descriptors: Vec<SampleDescriptor>, options: &HubOptions) -> Result<Hub> {
        let partition_config = options.partition.unwrap_or_default();

        let mut db: Catalog = BTreeMap::new();
        for descriptor in descriptors {
            let entry = derive_entry(&options.processor, descriptor)?;
            db.entry(entry.beamline.clone())
                .or_default()
                .entry(entry.period.clone())
                .or_default()
                .push(entry);
        }

        let collector = CandidateCollector::new(partition_config.seed);
        {
            let simulated: Vec<(usize, &SampleEntry)> = db
                .values()
                .flat_map(|periods| periods.values().flatten())
                .enumerate()
                .filter(|(_, e)| e.is_simulation())
                .collect();
            match options.threads {
                Some(n) => {
                    let pool = ThreadPoolBuilder::new()
                        .num_threads(n)
                        .build()
                        .map_err(|e| Error::ThreadPool(e.to_string()))?;
                    pool.install(|| scan(&simulated, &collector))?;
                }
                None => scan(&simulated, &collector)?,
            }
        }

        let partition = Arc::new(TrainingPartition::build(collector, &partition_config));

        for entry in db.values_mut().flat_map(|periods| periods.values_mut().flatten()) {
            annotate_entry(entry, &partition, options.threads).map_err(|e| e.in_sample(entry.context()))?;
        }

        let hub = Hub { db, partition };
        info!(
            beamlines = hub.db.len(),
            entries = hub.entries().count(),
            simulated = hub.entries().filter(|e| e.is_simulation()).count(),
            "catalog ready"
        );
        Ok(hub)
    }

    pub fn partition(&self) -> &TrainingPartition {
        &self.partition
    }

    pub fn beamlines(&self) -> impl Iterator<Item = &str> {
        self.db.keys().map(String::as_str)
    }

    pub fn periods(&self, beamline: &str) -> impl Iterator<Item = &str> {
        self.db.get(beamline).into_iter().flat_map(|p| p.keys().map(String::as_str))
    }

    /// Every entry, in beamline / period / configuration order.
    pub fn entries(&self) -> impl Iterator<Item = &SampleEntry> {
        self.db.values().flat_map(|periods| periods.values().flatten())
    }

    /// Entries of one beamline restricted to `periods`; an empty period list
    /// means every period. Unknown names yield nothing.
    fn select<'a>(
        &'a self,
        beamline: &str,
        periods: &[&str],
        keep: impl Fn(&SampleEntry) -> bool,
    ) -> Vec<&'a SampleEntry> {
        let Some(by_period) = self.db.get(beamline) else {
            debug!(beamline, "beamline not in catalog");
            return Vec::new();
        };
        by_period
            .iter()
            .filter(|(period, _)| periods.is_empty() || periods.contains(&period.as_str()))
            .flat_map(|(_, entries)| entries.iter())
            .filter(|e| keep(*e))
            .collect()
    }

    pub fn simulation_entries(&self, beamline: &str, periods: &[&str]) -> Vec<&SampleEntry> {
        self.select(beamline, periods, |e| e.kind == DatasetKind::Simulation)
    }

    pub fn data_entries(&self, beamline: &str, periods: &[&str]) -> Vec<&SampleEntry> {
        self.select(beamline, periods, |e| e.kind == DatasetKind::Data)
    }

    pub fn background_entries(&self, beamline: &str, periods: &[&str]) -> Vec<&SampleEntry> {
        self.select(beamline, periods, |e| e.kind == DatasetKind::BackgroundEstimate)
    }

    /// Simulation plus background-estimate entries: everything stacked
    /// against data.
    pub fn prediction_entries(&self, beamline: &str, periods: &[&str]) -> Vec<&SampleEntry> {
        self.select(beamline, periods, |e| e.kind != DatasetKind::Data)
    }
}

fn derive_entry(processor: &Processor, descriptor: SampleDescriptor) -> Result<SampleEntry> {
    let context = descriptor.context();
    if !descriptor.kind.is_simulation() && descriptor.slice != Slice::None {
        let message = format!("slice '{}' requested for a non-simulation sample", descriptor.slice.label());
        return Err(Error::config(context, message));
    }
    let derive = |source: Arc<dyn EventSource>| -> Result<LazyFrame> {
        let frame = processor.run(LazyFrame::new(source)?, descriptor.kind, &descriptor.exposure)?;
        if descriptor.kind.is_simulation() {
            apply_slice(frame, descriptor.slice)
        } else {
            Ok(frame)
        }
    };

    let nominal = derive(Arc::clone(&descriptor.source)).map_err(|e| e.in_sample(&context))?;
    let mut variations = BTreeMap::new();
    for (tag, source) in &descriptor.variations {
        let frame = derive(Arc::clone(source)).map_err(|e| e.in_sample(format!("{} [{}]", context, tag)))?;
        variations.insert(tag.clone(), frame);
    }
    debug!(sample = %context, variations = variations.len(), "derived columns attached");

    Ok(SampleEntry {
        beamline: descriptor.beamline,
        period: descriptor.period,
        kind: descriptor.kind,
        slice: descriptor.slice,
        origin: descriptor.origin,
        files: descriptor.files,
        exposure: descriptor.exposure,
        nominal,
        variations,
    })
}

/// Scan simulated entries concurrently into the collector. `order` is the
/// entry's position in the catalog and fixes the candidate order.
fn scan(entries: &[(usize, &SampleEntry)], collector: &CandidateCollector) -> Result<()> {
    entries.par_iter().try_for_each(|(order, entry)| {
        let (rows, batch) = scan_entry(entry, collector.seed()).map_err(|e| e.in_sample(entry.context()))?;
        info!(
            sample = %entry.context(),
            rows,
            signal = batch.signal.len(),
            background = batch.background.len(),
            "scanned partition candidates"
        );
        collector.submit(*order, batch);
        Ok(())
    })
}

fn scan_entry(entry: &SampleEntry, seed: u64) -> Result<(usize, CandidateBatch)> {
    let frame = entry.frame();
    let [run, sub, evt] = event_id_columns(frame).ok_or_else(|| Error::MissingColumn("run/sub/evt".to_string()))?;
    let rows = frame.map_rows(&[run.as_str(), sub.as_str(), evt.as_str(), "is_signal", "w_nominal"], |r| {
        (r.int(0), r.int(1), r.int(2), r.boolean(3), r.float(4))
    })?;

    let events = rows
        .iter()
        .filter(|(.., w)| is_valid_weight(*w))
        .map(|&(run, sub, evt, is_signal, w)| -> Result<ScannedEvent> {
            Ok((EventKey::try_new(run, sub, evt)?, is_signal, w))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((rows.len(), CandidateBatch::from_events(&events, seed)))
}

fn annotate(frame: &LazyFrame, kind: DatasetKind, partition: &Arc<TrainingPartition>) -> Result<LazyFrame> {
    if !kind.is_simulation() {
        return frame.define("is_training", &[], |_| false)?.define("w_analysis", &["w_nominal"], |r| r.float(0));
    }

    let [run, sub, evt] = event_id_columns(frame).ok_or_else(|| Error::MissingColumn("run/sub/evt".to_string()))?;
    let membership = Arc::clone(partition);
    let weights = Arc::clone(partition);
    frame
        .define("is_training", &[run.as_str(), sub.as_str(), evt.as_str(), "is_signal"], move |r| {
            EventKey::try_new(r.int(0), r.int(1), r.int(2))
                .map(|key| membership.is_training(&key, r.boolean(3)))
                .unwrap_or(false)
        })?
        .define("w_analysis", &["w_nominal", "is_signal", "is_training"], move |r| {
            weights.analysis_weight(r.float(0), r.boolean(1), r.boolean(2))
        })
}

fn annotate_entry(entry: &mut SampleEntry, partition: &Arc<TrainingPartition>, threads: Option<usize>) -> Result<()> {
    let finish = |frame: LazyFrame| match threads {
        Some(n) => frame.with_threads(n),
        None => frame,
    };
    entry.nominal = finish(annotate(&entry.nominal, entry.kind, partition)?);
    for frame in entry.variations.values_mut() {
        *frame = finish(annotate(frame, entry.kind, partition)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::frame::{Column, Columns};
    use crate::data::source::MemorySource;
    use xseccore::physics::derive::Exposure;

    /// Simulated table whose odd events carry one Lambda (signal).
    fn simulated(run: i64, rows: usize) -> Columns {
        let int = |v: i64| Column::Int(vec![v; rows]);
        let float = |v: f64| Column::Float(vec![v; rows]);
        let mut t = Columns::new()
            .with("run", int(run))
            .unwrap()
            .with("subrun", int(1))
            .unwrap()
            .with("event", Column::Int((0..rows as i64).collect()))
            .unwrap();
        for (name, col) in [
            ("weightSpline", float(1.0)),
            ("weightTune", Column::Float((0..rows).map(|i| if i % 5 == 4 { 0.0 } else { 1.0 + i as f64 * 0.01 }).collect())),
            ("nu_vtx_x", float(120.0)),
            ("nu_vtx_y", float(0.0)),
            ("nu_vtx_z", float(500.0)),
            ("nu_pdg", int(14)),
            ("int_ccnc", int(0)),
            ("n_p", int(1)),
            ("n_pi_minus", int(0)),
            ("n_pi_plus", int(0)),
            ("n_pi0", int(0)),
            ("n_gamma", int(0)),
            ("n_K_plus", int(0)),
            ("n_K_minus", int(0)),
            ("n_K0", int(0)),
            ("n_lambda", Column::Int((0..rows as i64).map(|i| i % 2).collect())),
            ("n_sigma_plus", int(0)),
            ("n_sigma0", int(0)),
            ("n_sigma_minus", int(0)),
        ] {
            t.insert(name, col).unwrap();
        }
        t
    }

    fn descriptor(kind: DatasetKind, slice: Slice, table: Columns) -> SampleDescriptor {
        SampleDescriptor::new("numi_fhc", "run1", kind, slice, Arc::new(MemorySource::new("t", table)))
    }

    fn hub(quota: usize) -> Hub {
        let data = Columns::new().with("run", Column::Int(vec![1, 2, 3])).unwrap();
        let descriptors = vec![
            descriptor(DatasetKind::Simulation, Slice::None, simulated(1, 40))
                .with_variation("cv", Arc::new(MemorySource::new("cv", simulated(1, 40)))),
            descriptor(DatasetKind::Simulation, Slice::StrangenessInclusive, simulated(2, 40)),
            descriptor(DatasetKind::Data, Slice::None, data),
        ];
        let config = PartitionConfig { signal_quota: quota, background_quota: quota, ..Default::default() };
        Hub::from_descriptors(descriptors, &HubOptions::default().with_partition(config)).unwrap()
    }

    #[test]
    fn test_accessors() {
        let hub = hub(5);
        assert_eq!(hub.beamlines().collect::<Vec<_>>(), vec!["numi_fhc"]);
        assert_eq!(hub.periods("numi_fhc").collect::<Vec<_>>(), vec!["run1"]);
        assert_eq!(hub.simulation_entries("numi_fhc", &[]).len(), 2);
        assert_eq!(hub.data_entries("numi_fhc", &["run1"]).len(), 1);
        assert_eq!(hub.prediction_entries("numi_fhc", &[]).len(), 2);
        assert!(hub.background_entries("numi_fhc", &[]).is_empty());
        assert!(hub.simulation_entries("bnb", &[]).is_empty());
        assert!(hub.simulation_entries("numi_fhc", &["run9"]).is_empty());
    }

    #[test]
    fn test_partition_and_annotation() {
        let hub = hub(5);
        let summary = hub.partition().summary();
        // 32 valid events per entry; the strangeness slice keeps the 16 signal ones
        assert_eq!(summary.signal.candidates, 32);
        assert_eq!(summary.background.candidates, 16);
        assert_eq!(summary.signal.training, 5);
        assert_eq!(summary.background.training, 5);

        let mut training = 0;
        for entry in hub.simulation_entries("numi_fhc", &[]) {
            let out = entry.frame().collect(&["is_training", "w_analysis", "w_nominal"]).unwrap();
            let (Some(Column::Bool(t)), Some(Column::Float(wa)), Some(Column::Float(wn))) =
                (out.get("is_training"), out.get("w_analysis"), out.get("w_nominal"))
            else {
                panic!("unexpected column types");
            };
            for i in 0..t.len() {
                if t[i] || wn[i] == 0.0 {
                    assert_eq!(wa[i], 0.0);
                } else {
                    assert!(wa[i] > wn[i]);
                }
            }
            training += t.iter().filter(|x| **x).count();
        }
        assert_eq!(training, 10);

        let data = &hub.data_entries("numi_fhc", &[])[0];
        let out = data.frame().collect(&["is_training", "w_analysis"]).unwrap();
        assert_eq!(out.get("is_training"), Some(&Column::Bool(vec![false; 3])));
        assert_eq!(out.get("w_analysis"), Some(&Column::Float(vec![1.0; 3])));
    }

    #[test]
    fn test_variations_share_the_partition() {
        let hub = hub(5);
        let entry = hub.simulation_entries("numi_fhc", &[])[0];
        let nominal = entry.frame().collect(&["is_training"]).unwrap();
        let cv = entry.variation("cv").unwrap().collect(&["is_training"]).unwrap();
        assert_eq!(nominal, cv);
        assert_eq!(entry.variation_tags().collect::<Vec<_>>(), vec!["cv"]);
    }

    #[test]
    fn test_missing_truth_column_names_the_sample() {
        let table = Columns::new().with("run", Column::Int(vec![1])).unwrap();
        let descriptors = vec![descriptor(DatasetKind::Simulation, Slice::None, table)
            .with_exposure(Exposure { pot_nominal: 1.0, pot_equivalent: 1.0, ..Default::default() })];
        let err = Hub::from_descriptors(descriptors, &HubOptions::default()).err().unwrap();
        assert!(err.to_string().starts_with("numi_fhc/run1/mc: missing column"));
    }

    #[test]
    fn test_out_of_range_event_id_aborts() {
        let mut table = simulated(1, 2);
        table = {
            let mut t = Columns::new();
            for (name, col) in table.iter() {
                let col = if name == "run" { Column::Int(vec![1 << 40; 2]) } else { col.clone() };
                t.insert(name, col).unwrap();
            }
            t
        };
        let descriptors = vec![descriptor(DatasetKind::Simulation, Slice::None, table)];
        let err = Hub::from_descriptors(descriptors, &HubOptions::default()).err().unwrap();
        assert!(matches!(err, Error::Sample { ref source, .. } if matches!(**source, Error::EventKey(_))));
    }

    #[test]
    fn test_slice_on_data_sample_is_rejected() {
        let data = Columns::new().with("run", Column::Int(vec![1])).unwrap();
        let descriptors = vec![descriptor(DatasetKind::Data, Slice::StrangenessInclusive, data)];
        let err = Hub::from_descriptors(descriptors, &HubOptions::default()).err().unwrap();
        assert!(matches!(err, Error::Config { ref context, .. } if context == "numi_fhc/run1/data"), "{}", err);
    }
}
