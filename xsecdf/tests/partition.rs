mod common;

use std::sync::Arc;

use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use xseccore::partition::builder::PartitionConfig;
use xseccore::physics::derive::DatasetKind;
use xsecdf::data::frame::Column;
use xsecdf::data::source::MemorySource;
use xsecdf::hub::catalog::{Hub, HubOptions};
use xsecdf::hub::config::SampleDescriptor;
use xsecdf::hub::entry::Slice;

use common::simulated_columns;

/// Per entry: `valid_signal` signal rows with random weights, then
/// `background` background rows, then `invalid` zero-weight signal rows.
fn descriptors(sizes: &[(usize, usize, usize)], rng_seed: u64) -> Vec<SampleDescriptor> {
    let mut rng = StdRng::seed_from_u64(rng_seed);
    sizes
        .iter()
        .enumerate()
        .map(|(k, &(valid_signal, background, invalid))| {
            let mut weights = Vec::new();
            let mut signal = Vec::new();
            for _ in 0..valid_signal {
                weights.push(rng.gen_range(0.1..3.0));
                signal.push(true);
            }
            for _ in 0..background {
                weights.push(rng.gen_range(0.1..3.0));
                signal.push(false);
            }
            for _ in 0..invalid {
                weights.push(0.0);
                signal.push(true);
            }
            let table = simulated_columns(k as i64 + 1, &weights, &signal);
            let source = Arc::new(MemorySource::new(&format!("sim{}", k), table));
            SampleDescriptor::new("numi_fhc", &format!("run{}", k + 1), DatasetKind::Simulation, Slice::None, source)
        })
        .collect()
}

struct Row {
    signal: bool,
    training: bool,
    w_nominal: f64,
    w_analysis: f64,
}

fn rows(hub: &Hub) -> Vec<Row> {
    let mut out = Vec::new();
    for entry in hub.entries() {
        let table = entry.frame().collect(&["is_signal", "is_training", "w_nominal", "w_analysis"]).unwrap();
        let (Some(Column::Bool(s)), Some(Column::Bool(t)), Some(Column::Float(wn)), Some(Column::Float(wa))) = (
            table.get("is_signal"),
            table.get("is_training"),
            table.get("w_nominal"),
            table.get("w_analysis"),
        ) else {
            panic!("unexpected column types");
        };
        for i in 0..table.num_rows() {
            out.push(Row { signal: s[i], training: t[i], w_nominal: wn[i], w_analysis: wa[i] });
        }
    }
    out
}

#[test]
fn test_quota_rescale_and_exclusivity() {
    let config = PartitionConfig { signal_quota: 50_000, background_quota: 50_000, ..Default::default() };
    let descriptors = descriptors(&[(40_000, 500, 100), (35_000, 500, 100), (25_000, 500, 100)], 7);
    let hub = Hub::from_descriptors(descriptors, &HubOptions::default().with_partition(config)).unwrap();

    let partition = hub.partition();
    assert_eq!(partition.signal.candidates, 100_000);
    assert_eq!(partition.signal.training_count(), 50_000);
    // background pool smaller than its quota: everything is training
    assert_eq!(partition.background.candidates, 1_500);
    assert_eq!(partition.background.training_count(), 1_500);
    assert_eq!(partition.background.rescale, 1.0);

    let rows = rows(&hub);
    let signal: Vec<&Row> = rows.iter().filter(|r| r.signal).collect();
    assert_eq!(signal.iter().filter(|r| r.training).count(), 50_000);

    let total: f64 = signal.iter().filter(|r| r.w_nominal > 0.0).map(|r| r.w_nominal).sum();
    let training: f64 = signal.iter().filter(|r| r.training).map(|r| r.w_nominal).sum();
    assert_relative_eq!(partition.signal.total_weight, total, max_relative = 1e-9);
    assert_relative_eq!(partition.signal.training_weight, training, max_relative = 1e-9);
    assert_relative_eq!(partition.signal.rescale, total / (total - training), max_relative = 1e-9);

    for row in &rows {
        assert!(!(row.training && row.w_analysis > 0.0));
        if row.w_nominal == 0.0 {
            assert!(!row.training);
            assert_eq!(row.w_analysis, 0.0);
        }
    }

    // the analysis share restores the full class yield
    let analysis: f64 = signal.iter().map(|r| r.w_analysis).sum();
    assert_relative_eq!(analysis, total, max_relative = 1e-9);
}

#[test]
fn test_partition_is_independent_of_thread_count() {
    let config = PartitionConfig { signal_quota: 2_000, background_quota: 300, seed: 99 };
    let build = |threads: usize| {
        let options = HubOptions::default().with_partition(config).with_threads(threads);
        Hub::from_descriptors(descriptors(&[(3_000, 400, 10), (1_500, 300, 10), (2_500, 200, 10)], 11), &options)
            .unwrap()
    };
    let one = build(1);
    let four = build(4);
    assert_eq!(one.partition(), four.partition());

    let a = rows(&one);
    let b = rows(&four);
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(&b) {
        assert_eq!(x.training, y.training);
        assert_eq!(x.w_analysis.to_bits(), y.w_analysis.to_bits());
    }
}

#[test]
fn test_seed_changes_the_training_set() {
    let build = |seed: u64| {
        let config = PartitionConfig { signal_quota: 500, background_quota: 500, seed };
        Hub::from_descriptors(descriptors(&[(2_000, 2_000, 0)], 3), &HubOptions::default().with_partition(config))
            .unwrap()
    };
    let a = build(1);
    let b = build(2);
    assert_eq!(a.partition().signal.training_count(), 500);
    assert_ne!(a.partition().signal.training_ids, b.partition().signal.training_ids);
}

#[test]
fn test_zero_quota_leaves_everything_for_analysis() {
    let config = PartitionConfig { signal_quota: 0, background_quota: 0, ..Default::default() };
    let hub = Hub::from_descriptors(descriptors(&[(100, 100, 5)], 5), &HubOptions::default().with_partition(config))
        .unwrap();
    assert_eq!(hub.partition().signal.rescale, 1.0);
    assert_eq!(hub.partition().background.rescale, 1.0);
    for row in rows(&hub) {
        assert!(!row.training);
        assert_eq!(row.w_analysis, row.w_nominal);
    }
}
