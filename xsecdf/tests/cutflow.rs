mod common;

use std::fs;
use std::path::Path;

use approx::assert_relative_eq;
use rusqlite::types::Value;
use xseccore::physics::channel::Channel;
use xsecdf::hub::catalog::Hub;
use xsecdf::selection::{cutflow, evaluate, Preset};

use common::{ints, reals, vectors, write_events, STRANGE_SPECIES};

const PASS: usize = 0;
const FAIL_TRIGGER: usize = 1;
const FAIL_SLICE: usize = 2;
const FAIL_FIDUCIAL: usize = 3;
const FAIL_TOPOLOGY: usize = 4;
const FAIL_MUON: usize = 5;

/// (muon-neutrino CC truth, nominal weight, first failing stage)
const EVENTS: [(bool, f64, usize); 10] = [
    (true, 1.0, PASS),
    (true, 2.0, PASS),
    (false, 1.0, PASS),
    (true, 1.0, FAIL_TRIGGER),
    (false, 2.0, FAIL_TRIGGER),
    (true, 1.0, FAIL_SLICE),
    (false, 1.0, FAIL_FIDUCIAL),
    (true, 0.5, FAIL_TOPOLOGY),
    (false, 1.0, FAIL_MUON),
    // zero weight: selected, but carries nothing
    (true, 0.0, PASS),
];

fn write_fixture(dir: &Path) {
    let n = EVENTS.len();
    let pick = |stage: usize, fail: f64, pass: f64| -> Vec<f64> {
        EVENTS.iter().map(|e| if e.2 == stage { fail } else { pass }).collect()
    };
    let track_scores: Vec<&[f64]> =
        EVENTS.iter().map(|e| if e.2 == FAIL_MUON { &[0.1, 0.2][..] } else { &[0.9, 0.2][..] }).collect();

    let mut columns: Vec<(&str, Vec<Value>)> = vec![
        ("run", ints(&vec![1; n])),
        ("sub", ints(&vec![1; n])),
        ("evt", ints(&(0..n as i64).collect::<Vec<_>>())),
        ("weightSpline", reals(&vec![1.0; n])),
        ("weightTune", reals(&EVENTS.iter().map(|e| e.1).collect::<Vec<_>>())),
        ("nu_vtx_x", reals(&vec![120.0; n])),
        ("nu_vtx_y", reals(&vec![0.0; n])),
        ("nu_vtx_z", reals(&vec![500.0; n])),
        ("nu_pdg", ints(&vec![14; n])),
        ("int_ccnc", ints(&EVENTS.iter().map(|e| i64::from(!e.0)).collect::<Vec<_>>())),
        ("n_p", ints(&vec![1; n])),
        ("n_pi_minus", ints(&vec![0; n])),
        ("n_pi_plus", ints(&vec![0; n])),
        ("n_pi0", ints(&vec![0; n])),
        ("n_gamma", ints(&vec![0; n])),
        ("optical_filter_pe_beam", reals(&vec![10.0; n])),
        ("optical_filter_pe_veto", reals(&pick(FAIL_TRIGGER, 50.0, 5.0))),
        ("software_trigger", ints(&vec![1; n])),
        ("num_slices", ints(&pick(FAIL_SLICE, 2.0, 1.0).iter().map(|v| *v as i64).collect::<Vec<_>>())),
        ("topological_score", reals(&vec![0.5; n])),
        ("reco_neutrino_vertex_sce_x", reals(&pick(FAIL_FIDUCIAL, -50.0, 120.0))),
        ("reco_neutrino_vertex_sce_y", reals(&vec![0.0; n])),
        ("reco_neutrino_vertex_sce_z", reals(&vec![500.0; n])),
        ("contained_fraction", reals(&vec![0.9; n])),
        ("slice_cluster_fraction", reals(&pick(FAIL_TOPOLOGY, 0.2, 0.8))),
        ("track_shower_scores", vectors(&track_scores)),
        ("track_length", vectors(&vec![&[50.0, 5.0][..]; n])),
        ("track_distance_to_vertex", vectors(&vec![&[1.0, 1.0][..]; n])),
        ("pfp_generations", vectors(&vec![&[2.0, 3.0][..]; n])),
    ];
    for species in STRANGE_SPECIES {
        columns.push((species, ints(&vec![0; n])));
    }
    write_events(&dir.join("mc.db"), &columns);

    let config = r#"{
        "beamlines": {"numi_fhc": {"run1": {"samples": [
            {"kind": "mc", "file": "mc.db", "pot": 1.0e20, "pot_eff": 1.0e20}
        ]}}}
    }"#;
    fs::write(dir.join("catalog.json"), config).unwrap();
}

#[test]
fn test_inclusive_mucc_cutflow() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let hub = Hub::load(&dir.path().join("catalog.json")).unwrap();
    let entries = hub.simulation_entries("numi_fhc", &[]);
    assert_eq!(entries.len(), 1);

    let stages = cutflow(&entries, Channel::is_muon_cc, &Preset::ATOMS).unwrap();
    let labels: Vec<&str> = stages.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(
        labels,
        vec![
            "Trigger",
            "Trigger+Slice",
            "Trigger+Slice+Fiducial",
            "Trigger+Slice+Fiducial+Topology",
            "Trigger+Slice+Fiducial+Topology+Muon"
        ]
    );

    let rows: Vec<usize> = stages.iter().map(|s| s.rows).collect();
    assert_eq!(rows, vec![8, 7, 6, 5, 4]);
    assert!(rows.windows(2).all(|w| w[1] <= w[0]));

    let selected: Vec<f64> = stages.iter().map(|s| s.result.selected).collect();
    let signal: Vec<f64> = stages.iter().map(|s| s.result.numer).collect();
    assert_eq!(selected, vec![7.5, 6.5, 5.5, 5.0, 4.0]);
    assert_eq!(signal, vec![4.5, 3.5, 3.5, 3.0, 3.0]);
    for stage in &stages {
        assert_eq!(stage.result.denom, 5.5);
    }

    let last = stages.last().unwrap();
    assert_relative_eq!(last.efficiency(), 3.0 / 5.5);
    assert_relative_eq!(last.purity(), 0.75);

    let direct = evaluate(&entries, Channel::is_muon_cc, Preset::InclusiveMuCC).unwrap();
    assert_eq!(direct, last.result);
}

#[test]
fn test_zero_weight_event_contributes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let hub = Hub::load(&dir.path().join("catalog.json")).unwrap();
    let entries = hub.simulation_entries("numi_fhc", &[]);

    let all = evaluate(&entries, |c: Channel| c.is_muon_cc(), Preset::Empty).unwrap();
    assert_eq!(all.denom, 5.5);
    assert_eq!(all.selected, 10.5);

    let frame = entries[0].frame();
    assert_eq!(frame.count().unwrap(), 10);
    let zero = frame.filter("zero", &["w_nominal"], |r| r.float(0) == 0.0).unwrap();
    let table = zero.collect(&["is_training", "w_analysis"]).unwrap();
    assert_eq!(table.num_rows(), 1);
    assert_eq!(zero.sum("w_analysis").unwrap(), 0.0);
    assert_eq!(zero.sum("w_nominal").unwrap(), 0.0);
}
