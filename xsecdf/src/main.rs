use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use xseccore::physics::channel::Channel;

use xsecdf::data::snapshot::{write_snapshots, SnapshotOptions};
use xsecdf::hub::catalog::{Hub, HubOptions};
use xsecdf::hub::entry::SampleEntry;
use xsecdf::selection::{cutflow, Preset};

#[derive(Parser)]
#[command(name = "xsecdf")]
#[command(about = "Sample catalog, training partition and selection studies")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    /// Catalog configuration (JSON)
    #[arg(short, long, global = true, default_value = "catalog.json")]
    config: PathBuf,

    /// Beamlines, comma or space separated. Defaults to every beamline.
    #[arg(short, long, global = true)]
    beamlines: Option<String>,

    /// Periods, comma or space separated. Defaults to every period.
    #[arg(short, long, global = true)]
    periods: Option<String>,

    /// Worker threads for scans and frame evaluation (default: all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Event counts and exposures per beamline
    Counts,

    /// Cumulative inclusive muon-neutrino CC cutflow over simulation
    Cutflow,

    /// Write simulation samples to the snapshot database
    Snapshot {
        #[arg(long, default_value = "snapshots")]
        outdir: PathBuf,

        #[arg(long, default_value = "all_samples.db")]
        outfile: String,

        /// Base name of the written tables
        #[arg(long, default_value = "analysis")]
        table: String,

        /// Columns to write (comma separated). Defaults to run, sub, evt,
        /// w_nominal and analysis_channels.
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,

        /// Also write every detector variation
        #[arg(long)]
        variations: bool,
    },
}

/// Split a comma / whitespace separated list, dropping empty tokens.
fn split_list(s: &str) -> Vec<String> {
    s.split(|c: char| c == ',' || c.is_whitespace()).filter(|t| !t.is_empty()).map(String::from).collect()
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    let mut options = HubOptions::default();
    if let Some(n) = cli.threads {
        options = options.with_threads(n);
    }
    let hub = Hub::load_with(&cli.config, &options)
        .with_context(|| format!("failed to build catalog from {}", cli.config.display()))?;

    let beamlines = match cli.beamlines.as_deref().map(split_list) {
        Some(list) if !list.is_empty() => list,
        _ => hub.beamlines().map(String::from).collect(),
    };
    let periods = cli.periods.as_deref().map(split_list).unwrap_or_default();
    let periods: Vec<&str> = periods.iter().map(String::as_str).collect();

    match cli.command {
        Commands::Counts => cmd_counts(&hub, &beamlines, &periods),
        Commands::Cutflow => cmd_cutflow(&hub, &beamlines, &periods),
        Commands::Snapshot { outdir, outfile, table, columns, variations } => {
            let snapshot = SnapshotOptions { outdir, outfile, table, columns, include_variations: variations };
            cmd_snapshot(&hub, &beamlines, &periods, &snapshot)
        }
    }
}

fn summarize(entries: &[&SampleEntry], label: &str) -> Result<()> {
    println!("{} samples: {}", label, entries.len());
    let mut total = 0;
    for entry in entries {
        let n = entry.frame().count().with_context(|| format!("counting {}", entry.context()))?;
        total += n;
        println!("  {}: {} events", entry, n);
        for tag in entry.variation_tags() {
            if let Some(frame) = entry.variation(tag) {
                println!("    variation '{}': {} events", tag, frame.count()?);
            }
        }
    }
    println!("  total events: {}", total);
    Ok(())
}

fn cmd_counts(hub: &Hub, beamlines: &[String], periods: &[&str]) -> Result<()> {
    for beamline in beamlines {
        println!("Beamline: {}", beamline);
        let data = hub.data_entries(beamline, periods);
        summarize(&data, "Data")?;
        summarize(&hub.background_entries(beamline, periods), "External")?;
        let simulation = hub.simulation_entries(beamline, periods);
        summarize(&simulation, "Simulation")?;

        let pot: f64 = simulation.iter().map(|e| e.exposure.pot_nominal).sum();
        let pot_eff: f64 = simulation
            .iter()
            .map(|e| if e.exposure.pot_equivalent > 0.0 { e.exposure.pot_equivalent } else { e.exposure.pot_nominal })
            .sum();
        println!("  simulation POT (nominal / equivalent): {:e} / {:e}", pot, pot_eff);
    }

    let summary = hub.partition().summary();
    println!(
        "Training partition (seed {}): signal {}/{} rescale {:.6}, background {}/{} rescale {:.6}",
        summary.seed,
        summary.signal.training,
        summary.signal.candidates,
        summary.signal.rescale,
        summary.background.training,
        summary.background.candidates,
        summary.background.rescale,
    );
    Ok(())
}

fn cmd_cutflow(hub: &Hub, beamlines: &[String], periods: &[&str]) -> Result<()> {
    let entries: Vec<&SampleEntry> = beamlines.iter().flat_map(|bl| hub.simulation_entries(bl, periods)).collect();
    if entries.is_empty() {
        bail!("no simulation samples for beamlines {:?}", beamlines);
    }

    let stages = cutflow(&entries, Channel::is_muon_cc, &Preset::ATOMS)?;
    println!(
        "{:<36}{:>16}{:>16}{:>16}{:>16}{:>16}{:>12}",
        "Stage", "Denom(signal)", "Selected(all)", "Selected(signal)", "Efficiency", "Purity", "Rows"
    );
    for stage in &stages {
        println!(
            "{:<36}{:>16.6}{:>16.6}{:>16.6}{:>16.6}{:>16.6}{:>12}",
            stage.label,
            stage.result.denom,
            stage.result.selected,
            stage.result.numer,
            stage.efficiency(),
            stage.purity(),
            stage.rows
        );
    }
    Ok(())
}

fn cmd_snapshot(hub: &Hub, beamlines: &[String], periods: &[&str], options: &SnapshotOptions) -> Result<()> {
    let entries: Vec<&SampleEntry> = beamlines.iter().flat_map(|bl| hub.simulation_entries(bl, periods)).collect();
    let tables = write_snapshots(&entries, options)?;
    println!("wrote {} table(s) to {}", tables.len(), options.path().display());
    Ok(())
}
