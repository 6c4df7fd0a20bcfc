//! ampliqc - Amplicon sequencing QC report CLI
//!
//! Command-line interface for computing run QC and diversity summaries.

use amplicon_qc::data::{DistanceMatrix, FeatureTotals};
use amplicon_qc::diversity::pcoa;
use amplicon_qc::error::Result;
use amplicon_qc::qc::rarefaction_sweep;
use amplicon_qc::report::{run_report, ReportConfig};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;

/// Amplicon sequencing QC and diversity metrics
#[derive(Parser)]
#[command(name = "ampliqc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute every report section from a YAML configuration
    Report {
        /// Path to the run configuration YAML
        #[arg(short, long)]
        config: PathBuf,

        /// Output directory for section TSVs and summary.json
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Run a principal coordinates analysis on one distance matrix
    Pcoa {
        /// Path to a tab-delimited distance matrix
        #[arg(short, long)]
        distances: PathBuf,

        /// Output path for the coordinate TSV
        #[arg(short, long)]
        output: PathBuf,

        /// Number of axes to retain (minimum 3)
        #[arg(long, default_value = "3")]
        axes: usize,
    },

    /// Sweep rarefaction depths over per-sample feature totals
    Rarefaction {
        /// Path to the headerless two-column totals CSV
        #[arg(short, long)]
        totals: PathBuf,

        /// Candidate depths (comma-separated, strictly increasing)
        #[arg(long, default_value = "5000,10000,15000,20000,25000,30000,35000,40000")]
        depths: String,

        /// Blank-name patterns (comma-separated, case-insensitive)
        #[arg(long, default_value = "water,ntc")]
        blank_patterns: String,
    },

    /// Write a starter configuration file
    ExampleConfig {
        /// Output path for the example YAML
        #[arg(short, long, default_value = "qc.yaml")]
        output: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter_level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::builder()
        .format_timestamp_millis()
        .filter_level(filter_level)
        .init();

    let result = match cli.command {
        Commands::Report { config, output } => cmd_report(&config, &output),
        Commands::Pcoa {
            distances,
            output,
            axes,
        } => cmd_pcoa(&distances, &output, axes),
        Commands::Rarefaction {
            totals,
            depths,
            blank_patterns,
        } => cmd_rarefaction(&totals, &depths, &blank_patterns),
        Commands::ExampleConfig { output } => cmd_example_config(&output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Run the full report and write its tables
fn cmd_report(config_path: &PathBuf, output_dir: &PathBuf) -> Result<()> {
    eprintln!("Loading configuration from {:?}...", config_path);
    let config = ReportConfig::from_yaml(config_path)?;

    eprintln!("Computing report '{}'...", config.name);
    let report = run_report(&config)?;

    eprintln!("Writing tables to {:?}...", output_dir);
    report.write_tables(output_dir)?;
    let summary = serde_json::to_string_pretty(&report.to_json_summary())?;
    std::fs::write(output_dir.join("summary.json"), summary)?;

    eprintln!(
        "Done! {} composition levels, {} alpha metrics, {} ordinations",
        report.compositions.len(),
        report.alpha.len(),
        report.ordinations.len()
    );
    for notice in &report.notices {
        eprintln!("  notice: {}", notice);
    }
    Ok(())
}

/// Ordination of a single distance matrix
fn cmd_pcoa(distances: &PathBuf, output: &PathBuf, axes: usize) -> Result<()> {
    eprintln!("Loading distance matrix from {:?}...", distances);
    let dm = DistanceMatrix::from_tsv(distances)?;
    eprintln!("Loaded {} samples", dm.n_samples());

    let result = pcoa(&dm, axes)?;
    if let Some(diag) = &result.diagnostic {
        eprintln!("Warning: {}", diag);
    }
    result.to_tsv(output)?;

    eprintln!("Done! {} axes retained", result.n_axes());
    for (axis, pair) in result.eigenpairs.iter().take(result.n_axes()).enumerate() {
        eprintln!(
            "  PC{}: eigenvalue {:.4}, {:.2}% explained",
            axis + 1,
            pair.eigenvalue,
            pair.percent_explained
        );
    }
    Ok(())
}

/// Depth sweep written to stdout as TSV
fn cmd_rarefaction(totals_path: &PathBuf, depths: &str, blank_patterns: &str) -> Result<()> {
    let totals = FeatureTotals::from_csv(totals_path)?;
    let depths: Vec<u64> = depths
        .split(',')
        .map(|s| {
            s.trim().parse().map_err(|_| {
                amplicon_qc::error::QcError::InvalidParameter(format!(
                    "Invalid depth '{}'",
                    s.trim()
                ))
            })
        })
        .collect::<Result<_>>()?;
    let patterns: Vec<String> = blank_patterns
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    let blanks: Vec<String> = totals
        .sample_ids()
        .iter()
        .filter(|sid| amplicon_qc::data::is_blank_id(sid, &patterns))
        .cloned()
        .collect();

    let sweep = rarefaction_sweep(&totals, &depths, &blanks)?;
    println!("depth\tpercent_samples\tpercent_seqs\tpercent_blanks\texcluded");
    for row in &sweep.rows {
        println!(
            "{}\t{:.2}\t{:.2}\t{}\t{}",
            row.depth,
            row.percent_samples,
            row.percent_seqs,
            row.percent_blanks
                .map(|p| format!("{:.2}", p))
                .unwrap_or_else(|| "NA".to_string()),
            row.excluded.join(",")
        );
    }
    Ok(())
}

/// Write a starter configuration
fn cmd_example_config(output: &PathBuf) -> Result<()> {
    let yaml = ReportConfig::example().to_yaml()?;
    std::fs::write(output, yaml)?;
    eprintln!("Wrote example configuration to {:?}", output);
    eprintln!("Edit the artifact paths, then run: ampliqc report --config {:?} --output qc_out", output);
    Ok(())
}
