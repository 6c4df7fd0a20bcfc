//! Assembled report sections and their writers.

use crate::diversity::{AlphaLong, PcoaResult};
use crate::error::Result;
use crate::qc::{
    FlowCellDepth, GroupDepthSummary, LevelComposition, LowDepthSample, RarefactionSweep,
    ReplicateReport, TaxonSpread,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// A non-fatal diagnostic emitted in place of a skipped section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub section: String,
    pub reason: String,
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.section, self.reason)
    }
}

/// Abundance spreads for one QC sample population.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QcPopulationSpread {
    pub population: String,
    pub spreads: Vec<TaxonSpread>,
}

/// Every derived table for one sequencing run.
///
/// Sections backed by an optional manifest column are `None`/empty when the
/// column is absent, with a matching entry in `notices`.
#[derive(Debug, Clone)]
pub struct QcReport {
    pub name: String,
    /// Sample counts per distinct value, per grouping column.
    pub sample_groups: BTreeMap<String, BTreeMap<String, usize>>,
    pub compositions: Vec<LevelComposition>,
    pub group_depth: Vec<GroupDepthSummary>,
    pub flow_cells: Vec<FlowCellDepth>,
    pub lowest_depth: Vec<LowDepthSample>,
    pub replicates: Option<ReplicateReport>,
    pub qc_spreads: Vec<QcPopulationSpread>,
    pub rarefaction: RarefactionSweep,
    pub alpha: BTreeMap<String, AlphaLong>,
    pub ordinations: BTreeMap<String, PcoaResult>,
    pub notices: Vec<Notice>,
}

impl QcReport {
    /// Write one TSV per section into `dir`, creating it if needed.
    pub fn write_tables<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        write_sample_groups(&self.sample_groups, dir.join("sample_groups.tsv"))?;
        for comp in &self.compositions {
            comp.absolute
                .to_tsv(dir.join(format!("composition_level_{}_absolute.tsv", comp.level)))?;
            comp.relative
                .to_tsv(dir.join(format!("composition_level_{}_relative.tsv", comp.level)))?;
        }
        write_group_depth(&self.group_depth, dir.join("group_depth.tsv"))?;
        write_flow_cells(&self.flow_cells, dir.join("flow_cell_depth.tsv"))?;
        write_lowest_depth(&self.lowest_depth, dir.join("lowest_depth.tsv"))?;
        if let Some(replicates) = &self.replicates {
            replicates.to_tsv(dir.join("replicate_similarity.tsv"))?;
        }
        for spread in &self.qc_spreads {
            // Same normalization the runner matches populations with, so a
            // configured "Artificial Colony" never puts a space in the path.
            let name = spread.population.to_lowercase().replace(' ', "");
            write_qc_spread(spread, dir.join(format!("qc_spread_{}.tsv", name)))?;
        }
        self.rarefaction.to_tsv(dir.join("rarefaction.tsv"))?;
        for (metric, long) in &self.alpha {
            long.to_tsv(dir.join(format!("alpha_{}.tsv", metric)))?;
        }
        for (metric, result) in &self.ordinations {
            result.to_tsv(dir.join(format!("pcoa_{}.tsv", metric)))?;
        }
        write_notices(&self.notices, dir.join("notices.tsv"))?;
        Ok(())
    }

    /// Machine-readable run summary.
    pub fn to_json_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "sample_groups": self.sample_groups,
            "n_composition_levels": self.compositions.len(),
            "n_depth_groups": self.group_depth.len(),
            "flow_cells": self.flow_cells,
            "n_lowest_depth": self.lowest_depth.len(),
            "replicates": self.replicates,
            "qc_spreads": self.qc_spreads,
            "rarefaction": self.rarefaction,
            "alpha_metrics": self.alpha.keys().collect::<Vec<_>>(),
            "ordinations": self.ordinations.iter().map(|(metric, result)| {
                serde_json::json!({
                    "metric": metric,
                    "eigenpairs": result.eigenpairs,
                    "diagnostic": result.diagnostic,
                })
            }).collect::<Vec<_>>(),
            "notices": self.notices,
        })
    }
}

fn write_sample_groups<P: AsRef<Path>>(
    groups: &BTreeMap<String, BTreeMap<String, usize>>,
    path: P,
) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "column\tvalue\tn_samples")?;
    for (column, counts) in groups {
        for (value, n) in counts {
            writeln!(writer, "{}\t{}\t{}", column, value, n)?;
        }
    }
    Ok(())
}

fn write_group_depth<P: AsRef<Path>>(summaries: &[GroupDepthSummary], path: P) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "group\tn_samples\tstage\tmean\tci_half_width")?;
    for summary in summaries {
        for stage in &summary.stages {
            writeln!(
                writer,
                "{}\t{}\t{}\t{:.2}\t{:.2}",
                summary.group,
                summary.n_samples,
                stage.stage.name(),
                stage.mean,
                stage.ci_half_width
            )?;
        }
    }
    Ok(())
}

fn write_flow_cells<P: AsRef<Path>>(cells: &[FlowCellDepth], path: P) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "flow_cell\tn_samples\tmin\tq1\tmedian\tq3\tmax")?;
    for cell in cells {
        let s = &cell.summary;
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            cell.flow_cell, cell.n_samples, s.min, s.q1, s.median, s.q3, s.max
        )?;
    }
    Ok(())
}

fn write_lowest_depth<P: AsRef<Path>>(rows: &[LowDepthSample], path: P) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writeln!(
        writer,
        "sample_id\texternal_id\tinput\tfiltered\tdenoised\tmerged\tnon_chimeric"
    )?;
    for row in rows {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            row.sample_id,
            row.external_id.as_deref().unwrap_or(""),
            row.input,
            row.filtered,
            row.denoised,
            row.merged,
            row.non_chimeric
        )?;
    }
    Ok(())
}

fn write_qc_spread<P: AsRef<Path>>(spread: &QcPopulationSpread, path: P) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "level\ttaxon\tmin\tq1\tmedian\tq3\tmax")?;
    for level_spread in &spread.spreads {
        for row in &level_spread.rows {
            let s = &row.summary;
            writeln!(
                writer,
                "{}\t{}\t{:.4}\t{:.4}\t{:.4}\t{:.4}\t{:.4}",
                level_spread.level, row.taxon, s.min, s.q1, s.median, s.q3, s.max
            )?;
        }
    }
    Ok(())
}

fn write_notices<P: AsRef<Path>>(notices: &[Notice], path: P) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "section\treason")?;
    for notice in notices {
        writeln!(writer, "{}\t{}", notice.section, notice.reason)?;
    }
    Ok(())
}
