/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Posterior summaries of a combined draw set, as text and console tables.
//
// Created on: 24 Jan 2026     Author: Tobias Kragholm
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Summaries
//!
//! Per-protein and global posterior summaries after burn-in, written as a
//! tab-separated table and rendered with `comfy_table` for the console.

pub mod stats;

use std::fs;
use std::path::{Path, PathBuf};

use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use thiserror::Error;

use crate::model::{DrawSet, Trace};

pub use stats::{ParameterSummary, effective_sample_size, percentile, summarize_scalar};

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("burn-in of {burn_in} leaves no draws out of {n_iterations}")]
    BurnInTooLong { burn_in: usize, n_iterations: usize },
    #[error("{found} protein names given for {expected} proteins")]
    NameCountMismatch { expected: usize, found: usize },
    #[error("failed to write summary {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write summary {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Summaries of one protein's parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ProteinSummary {
    pub protein: usize,
    pub name: Option<String>,
    pub mu: ParameterSummary,
    pub sigmasq: ParameterSummary,
    pub tausq: ParameterSummary,
    pub concentration: Option<ParameterSummary>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryReport {
    pub n_draws: usize,
    pub burn_in: usize,
    pub proteins: Vec<ProteinSummary>,
    pub globals: Vec<(&'static str, ParameterSummary)>,
    pub acceptance: [(&'static str, f64); 4],
}

fn column_summary(trace: &Trace<f64>, column: usize, burn_in: usize) -> ParameterSummary {
    let values = trace.column(column);
    summarize_scalar(&values[burn_in..])
}

/// Summarize every draw after `burn_in`.
///
/// # Errors
///
/// Returns `SummaryError` if no draws remain after burn-in or the name list
/// does not match the protein count.
pub fn summarize_draws(
    draws: &DrawSet,
    burn_in: usize,
    names: Option<&[String]>,
) -> Result<SummaryReport, SummaryError> {
    let n_iterations = draws.n_iterations();
    if burn_in >= n_iterations {
        return Err(SummaryError::BurnInTooLong {
            burn_in,
            n_iterations,
        });
    }
    let n_proteins = draws.mu.width();
    if let Some(names) = names
        && names.len() != n_proteins
    {
        return Err(SummaryError::NameCountMismatch {
            expected: n_proteins,
            found: names.len(),
        });
    }

    let proteins = (0..n_proteins)
        .map(|local| ProteinSummary {
            protein: draws.tag.protein_indices[local],
            name: names.map(|names| names[local].clone()),
            mu: column_summary(&draws.mu, local, burn_in),
            sigmasq: column_summary(&draws.sigmasq, local, burn_in),
            tausq: column_summary(&draws.tausq, local, burn_in),
            concentration: draws
                .calibration
                .as_ref()
                .map(|calibration| column_summary(&calibration.concentration, local, burn_in)),
        })
        .collect();

    let mut globals: Vec<(&'static str, ParameterSummary)> = draws
        .globals
        .named()
        .into_iter()
        .map(|(name, values)| (name, summarize_scalar(&values[burn_in..])))
        .collect();
    if let Some(calibration) = &draws.calibration {
        globals.push(("beta0", column_summary(&calibration.beta, 0, burn_in)));
        globals.push(("beta1", column_summary(&calibration.beta, 1, burn_in)));
        if let Some(dist) = &calibration.concentration_dist {
            globals.push(("mean_concentration", column_summary(dist, 0, burn_in)));
            globals.push(("var_concentration", column_summary(dist, 1, burn_in)));
        }
    }

    Ok(SummaryReport {
        n_draws: n_iterations - burn_in,
        burn_in,
        proteins,
        globals,
        acceptance: draws.acceptance.rates(),
    })
}

const COLUMNS: [&str; 9] = [
    "block", "name", "parameter", "mean", "sd", "q025", "q50", "q975", "ess",
];

fn summary_fields(summary: &ParameterSummary) -> [String; 6] {
    [
        summary.mean,
        summary.std_dev,
        summary.q025,
        summary.q50,
        summary.q975,
        summary.ess,
    ]
    .map(|value| format!("{value:.6}"))
}

fn protein_rows(report: &SummaryReport) -> Vec<[String; 9]> {
    let mut rows = Vec::new();
    for protein in &report.proteins {
        let name = protein
            .name
            .clone()
            .unwrap_or_else(|| protein.protein.to_string());
        let mut parameters = vec![
            ("mu", protein.mu),
            ("sigmasq", protein.sigmasq),
            ("tausq", protein.tausq),
        ];
        if let Some(concentration) = protein.concentration {
            parameters.push(("concentration", concentration));
        }
        for (parameter, summary) in parameters {
            let [mean, sd, q025, q50, q975, ess] = summary_fields(&summary);
            rows.push([
                "protein".to_string(),
                name.clone(),
                parameter.to_string(),
                mean,
                sd,
                q025,
                q50,
                q975,
                ess,
            ]);
        }
    }
    rows
}

fn global_rows(report: &SummaryReport) -> Vec<[String; 9]> {
    report
        .globals
        .iter()
        .map(|(parameter, summary)| {
            let [mean, sd, q025, q50, q975, ess] = summary_fields(summary);
            [
                "global".to_string(),
                "-".to_string(),
                (*parameter).to_string(),
                mean,
                sd,
                q025,
                q50,
                q975,
                ess,
            ]
        })
        .collect()
}

/// Write the report as a tab-separated table, replacing `path` atomically.
///
/// # Errors
///
/// Returns `SummaryError` if the file cannot be written.
pub fn write_summary(path: &Path, report: &SummaryReport) -> Result<(), SummaryError> {
    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| SummaryError::Io { path, source }
    };
    let csv_error = |source| SummaryError::Csv {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    let temporary = path.with_extension("partial");
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(&temporary)
        .map_err(csv_error)?;
    writer.write_record(COLUMNS).map_err(csv_error)?;
    for row in protein_rows(report).into_iter().chain(global_rows(report)) {
        writer.write_record(&row).map_err(csv_error)?;
    }
    for (block, rate) in report.acceptance {
        let mut row = vec![String::new(); COLUMNS.len()];
        row[0] = "acceptance".to_string();
        row[1] = "-".to_string();
        row[2] = block.to_string();
        row[3] = format!("{rate:.6}");
        writer.write_record(&row).map_err(csv_error)?;
    }
    let file = writer
        .into_inner()
        .map_err(csv::IntoInnerError::into_error)
        .map_err(io_error(&temporary))?;
    file.sync_all().map_err(io_error(&temporary))?;
    fs::rename(&temporary, path).map_err(io_error(path))
}

fn make_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(|h| Cell::new(*h)).collect::<Vec<_>>());
    table
}

/// Console tables: proteins, global parameters and acceptance rates.
#[must_use]
pub fn render_tables(report: &SummaryReport) -> [Table; 3] {
    let mut proteins = make_table(&COLUMNS[1..]);
    for row in protein_rows(report) {
        proteins.add_row(row[1..].to_vec());
    }
    let mut globals = make_table(&COLUMNS[2..]);
    for row in global_rows(report) {
        globals.add_row(row[2..].to_vec());
    }
    let mut acceptance = make_table(&["block", "acceptance rate"]);
    for (block, rate) in report.acceptance {
        acceptance.add_row(vec![block.to_string(), format!("{rate:.3}")]);
    }
    [proteins, globals, acceptance]
}
