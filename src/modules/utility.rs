use colored::*;
use csv::{QuoteStyle, WriterBuilder};
use itertools::Itertools;
use std::path::Path;
use super::analyzer::StructureReport;
use super::batch::{RunSummary, UpsertOutcome};
use super::error::{ImportError, UpsertError};
use super::parser::{ParseError, Record};

// helper to print one line per finished batch
// example:
//   ✓ batch 1/3 (50 records)
//   ✗ batch 2/3 failed: 500: boom
pub struct ProgressPrinter {
    total_batches: usize,
}

impl ProgressPrinter {
    pub fn new(total_batches: usize) -> ProgressPrinter {
        ProgressPrinter { total_batches }
    }

    pub fn batch_done(&mut self, current: usize, size: usize) {
        println!(
            "  {} batch {}/{} ({} records)",
            "✓".green(),
            current,
            self.total_batches,
            size
        );
    }

    pub fn batch_failed(&mut self, current: usize, error: &UpsertError) {
        eprintln!(
            "  {} batch {}/{} failed: {}",
            "✗".red(),
            current,
            self.total_batches,
            error
        );
        if let UpsertError::Api { code, details, hint, .. } = error {
            for (label, text) in &[("code", code), ("details", details), ("hint", hint)] {
                if let Some(text) = text {
                    eprintln!("      {}: {}", label, text.dimmed());
                }
            }
        }
    }
}

// detailed diagnostic of the sampled malformed rows
pub fn print_structure_report(report: &StructureReport) {
    eprintln!(
        "{} {} has {} row(s) whose column count differs from the header ({} columns)",
        "Invalid CSV:".red().bold(),
        report.file_path,
        report.invalid_count,
        report.header.len()
    );
    eprintln!(
        "Header: {}",
        report.header.iter().map(|h| h.replace('"', "")).join(" | ").cyan()
    );

    for row in &report.problem_rows {
        eprintln!();
        eprintln!(
            "{} row {} (line {}): {} columns, expected {}",
            "→".yellow(),
            row.index,
            row.line,
            row.cells.len(),
            report.header.len()
        );
        for column in row.compare(&report.header) {
            eprintln!("    {}", column);
        }
    }

    let hidden = report.invalid_count.saturating_sub(report.problem_rows.len());
    if hidden > 0 {
        eprintln!();
        eprintln!("... and {} more malformed row(s)", hidden);
    }
    eprintln!();
}

pub fn print_parse_warnings(warnings: &[ParseError]) {
    println!("{} {} warning(s) while parsing:", "Warning:".yellow().bold(), warnings.len());
    for warning in warnings {
        println!("  - {}", warning);
    }
}

pub fn print_summary(summary: &RunSummary) {
    println!();
    let line = format!(
        "{}/{} records upserted. Error rate: {:.2}%",
        summary.success_count,
        summary.total_records,
        summary.error_rate()
    );
    if summary.failed_batches() == 0 {
        println!("{}", line.green().bold());
    } else {
        println!("{}", line.yellow().bold());
        println!("{} of {} batch(es) failed:", summary.failed_batches(), summary.batches.len());
        for batch in &summary.batches {
            if let UpsertOutcome::Failed(error) = &batch.outcome {
                println!("  batch {} ({} records): {}", batch.index, batch.size, error);
            }
        }
    }
}

// save records to a csv as they were read, every column quoted
pub fn write_failed_items(path: &Path, header: &[String], records: &[Record]) -> Result<(), ImportError> {
    let io_error = |source: std::io::Error| ImportError::Io {
        path: path.display().to_string(),
        source,
    };

    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_path(path)?;

    writer.write_record(header)?;
    for record in records {
        writer.write_record(record.raw_cells())?;
    }
    writer.flush().map_err(io_error)?;

    Ok(())
}
