use csv::ReaderBuilder;
use std::fmt;
use tracing::debug;
use super::error::Result;

pub const DEFAULT_SAMPLE_ROWS: usize = 3;
pub const EMPTY_MARKER: &str = "<empty>";

// outcome of the structural pass over the raw rows
#[derive(Debug, Clone)]
pub struct StructureReport {
    pub file_path: String,
    pub header: Vec<String>,
    pub valid_count: usize,
    pub invalid_count: usize,
    pub problem_rows: Vec<ProblemRow>,
}

impl StructureReport {
    pub fn is_well_formed(&self) -> bool {
        self.invalid_count == 0
    }
}

// a data row whose cell count differs from the header
#[derive(Debug, Clone, PartialEq)]
pub struct ProblemRow {
    // 0 is the header
    pub index: usize,
    pub line: u64,
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnComparison {
    Matched {
        index: usize,
        header: String,
        value: Option<String>,
    },
    Excess {
        index: usize,
        value: String,
    },
}

impl ProblemRow {
    // pair every column with its header name, up to the wider of the two
    pub fn compare(&self, header: &[String]) -> Vec<ColumnComparison> {
        let width = header.len().max(self.cells.len());

        (0..width)
            .map(|i| match header.get(i) {
                Some(name) => ColumnComparison::Matched {
                    index: i,
                    header: strip_quotes(name),
                    value: self.cells.get(i).map(|v| strip_quotes(v)),
                },
                None => ColumnComparison::Excess {
                    index: i,
                    value: self.cells[i].to_owned(),
                },
            })
            .collect()
    }
}

impl fmt::Display for ColumnComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnComparison::Matched { index, header, value } => {
                let value = match value {
                    Some(v) if !v.is_empty() => v.as_str(),
                    _ => EMPTY_MARKER,
                };
                write!(f, "[{}] {}: {}", index + 1, header, value)
            }
            ColumnComparison::Excess { index, value } => {
                write!(f, "[{}] (excess column): {}", index + 1, value)
            }
        }
    }
}

// tokenize the whole file and check every row against the header width
// blank lines are skipped by the csv reader and never counted
pub fn analyze(content: &str, file_path: &str, sample_limit: usize) -> Result<StructureReport> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut report = StructureReport {
        file_path: file_path.to_owned(),
        header: Vec::new(),
        valid_count: 0,
        invalid_count: 0,
        problem_rows: Vec::new(),
    };

    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let cells: Vec<String> = record.iter().map(|c| c.to_owned()).collect();

        if index == 0 {
            report.header = cells;
            continue;
        }

        if cells.len() == report.header.len() {
            report.valid_count += 1;
        } else {
            report.invalid_count += 1;
            if report.problem_rows.len() < sample_limit {
                let line = record.position().map(|p| p.line()).unwrap_or_default();
                report.problem_rows.push(ProblemRow { index, line, cells });
            }
        }
    }

    debug!(
        file = file_path,
        valid = report.valid_count,
        invalid = report.invalid_count,
        "structure analyzed"
    );

    Ok(report)
}

fn strip_quotes(text: &str) -> String {
    text.replace('"', "")
}
