use super::analyzer::StructureReport;
use super::parser::{ParseError, ParseErrorKind};

// merged result of the structural and typed passes
#[derive(Debug)]
pub enum Verdict {
    Clean,
    Warnings(Vec<ParseError>),
    Fatal {
        structure: StructureReport,
        parse_errors: Vec<ParseError>,
    },
}

// a structural mismatch always wins; typed-parse errors alone are advisory
pub fn reconcile(structure: &StructureReport, parse_errors: Vec<ParseError>) -> Verdict {
    if !structure.is_well_formed() {
        Verdict::Fatal {
            structure: structure.clone(),
            parse_errors,
        }
    } else if parse_errors.is_empty() {
        Verdict::Clean
    } else {
        Verdict::Warnings(parse_errors)
    }
}

pub fn check_conflict_key(headers: &[String], conflict_key: &str) -> Option<ParseError> {
    if headers.iter().any(|h| h == conflict_key) {
        None
    } else {
        Some(ParseError {
            line: Some(1),
            kind: ParseErrorKind::MissingConflictKey,
            message: format!("conflict key \"{}\" is not a column of the header", conflict_key),
        })
    }
}
