use csv::ReaderBuilder;
use itertools::Itertools;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::fmt;
use super::error::Result;

// one typed row, keyed by header name
// the original cell text is kept so a failed row can be saved as it was read
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
    #[serde(skip)]
    raw: Vec<String>,
}

impl Record {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn raw_cells(&self) -> &[String] {
        &self.raw
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Record {
        let raw = fields.values().map(cell_text).collect();
        Record { fields, raw }
    }
}

// text form of a typed value, null becomes an empty cell
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.to_owned(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParseErrorKind {
    FieldMismatch,
    Malformed,
    DuplicateHeader,
    MissingConflictKey,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub line: Option<u64>,
    pub kind: ParseErrorKind,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {}: {:?}: {}", line, self.kind, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

impl From<csv::Error> for ParseError {
    fn from(error: csv::Error) -> ParseError {
        let line = error.position().map(|p| p.line());
        let kind = match error.kind() {
            csv::ErrorKind::UnequalLengths { .. } => ParseErrorKind::FieldMismatch,
            _ => ParseErrorKind::Malformed,
        };
        ParseError { line, kind, message: error.to_string() }
    }
}

#[derive(Debug, Default)]
pub struct ParsedCsv {
    pub headers: Vec<String>,
    pub records: Vec<Record>,
    pub errors: Vec<ParseError>,
}

// typed pass: header row names the fields, every cell is coerced
// a bad row is recorded in `errors` and skipped, the rest is still parsed
pub fn parse(content: &str) -> Result<ParsedCsv> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_owned()).collect();
    let mut parsed = ParsedCsv {
        headers,
        ..Default::default()
    };

    for name in parsed.headers.iter().duplicates() {
        parsed.errors.push(ParseError {
            line: Some(1),
            kind: ParseErrorKind::DuplicateHeader,
            message: format!("column \"{}\" appears more than once, later values win", name),
        });
    }

    for result in reader.records() {
        match result {
            Ok(row) => {
                let fields: Map<String, Value> = parsed
                    .headers
                    .iter()
                    .zip(row.iter())
                    .map(|(name, cell)| (name.to_owned(), parse_cell(cell)))
                    .collect();
                let raw = row.iter().map(|cell| cell.to_owned()).collect();
                parsed.records.push(Record { fields, raw });
            }
            Err(error) => parsed.errors.push(ParseError::from(error)),
        }
    }

    Ok(parsed)
}

// try to parse the cell as different types of value
// order: null (empty only), bool, number, string
pub fn parse_cell(text: &str) -> Value {
    if text.is_empty() {
        Value::Null
    } else if let Some(b) = parse_bool(text) {
        Value::Bool(b)
    } else if let Some(n) = parse_number(text) {
        Value::Number(n)
    } else {
        Value::String(text.to_owned())
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "true" | "TRUE" | "True" => Some(true),
        "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

fn parse_number(text: &str) -> Option<Number> {
    if !looks_numeric(text) {
        return None;
    }
    if let Ok(i) = text.parse::<i64>() {
        return Some(Number::from(i));
    }
    if let Ok(u) = text.parse::<u64>() {
        return Some(Number::from(u));
    }
    // an integer too wide for 64 bits stays text, a float would round it
    if !text.contains(|c: char| c == '.' || c == 'e' || c == 'E') {
        return None;
    }
    text.parse::<f64>().ok().and_then(Number::from_f64)
}

// sign, digits with at most one dot, optional exponent
// "007" stays text so identifiers keep their leading zeros
fn looks_numeric(text: &str) -> bool {
    let unsigned = text.strip_prefix('-').unwrap_or(text);
    let (mantissa, exponent) = match unsigned.find(|c: char| c == 'e' || c == 'E') {
        Some(pos) => (&unsigned[..pos], Some(&unsigned[pos + 1..])),
        None => (unsigned, None),
    };

    let mut parts = mantissa.splitn(2, '.');
    let integer = parts.next().unwrap_or_default();
    let fraction = parts.next();

    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if !all_digits(integer) || !fraction.map_or(true, all_digits) {
        return false;
    }
    if integer.is_empty() && fraction.map_or(true, str::is_empty) {
        return false;
    }
    if integer.len() > 1 && integer.starts_with('0') {
        return false;
    }

    match exponent {
        None => true,
        Some(exp) => {
            let digits = exp.strip_prefix(|c: char| c == '+' || c == '-').unwrap_or(exp);
            !digits.is_empty() && all_digits(digits)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn header_names_the_fields() {
        let parsed = parse("email,name\na@x.com,Alice\nb@x.com,Bob").unwrap();

        assert_eq!(parsed.headers, vec!["email", "name"]);
        assert_eq!(parsed.records.len(), 2);
        assert!(parsed.errors.is_empty());
        assert_eq!(parsed.records[1].get("name"), Some(&json!("Bob")));
    }

    #[test]
    fn empty_cells_become_null() {
        let parsed = parse("a,b,c\n,x,\n").unwrap();
        let record = &parsed.records[0];

        assert_eq!(record.get("a"), Some(&Value::Null));
        assert_eq!(record.get("b"), Some(&json!("x")));
        assert_eq!(record.get("c"), Some(&Value::Null));
    }

    #[test]
    fn cells_are_coerced() {
        assert_eq!(parse_cell("42"), json!(42));
        assert_eq!(parse_cell("-3.5"), json!(-3.5));
        assert_eq!(parse_cell("1e3"), json!(1000.0));
        assert_eq!(parse_cell(".5"), json!(0.5));
        assert_eq!(parse_cell("0"), json!(0));
        assert_eq!(parse_cell("0.25"), json!(0.25));
        assert_eq!(parse_cell("true"), json!(true));
        assert_eq!(parse_cell("FALSE"), json!(false));
        assert_eq!(parse_cell("yes"), json!("yes"));
        assert_eq!(parse_cell(" "), json!(" "));
        assert_eq!(parse_cell("null"), json!("null"));
    }

    #[test]
    fn number_like_text_stays_text() {
        for text in &["007", "NaN", "inf", "1.2.3", "12abc", "+5", "-", ".", "1e", "0x10"] {
            assert_eq!(parse_cell(text), json!(text), "{}", text);
        }
    }

    #[test]
    fn mismatched_row_is_collected_and_skipped() {
        let parsed = parse("a,b,c\n1,2\n4,5,6\n").unwrap();

        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].get("a"), Some(&json!(4)));
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].kind, ParseErrorKind::FieldMismatch);
        assert_eq!(parsed.errors[0].line, Some(2));
    }

    #[test]
    fn duplicate_headers_are_reported() {
        let parsed = parse("id,name,name\n1,a,b\n").unwrap();

        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].kind, ParseErrorKind::DuplicateHeader);
        assert_eq!(parsed.records[0].get("name"), Some(&json!("b")));
    }

    #[test]
    fn records_serialize_as_objects_in_header_order() {
        let parsed = parse("id,score,active\n7,,true\n").unwrap();
        let text = serde_json::to_string(&parsed.records).unwrap();

        assert_eq!(text, r#"[{"id":7,"score":null,"active":true}]"#);
    }

    #[test]
    fn wide_integers_keep_their_digits() {
        assert_eq!(parse_cell("18446744073709551615"), json!(18446744073709551615u64));
        assert_eq!(parse_cell("12345678901234567891"), json!(12345678901234567891u64));
        assert_eq!(parse_cell("123456789012345678901234"), json!("123456789012345678901234"));
        assert_eq!(parse_cell("-99999999999999999999"), json!("-99999999999999999999"));

        let parsed = parse("id,name\n12345678901234567891,a\n").unwrap();
        let text = serde_json::to_string(&parsed.records).unwrap();
        assert_eq!(text, r#"[{"id":12345678901234567891,"name":"a"}]"#);
    }

    #[test]
    fn original_cell_text_is_kept() {
        let parsed = parse("id,price,code\n1,1.50,1e3\n").unwrap();
        let record = &parsed.records[0];

        assert_eq!(record.get("price"), Some(&json!(1.5)));
        assert_eq!(record.raw_cells(), &["1", "1.50", "1e3"]);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let parsed = parse("a\n\n1\n\n2\n").unwrap();
        assert_eq!(parsed.records.len(), 2);
    }
}
