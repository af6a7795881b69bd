//! Record extractor implementations
//!
//! Each extractor turns a response body into records.

use super::path::select_all;
use crate::error::{Error, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Turns a response body into records
pub trait RecordExtractor: Send + Sync {
    fn extract_records(&self, body: &str) -> Result<Vec<Value>>;
}

/// Extractor configuration as written in a stream definition
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtractorConfig {
    /// JSON body, records under `field_path`
    Json {
        #[serde(default)]
        field_path: Option<String>,
    },
    /// One JSON document per line
    Jsonl,
    /// Delimited text
    Csv {
        #[serde(default = "default_delimiter")]
        delimiter: char,
        #[serde(default = "default_true")]
        has_header: bool,
    },
}

fn default_delimiter() -> char {
    ','
}

fn default_true() -> bool {
    true
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self::Json { field_path: None }
    }
}

impl ExtractorConfig {
    pub fn build(&self) -> Box<dyn RecordExtractor> {
        match self {
            Self::Json { field_path } => Box::new(DpathExtractor {
                field_path: field_path.clone(),
            }),
            Self::Jsonl => Box::new(JsonlExtractor),
            Self::Csv {
                delimiter,
                has_header,
            } => Box::new(CsvExtractor::new(*delimiter, *has_header)),
        }
    }
}

// ============================================================================
// JSON
// ============================================================================

/// JSON body with records at a field path
///
/// Without a path, an array body yields its items and any other body is a
/// single record. An empty body yields no record.
#[derive(Debug, Clone, Default)]
pub struct DpathExtractor {
    field_path: Option<String>,
}

impl DpathExtractor {
    pub fn new(field_path: impl Into<String>) -> Self {
        Self {
            field_path: Some(field_path.into()),
        }
    }

    /// Records from an already parsed document
    pub fn extract_from_value(&self, value: &Value) -> Result<Vec<Value>> {
        select_all(value, self.field_path.as_deref().unwrap_or(""))
    }
}

impl RecordExtractor for DpathExtractor {
    fn extract_records(&self, body: &str) -> Result<Vec<Value>> {
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        let value: Value = serde_json::from_str(body)
            .map_err(|e| Error::decode(format!("Failed to parse JSON: {e}")))?;
        self.extract_from_value(&value)
    }
}

// ============================================================================
// JSON Lines
// ============================================================================

/// JSON Lines body, blank lines skipped
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonlExtractor;

impl RecordExtractor for JsonlExtractor {
    fn extract_records(&self, body: &str) -> Result<Vec<Value>> {
        body.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(number, line)| {
                serde_json::from_str(line).map_err(|e| {
                    Error::decode(format!("Failed to parse JSONL at line {}: {e}", number + 1))
                })
            })
            .collect()
    }
}

// ============================================================================
// CSV
// ============================================================================

/// Delimited text; values are kept as strings
///
/// Quoted fields may contain the delimiter, doubled quotes and line breaks.
/// Without a header, columns are named `column_0`, `column_1`, ...
#[derive(Debug, Clone)]
pub struct CsvExtractor {
    delimiter: char,
    has_header: bool,
}

impl Default for CsvExtractor {
    fn default() -> Self {
        Self::new(',', true)
    }
}

impl CsvExtractor {
    pub fn new(delimiter: char, has_header: bool) -> Self {
        Self {
            delimiter,
            has_header,
        }
    }
}

impl RecordExtractor for CsvExtractor {
    fn extract_records(&self, body: &str) -> Result<Vec<Value>> {
        let mut rows = split_rows(body, self.delimiter)?.into_iter();

        let header: Vec<String> = if self.has_header {
            match rows.next() {
                Some(header) => header,
                None => return Ok(Vec::new()),
            }
        } else {
            Vec::new()
        };

        Ok(rows
            .map(|row| {
                let record: Map<String, Value> = row
                    .into_iter()
                    .enumerate()
                    .map(|(i, field)| {
                        let name = header
                            .get(i)
                            .cloned()
                            .unwrap_or_else(|| format!("column_{i}"));
                        (name, Value::String(field))
                    })
                    .collect();
                Value::Object(record)
            })
            .collect())
    }
}

fn split_rows(body: &str, delimiter: char) -> Result<Vec<Vec<String>>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            c if c == delimiter && !in_quotes => row.push(std::mem::take(&mut field)),
            '\r' if !in_quotes => {}
            '\n' if !in_quotes => {
                row.push(std::mem::take(&mut field));
                if !(row.len() == 1 && row[0].is_empty()) {
                    rows.push(std::mem::take(&mut row));
                }
                row.clear();
            }
            c => field.push(c),
        }
    }

    if in_quotes {
        return Err(Error::decode("Unterminated quoted field in CSV body"));
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    Ok(rows)
}
