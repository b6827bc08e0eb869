/// Dataset loading for the sentiment CSV export.
///
/// Reads the file line by line, repairs the quoting quirks of the export,
/// parses the result with the `csv` crate, and hands out one [`Record`] per
/// data row with a 1-based `row_index`.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

/// Errors that can occur while loading the dataset.
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("dataset not found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("dataset {0} is empty")]
    Empty(String),

    #[error("row {row} has {found} columns but expected {expected}")]
    RowLength {
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("failed to read dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// One input row keyed by header name.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub row_index: usize,
    fields: HashMap<String, String>,
}

impl Record {
    pub fn new(row_index: usize, fields: HashMap<String, String>) -> Self {
        Self { row_index, fields }
    }

    /// Build a record from `(field, value)` pairs.
    pub fn from_pairs<I, K, V>(row_index: usize, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let fields = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self { row_index, fields }
    }

    /// Field value, or the empty string when the column is absent.
    pub fn get(&self, field: &str) -> &str {
        self.fields.get(field).map(String::as_str).unwrap_or("")
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

/// Load and parse the dataset at `path`.
pub fn load_dataset<P: AsRef<Path>>(path: P) -> Result<Vec<Record>, DatasetError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(DatasetError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)?;
    let records = parse_dataset(&content).map_err(|e| match e {
        DatasetError::Empty(_) => DatasetError::Empty(path.display().to_string()),
        other => other,
    })?;

    info!(path = %path.display(), records = records.len(), "dataset loaded");
    Ok(records)
}

/// Parse dataset text whose first non-blank line is the header.
pub fn parse_dataset(content: &str) -> Result<Vec<Record>, DatasetError> {
    let sanitized: Vec<String> = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(sanitize_line)
        .filter(|line| !line.is_empty())
        .collect();

    if sanitized.is_empty() {
        return Err(DatasetError::Empty("<input>".to_string()));
    }

    let joined = sanitized.join("\n");
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(joined.as_bytes());

    let mut rows = reader.records();
    let header: Vec<String> = match rows.next() {
        Some(row) => row?.iter().map(|cell| cell.trim().to_string()).collect(),
        None => return Err(DatasetError::Empty("<input>".to_string())),
    };

    let mut records = Vec::new();
    for (offset, row) in rows.enumerate() {
        let row = row?;
        let row_index = offset + 1;
        if row.len() != header.len() {
            return Err(DatasetError::RowLength {
                row: row_index,
                found: row.len(),
                expected: header.len(),
            });
        }

        let fields = header
            .iter()
            .zip(row.iter())
            .map(|(name, value)| (name.clone(), value.trim().to_string()))
            .collect();
        records.push(Record::new(row_index, fields));
    }

    Ok(records)
}

/// Undo the export's habit of wrapping whole lines in quotes and doubling
/// the inner ones.
fn sanitize_line(line: &str) -> String {
    let mut stripped = line.trim();
    if stripped.len() >= 2 && stripped.starts_with('"') && stripped.ends_with('"') {
        stripped = &stripped[1..stripped.len() - 1];
    }
    stripped.replace("\"\"", "\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "Text,Sentiment,Source,Date/Time,User ID,Location,Confidence Score";

    #[test]
    fn test_parse_basic_rows() {
        let csv = format!(
            "{HEADER}\nGreat service,Positive,Twitter,2023-06-15 09:23:14,@user1,New York,0.85\n\
             Slow delivery,Negative,Email,2023-06-16 10:00:00,@user2,Boston,0.70\n"
        );
        let records = parse_dataset(&csv).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].row_index, 1);
        assert_eq!(records[1].row_index, 2);
        assert_eq!(records[0].get("Text"), "Great service");
        assert_eq!(records[1].get("Location"), "Boston");
        assert_eq!(records[0].field_count(), 7);
    }

    #[test]
    fn test_parse_skips_blank_lines_and_trims() {
        let csv = format!("\n{HEADER}\n\n  Nice ,  Positive ,Web,d,u,l, 0.9 \n\n");
        let records = parse_dataset(&csv).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("Text"), "Nice");
        assert_eq!(records[0].get("Confidence Score"), "0.9");
    }

    #[test]
    fn test_sanitize_wrapped_lines() {
        let csv = "\"Text,Sentiment\"\n\"\"\"Loved it, really\"\",Positive\"\n";
        let records = parse_dataset(csv).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("Text"), "Loved it, really");
        assert_eq!(records[0].get("Sentiment"), "Positive");
    }

    #[test]
    fn test_row_length_mismatch() {
        let csv = "a,b,c\n1,2,3\n4,5\n";
        match parse_dataset(csv) {
            Err(DatasetError::RowLength {
                row,
                found,
                expected,
            }) => {
                assert_eq!(row, 2);
                assert_eq!(found, 2);
                assert_eq!(expected, 3);
            }
            other => panic!("expected RowLength, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(parse_dataset("  \n\n"), Err(DatasetError::Empty(_))));
    }

    #[test]
    fn test_header_only_yields_no_records() {
        let records = parse_dataset(HEADER).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_missing_field_reads_empty() {
        let record = Record::from_pairs(3, [("Text", "hi")]);
        assert_eq!(record.get("Sentiment"), "");
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_dataset("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, DatasetError::NotFound(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{HEADER}").unwrap();
        writeln!(file, "Great service,Positive,Twitter,d,u,l,0.5").unwrap();
        let records = load_dataset(file.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("Source"), "Twitter");
    }

    #[test]
    fn test_load_empty_file_reports_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = load_dataset(file.path()).unwrap_err();
        match err {
            DatasetError::Empty(name) => assert!(name.contains(
                file.path().file_name().unwrap().to_str().unwrap()
            )),
            other => panic!("expected Empty, got {other:?}"),
        }
    }
}
