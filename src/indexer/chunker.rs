//! Record-to-chunk decomposition.
//!
//! Every record is rendered through a fixed template into a single
//! whitespace-normalized line, then cut into overlapping fixed-size windows.
//! Offsets are counted in `char`s, never bytes.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::Record;

pub const FIELD_TEXT: &str = "Text";
pub const FIELD_SENTIMENT: &str = "Sentiment";
pub const FIELD_SOURCE: &str = "Source";
pub const FIELD_DATE: &str = "Date/Time";
pub const FIELD_USER_ID: &str = "User ID";
pub const FIELD_LOCATION: &str = "Location";
pub const FIELD_CONFIDENCE: &str = "Confidence Score";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChunkError {
    #[error("chunk size ({chunk_size}) must be greater than the overlap ({chunk_overlap})")]
    InvalidConfiguration {
        chunk_size: usize,
        chunk_overlap: usize,
    },
}

/// Structured metadata copied onto every chunk of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub row_index: usize,
    pub sentiment: String,
    pub source: String,
    pub date: String,
    pub user_id: String,
    pub location: String,
    pub confidence_score: f64,
    pub chunk_index: usize,
    pub char_start: usize,
    pub char_end: usize,
}

/// A bounded window of one record's rendered text.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Stable chunk identifier.
pub fn chunk_id(row_index: usize, chunk_index: usize) -> String {
    format!("record-{row_index}-chunk-{chunk_index}")
}

/// Render a record through the fixed template, collapsing whitespace runs.
pub fn render_record(record: &Record) -> String {
    let rendered = format!(
        "{} (Sentiment: {}, Source: {}, Date: {}, User: {}, Location: {}, Confidence: {}).",
        record.get(FIELD_TEXT).trim(),
        record.get(FIELD_SENTIMENT).trim(),
        record.get(FIELD_SOURCE).trim(),
        record.get(FIELD_DATE).trim(),
        record.get(FIELD_USER_ID).trim(),
        record.get(FIELD_LOCATION).trim(),
        record.get(FIELD_CONFIDENCE).trim(),
    );
    rendered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Half-open `[start, end)` windows over a text of `len` chars.
///
/// Callers must ensure `chunk_size > chunk_overlap`.
pub fn window_bounds(len: usize, chunk_size: usize, chunk_overlap: usize) -> Vec<(usize, usize)> {
    let mut windows = Vec::new();
    let mut start = 0;
    while start < len {
        let end = len.min(start + chunk_size);
        windows.push((start, end));
        if end >= len {
            break;
        }
        start = end.saturating_sub(chunk_overlap);
    }
    windows
}

/// Split records into overlapping character windows.
///
/// Output follows input record order, then ascending chunk index.
pub fn chunk_records(
    records: &[Record],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>, ChunkError> {
    if chunk_size <= chunk_overlap {
        return Err(ChunkError::InvalidConfiguration {
            chunk_size,
            chunk_overlap,
        });
    }

    let mut chunks = Vec::new();
    for record in records {
        let text = render_record(record);
        // Byte offset of every char boundary, including the end of the text.
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_len = boundaries.len() - 1;

        for (chunk_index, (start, end)) in window_bounds(char_len, chunk_size, chunk_overlap)
            .into_iter()
            .enumerate()
        {
            chunks.push(Chunk {
                id: chunk_id(record.row_index, chunk_index),
                text: text[boundaries[start]..boundaries[end]].to_string(),
                metadata: ChunkMetadata {
                    row_index: record.row_index,
                    sentiment: record.get(FIELD_SENTIMENT).to_string(),
                    source: record.get(FIELD_SOURCE).to_string(),
                    date: record.get(FIELD_DATE).to_string(),
                    user_id: record.get(FIELD_USER_ID).to_string(),
                    location: record.get(FIELD_LOCATION).to_string(),
                    confidence_score: parse_confidence(record.get(FIELD_CONFIDENCE)),
                    chunk_index,
                    char_start: start,
                    char_end: end,
                },
            });
        }
    }

    Ok(chunks)
}

/// Blank, unparsable, or non-finite values become `0.0`.
fn parse_confidence(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}
