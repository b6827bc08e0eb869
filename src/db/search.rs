use super::models::Neighbor;
use super::{Collection, IndexError, serialize_vector};
use crate::indexer::chunker::ChunkMetadata;
use rusqlite::params;

const SEARCH_SQL: &str = r#"
    SELECT
        e.chunk_id,
        e.content,
        e.row_index,
        e.sentiment,
        e.source,
        e.date,
        e.user_id,
        e.location,
        e.confidence_score,
        e.chunk_index,
        e.char_start,
        e.char_end,
        vec_distance_cosine(v.embedding, ?) AS distance
    FROM vec_entries v
    JOIN entries e ON v.rowid = e.position
    ORDER BY distance ASC, e.position ASC
    LIMIT ?
"#;

fn map_neighbor_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Neighbor> {
    let distance: f64 = row.get(12)?;

    Ok(Neighbor {
        chunk_id: row.get(0)?,
        text: row.get(1)?,
        metadata: ChunkMetadata {
            row_index: row.get::<_, i64>(2)? as usize,
            sentiment: row.get(3)?,
            source: row.get(4)?,
            date: row.get(5)?,
            user_id: row.get(6)?,
            location: row.get(7)?,
            confidence_score: row.get(8)?,
            chunk_index: row.get::<_, i64>(9)? as usize,
            char_start: row.get::<_, i64>(10)? as usize,
            char_end: row.get::<_, i64>(11)? as usize,
        },
        similarity: 1.0 - distance,
    })
}

impl Collection {
    /// Exact cosine search over every entry.
    ///
    /// Ties on distance fall back to insertion order, so results are stable
    /// for a fixed collection.
    pub fn search(&self, query_vector: &[f32], limit: usize) -> Result<Vec<Neighbor>, IndexError> {
        if query_vector.len() != self.dimensions() {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions(),
                found: query_vector.len(),
            });
        }
        let limit = limit.min(self.len());
        if limit == 0 {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(SEARCH_SQL)?;
        let rows = stmt.query_map(
            params![serialize_vector(query_vector), limit as i64],
            map_neighbor_row,
        )?;

        let mut results = Vec::with_capacity(limit);
        for row in rows {
            results.push(row?);
        }

        Ok(results)
    }
}
