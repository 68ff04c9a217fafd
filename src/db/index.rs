//! Embedding index storage and the vector codec shared by every
//! embedding column.

use anyhow::Result;
use rusqlite::params;

use super::Database;

/// Denormalized nearest-neighbor entry. Multiple entries may reference
/// the same underlying entity under different kind tags.
#[derive(Debug, Clone)]
pub struct EmbeddingIndexEntry {
    pub id: i64,
    pub kind: String,
    pub vector: Vec<f32>,
    pub ref_id: i64,
}

impl Database {
    /// Insert an index entry outside of any ingest transaction.
    /// Ingestion writes its entry through `insert_image_record` instead.
    pub fn insert_index_entry(&self, kind: &str, vector: &[f32], ref_id: i64) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO embeddings_index (kind, vector, vector_dim, ref_id) VALUES (?, ?, ?, ?)",
            params![kind, embedding_to_bytes(vector), vector.len() as i64, ref_id],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn index_entries_for(&self, kind: &str) -> Result<Vec<EmbeddingIndexEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, kind, vector, ref_id FROM embeddings_index WHERE kind = ? ORDER BY id",
        )?;

        let entries = stmt
            .query_map([kind], |row| {
                let bytes: Vec<u8> = row.get(2)?;
                Ok(EmbeddingIndexEntry {
                    id: row.get(0)?,
                    kind: row.get(1)?,
                    vector: bytes_to_embedding(&bytes),
                    ref_id: row.get(3)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(entries)
    }

    pub fn count_index_entries(&self) -> Result<i64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM embeddings_index", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Convert f32 slice to bytes for storage
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &val in embedding {
        bytes.extend_from_slice(&val.to_le_bytes());
    }
    bytes
}

/// Convert bytes back to f32 vector
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| {
            let arr: [u8; 4] = chunk.try_into().unwrap();
            f32::from_le_bytes(arr)
        })
        .collect()
}

/// Calculate cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
