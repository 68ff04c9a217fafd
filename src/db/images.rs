//! Image rows and the atomic ingest write.

use anyhow::Result;
use rusqlite::{params, OptionalExtension};

use super::index::{bytes_to_embedding, embedding_to_bytes};
use super::labels::{insert_label, ImageLabel, LabelPayload};
use super::{now_timestamp, Database};

/// Parameters for one ingest write.
#[derive(Debug, Clone)]
pub struct NewImageRecord {
    pub filename: String,
    pub locator: String,
    pub listing_id: Option<i64>,
    pub embedding: Vec<f32>,
    pub text_embedding: Option<Vec<f32>>,
    pub labels: LabelPayload,
    /// Free-form metadata JSON (model version, decoded dimensions, ...).
    pub meta: Option<String>,
}

/// Persisted image row. Immutable once written except for metadata.
#[derive(Debug, Clone)]
pub struct Image {
    pub id: i64,
    pub listing_id: Option<i64>,
    pub filename: String,
    pub locator: String,
    pub embedding: Option<Vec<f32>>,
    pub text_embedding: Option<Vec<f32>>,
    pub meta: Option<String>,
    pub created_at: String,
}

/// Image joined with its most recent label, for the read path.
#[derive(Debug, Clone)]
pub struct ImageDetail {
    pub image: Image,
    pub label: Option<ImageLabel>,
}

impl Database {
    /// Write one image, its label row (if the payload is non-empty), and
    /// its embedding-index entry (if a text embedding is present) as a
    /// single transaction. A failure rolls back all three.
    pub fn insert_image_record(&self, record: &NewImageRecord) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;
        let created_at = now_timestamp();

        tx.execute(
            r#"
            INSERT INTO images (listing_id, filename, locator, embedding, text_embedding, meta, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                record.listing_id,
                record.filename,
                record.locator,
                embedding_to_bytes(&record.embedding),
                record.text_embedding.as_deref().map(embedding_to_bytes),
                record.meta,
                created_at,
            ],
        )?;
        let image_id = tx.last_insert_rowid();

        if !record.labels.is_empty() {
            insert_label(&tx, image_id, &record.labels, &created_at)?;
        }

        if let Some(text_embedding) = &record.text_embedding {
            tx.execute(
                "INSERT INTO embeddings_index (kind, vector, vector_dim, ref_id) VALUES (?, ?, ?, ?)",
                params![
                    "image",
                    embedding_to_bytes(text_embedding),
                    text_embedding.len() as i64,
                    image_id,
                ],
            )?;
        }

        tx.commit()?;
        Ok(image_id)
    }

    pub fn get_image(&self, image_id: i64) -> Result<Option<ImageDetail>> {
        let result = self
            .conn
            .query_row(
                r#"
                SELECT id, listing_id, filename, locator, embedding, text_embedding, meta, created_at
                FROM images WHERE id = ?
                "#,
                [image_id],
                |row| {
                    let embedding: Option<Vec<u8>> = row.get(4)?;
                    let text_embedding: Option<Vec<u8>> = row.get(5)?;
                    Ok(Image {
                        id: row.get(0)?,
                        listing_id: row.get(1)?,
                        filename: row.get(2)?,
                        locator: row.get(3)?,
                        embedding: embedding.as_deref().map(bytes_to_embedding),
                        text_embedding: text_embedding.as_deref().map(bytes_to_embedding),
                        meta: row.get(6)?,
                        created_at: row.get(7)?,
                    })
                },
            )
            .optional()?;

        let Some(image) = result else {
            return Ok(None);
        };

        let label = self.latest_label_for_image(image.id)?;
        Ok(Some(ImageDetail { image, label }))
    }

    pub fn image_created_at(&self, image_id: i64) -> Result<Option<String>> {
        let result = self
            .conn
            .query_row(
                "SELECT created_at FROM images WHERE id = ?",
                [image_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(result)
    }

    pub fn image_listing(&self, image_id: i64) -> Result<Option<Option<i64>>> {
        let result = self
            .conn
            .query_row(
                "SELECT listing_id FROM images WHERE id = ?",
                [image_id],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()?;
        Ok(result)
    }

    pub fn count_images_for_listing(&self, listing_id: i64) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM images WHERE listing_id = ?",
            [listing_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn count_images(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Candidate rows for similarity ranking: id plus the selected
    /// embedding column, null embeddings excluded, in insertion order.
    pub fn embedding_candidates(
        &self,
        listing_id: Option<i64>,
        use_text_embedding: bool,
    ) -> Result<Vec<(i64, Vec<f32>)>> {
        let column = if use_text_embedding {
            "text_embedding"
        } else {
            "embedding"
        };

        let candidates = match listing_id {
            Some(listing_id) => {
                let sql = format!(
                    "SELECT id, {column} FROM images \
                     WHERE {column} IS NOT NULL AND listing_id = ? ORDER BY id"
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([listing_id], |row| {
                        let bytes: Vec<u8> = row.get(1)?;
                        Ok((row.get::<_, i64>(0)?, bytes_to_embedding(&bytes)))
                    })?
                    .filter_map(|r| r.ok())
                    .collect();
                rows
            }
            None => {
                let sql = format!(
                    "SELECT id, {column} FROM images WHERE {column} IS NOT NULL ORDER BY id"
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], |row| {
                        let bytes: Vec<u8> = row.get(1)?;
                        Ok((row.get::<_, i64>(0)?, bytes_to_embedding(&bytes)))
                    })?
                    .filter_map(|r| r.ok())
                    .collect();
                rows
            }
        };

        Ok(candidates)
    }
}
