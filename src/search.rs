//! Similarity search over stored embeddings.
//!
//! Ranking is a full scan with cosine similarity; candidates with a
//! null embedding in the selected column never enter the scan. The sort
//! is stable, so equal scores keep insertion order.

use crate::db::{cosine_similarity, Database};
use crate::error::{HomelensError, Result};

/// One ranked image match joined with its label metadata.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub image_id: i64,
    pub filename: String,
    pub locator: String,
    pub room_type: Option<String>,
    pub room_confidence: Option<f64>,
    pub features: Vec<String>,
    pub condition_score: Option<f64>,
    pub natural_light_score: Option<f64>,
    pub similarity: f32,
}

/// One ranked prior-message match.
#[derive(Debug, Clone)]
pub struct MessageHit {
    pub message_id: i64,
    pub role: String,
    pub text: String,
    pub similarity: f32,
}

pub struct SearchEngine {
    image_dim: usize,
    text_dim: usize,
}

impl SearchEngine {
    pub fn new(image_dim: usize, text_dim: usize) -> Self {
        Self {
            image_dim,
            text_dim,
        }
    }

    /// Rank stored images against a query vector.
    ///
    /// `use_text_embedding` selects the caption-space column, serving
    /// text-to-image queries without recomputing anything; otherwise the
    /// image-embedding column serves image-to-image queries.
    pub fn search(
        &self,
        db: &Database,
        query: &[f32],
        k: usize,
        listing_id: Option<i64>,
        use_text_embedding: bool,
    ) -> Result<Vec<SearchHit>> {
        let expected = if use_text_embedding {
            self.text_dim
        } else {
            self.image_dim
        };
        if query.len() != expected {
            return Err(HomelensError::InvalidDimension {
                expected,
                got: query.len(),
            });
        }

        let candidates = db
            .embedding_candidates(listing_id, use_text_embedding)
            .map_err(HomelensError::Persistence)?;

        let mut scored: Vec<(i64, f32)> = candidates
            .iter()
            .map(|(image_id, embedding)| (*image_id, cosine_similarity(query, embedding)))
            .collect();

        // Stable sort: ties keep insertion order
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        let mut hits = Vec::with_capacity(scored.len());
        for (image_id, similarity) in scored {
            let Some(detail) = db.get_image(image_id).map_err(HomelensError::Persistence)? else {
                continue;
            };
            let label = detail.label;
            hits.push(SearchHit {
                image_id,
                filename: detail.image.filename,
                locator: detail.image.locator,
                room_type: label.as_ref().and_then(|l| l.room_type.clone()),
                room_confidence: label.as_ref().and_then(|l| l.room_confidence),
                features: label.as_ref().map(|l| l.features.clone()).unwrap_or_default(),
                condition_score: label.as_ref().and_then(|l| l.condition_score),
                natural_light_score: label.as_ref().and_then(|l| l.natural_light_score),
                similarity,
            });
        }

        Ok(hits)
    }

    /// Rank one conversation's prior messages against a query vector.
    pub fn search_messages(
        &self,
        db: &Database,
        conversation_id: i64,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<MessageHit>> {
        if query.len() != self.text_dim {
            return Err(HomelensError::InvalidDimension {
                expected: self.text_dim,
                got: query.len(),
            });
        }

        let messages = db
            .embedded_messages(conversation_id)
            .map_err(HomelensError::Persistence)?;

        let mut hits: Vec<MessageHit> = messages
            .into_iter()
            .filter_map(|m| {
                let embedding = m.embedding.as_deref()?;
                Some(MessageHit {
                    message_id: m.id,
                    role: m.role,
                    text: m.text,
                    similarity: cosine_similarity(query, embedding),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{LabelPayload, NewImageRecord};
    use tempfile::TempDir;

    fn test_db(dir: &TempDir) -> Database {
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        db.initialize().unwrap();
        db
    }

    fn insert_image(
        db: &Database,
        filename: &str,
        listing_id: Option<i64>,
        embedding: Vec<f32>,
        text_embedding: Option<Vec<f32>>,
    ) -> i64 {
        db.insert_image_record(&NewImageRecord {
            filename: filename.to_string(),
            locator: format!("fs://{filename}"),
            listing_id,
            embedding,
            text_embedding,
            labels: LabelPayload::default(),
            meta: None,
        })
        .unwrap()
    }

    #[test]
    fn ranks_by_decreasing_similarity() {
        let dir = TempDir::new().unwrap();
        let db = test_db(&dir);
        let engine = SearchEngine::new(3, 4);

        insert_image(&db, "far.jpg", None, vec![0.0, 1.0, 0.0], None);
        let near = insert_image(&db, "near.jpg", None, vec![1.0, 0.0, 0.0], None);
        insert_image(&db, "mid.jpg", None, vec![0.7, 0.7, 0.0], None);

        let hits = engine
            .search(&db, &[1.0, 0.0, 0.0], 10, None, false)
            .unwrap();

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].image_id, near);
        for pair in hits.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
        for hit in &hits {
            assert!(hit.similarity >= -1.0 && hit.similarity <= 1.0);
        }
    }

    #[test]
    fn truncates_to_k_and_k_zero_is_empty() {
        let dir = TempDir::new().unwrap();
        let db = test_db(&dir);
        let engine = SearchEngine::new(2, 4);

        for i in 0..5 {
            insert_image(&db, &format!("{i}.jpg"), None, vec![1.0, i as f32], None);
        }

        assert_eq!(engine.search(&db, &[1.0, 0.0], 2, None, false).unwrap().len(), 2);
        assert!(engine.search(&db, &[1.0, 0.0], 0, None, false).unwrap().is_empty());
    }

    #[test]
    fn empty_store_returns_empty() {
        let dir = TempDir::new().unwrap();
        let db = test_db(&dir);
        let engine = SearchEngine::new(2, 4);

        assert!(engine.search(&db, &[1.0, 0.0], 5, None, false).unwrap().is_empty());
    }

    #[test]
    fn dimension_mismatch_rejected_before_store_access() {
        let dir = TempDir::new().unwrap();
        let db = test_db(&dir);
        let engine = SearchEngine::new(3, 4);

        let err = engine.search(&db, &[1.0, 0.0], 5, None, false).unwrap_err();
        assert!(matches!(
            err,
            HomelensError::InvalidDimension { expected: 3, got: 2 }
        ));

        let err = engine.search(&db, &[1.0; 3], 5, None, true).unwrap_err();
        assert!(matches!(
            err,
            HomelensError::InvalidDimension { expected: 4, got: 3 }
        ));
    }

    #[test]
    fn text_search_skips_rows_without_text_embedding() {
        let dir = TempDir::new().unwrap();
        let db = test_db(&dir);
        let engine = SearchEngine::new(3, 4);

        insert_image(&db, "image-only.jpg", None, vec![1.0, 0.0, 0.0], None);
        let with_text = insert_image(
            &db,
            "with-text.jpg",
            None,
            vec![1.0, 0.0, 0.0],
            Some(vec![0.5, 0.5, 0.0, 0.0]),
        );

        let hits = engine
            .search(&db, &[0.5, 0.5, 0.0, 0.0], 10, None, true)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].image_id, with_text);
    }

    #[test]
    fn listing_filter_restricts_candidates() {
        let dir = TempDir::new().unwrap();
        let db = test_db(&dir);
        let engine = SearchEngine::new(2, 4);

        let listing = db
            .create_listing(&crate::db::NewListing {
                address: "12 Elm St".to_string(),
                ..Default::default()
            })
            .unwrap();

        let inside = insert_image(&db, "in.jpg", Some(listing), vec![1.0, 0.0], None);
        insert_image(&db, "out.jpg", None, vec![1.0, 0.0], None);

        let hits = engine
            .search(&db, &[1.0, 0.0], 10, Some(listing), false)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].image_id, inside);
    }
}
