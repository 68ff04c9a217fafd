//! Ingestion orchestrator: raw bytes to a persisted, embedded, labeled
//! image record.
//!
//! One inference call per image, then one transaction writing the image
//! row, its label row, and its index entry together. Failures are
//! terminal for the attempt; retry is the caller's business (a new job).

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::{Database, NewImageRecord};
use crate::error::{HomelensError, Result};
use crate::inference::Vision;

/// Compact label digest carried on job results.
#[derive(Debug, Clone, Serialize)]
pub struct LabelSummary {
    pub room_type: Option<String>,
    pub room_confidence: Option<f64>,
    pub condition_score: Option<f64>,
    pub natural_light_score: Option<f64>,
    pub feature_tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub image_id: i64,
    pub label_summary: Option<LabelSummary>,
}

pub struct Ingestor {
    vision: Arc<dyn Vision>,
    image_dim: usize,
    text_dim: usize,
}

impl Ingestor {
    pub fn new(vision: Arc<dyn Vision>, image_dim: usize, text_dim: usize) -> Self {
        Self {
            vision,
            image_dim,
            text_dim,
        }
    }

    /// Drive one image through inference and the atomic store write.
    ///
    /// `locator` is where the raw bytes already live in object storage;
    /// it is recorded on the image row verbatim.
    pub fn ingest(
        &self,
        db: &Database,
        raw_image: &[u8],
        filename: &str,
        locator: &str,
        listing_id: Option<i64>,
    ) -> Result<IngestOutcome> {
        let output = self
            .vision
            .infer(raw_image)
            .map_err(HomelensError::Inference)?;

        if output.image_embedding.len() != self.image_dim {
            return Err(HomelensError::Inference(anyhow::anyhow!(
                "image embedding has dimension {}, expected {}",
                output.image_embedding.len(),
                self.image_dim
            )));
        }
        if let Some(text_embedding) = &output.text_embedding {
            if text_embedding.len() != self.text_dim {
                return Err(HomelensError::Inference(anyhow::anyhow!(
                    "text embedding has dimension {}, expected {}",
                    text_embedding.len(),
                    self.text_dim
                )));
            }
        }

        let meta = image_meta(raw_image, output.labels.model_version.as_deref());

        let record = NewImageRecord {
            filename: filename.to_string(),
            locator: locator.to_string(),
            listing_id,
            embedding: output.image_embedding,
            text_embedding: output.text_embedding,
            labels: output.labels.clone(),
            meta: Some(meta),
        };

        let image_id = db
            .insert_image_record(&record)
            .map_err(HomelensError::Persistence)?;

        info!(image_id, filename, ?listing_id, "image ingested");

        let label_summary = if output.labels.is_empty() {
            None
        } else {
            Some(LabelSummary {
                room_type: output.labels.room_type.as_ref().map(|c| c.label.clone()),
                room_confidence: output.labels.room_type.as_ref().map(|c| c.confidence),
                condition_score: output.labels.condition_score,
                natural_light_score: output.labels.natural_light_score,
                feature_tags: output.labels.feature_tags.clone(),
            })
        };

        Ok(IngestOutcome {
            image_id,
            label_summary,
        })
    }
}

/// Metadata JSON for the image row: model provenance plus whatever the
/// decoder can tell us. Undecodable bytes still ingest; the dimensions
/// just stay out of the metadata.
fn image_meta(raw_image: &[u8], model_version: Option<&str>) -> String {
    let mut meta = serde_json::Map::new();
    meta.insert(
        "source".to_string(),
        serde_json::Value::from(model_version.unwrap_or("model_v1")),
    );
    meta.insert(
        "inference_timestamp".to_string(),
        serde_json::Value::from(chrono::Utc::now().to_rfc3339()),
    );

    match image::load_from_memory(raw_image) {
        Ok(decoded) => {
            meta.insert("width".to_string(), serde_json::Value::from(decoded.width()));
            meta.insert(
                "height".to_string(),
                serde_json::Value::from(decoded.height()),
            );
            if let Ok(format) = image::guess_format(raw_image) {
                meta.insert(
                    "format".to_string(),
                    serde_json::Value::from(format!("{:?}", format).to_lowercase()),
                );
            }
        }
        Err(e) => {
            warn!(error = %e, "could not decode image for metadata");
        }
    }

    serde_json::Value::Object(meta).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Classification, LabelPayload};
    use crate::inference::{StubModel, VisionOutput};
    use anyhow::anyhow;
    use tempfile::TempDir;

    fn test_db(dir: &TempDir) -> Database {
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        db.initialize().unwrap();
        db
    }

    struct FailingVision;

    impl Vision for FailingVision {
        fn infer(&self, _image_bytes: &[u8]) -> anyhow::Result<VisionOutput> {
            Err(anyhow!("model service unavailable"))
        }
    }

    struct EmptyLabelVision;

    impl Vision for EmptyLabelVision {
        fn infer(&self, _image_bytes: &[u8]) -> anyhow::Result<VisionOutput> {
            Ok(VisionOutput {
                labels: LabelPayload::default(),
                image_embedding: vec![0.5; 8],
                text_embedding: None,
            })
        }
    }

    #[test]
    fn ingest_writes_image_label_and_index_atomically() {
        let dir = TempDir::new().unwrap();
        let db = test_db(&dir);
        let ingestor = Ingestor::new(Arc::new(StubModel::new(1, 768, 1536)), 768, 1536);

        let outcome = ingestor
            .ingest(&db, b"jpeg bytes", "kitchen.jpg", "fs://k1", None)
            .unwrap();

        assert_eq!(db.count_images().unwrap(), 1);
        assert_eq!(db.count_labels().unwrap(), 1);
        assert_eq!(db.count_index_entries().unwrap(), 1);

        let detail = db.get_image(outcome.image_id).unwrap().unwrap();
        assert_eq!(detail.image.filename, "kitchen.jpg");
        assert_eq!(detail.image.locator, "fs://k1");
        assert_eq!(detail.label.unwrap().room_type.as_deref(), Some("kitchen"));
        let summary = outcome.label_summary.unwrap();
        assert_eq!(summary.room_type.as_deref(), Some("kitchen"));
    }

    #[test]
    fn ingesting_same_bytes_twice_creates_distinct_rows() {
        let dir = TempDir::new().unwrap();
        let db = test_db(&dir);
        let ingestor = Ingestor::new(Arc::new(StubModel::new(1, 768, 1536)), 768, 1536);

        let a = ingestor
            .ingest(&db, b"same bytes", "a.jpg", "fs://a", None)
            .unwrap();
        let b = ingestor
            .ingest(&db, b"same bytes", "a.jpg", "fs://b", None)
            .unwrap();

        assert_ne!(a.image_id, b.image_id);
        assert_eq!(db.count_images().unwrap(), 2);
        assert_eq!(db.count_labels().unwrap(), 2);
    }

    #[test]
    fn inference_failure_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let db = test_db(&dir);
        let ingestor = Ingestor::new(Arc::new(FailingVision), 768, 1536);

        let err = ingestor
            .ingest(&db, b"bytes", "x.jpg", "fs://x", None)
            .unwrap_err();

        assert!(matches!(err, HomelensError::Inference(_)));
        assert_eq!(db.count_images().unwrap(), 0);
        assert_eq!(db.count_labels().unwrap(), 0);
        assert_eq!(db.count_index_entries().unwrap(), 0);
    }

    #[test]
    fn wrong_embedding_dimension_is_malformed_output() {
        let dir = TempDir::new().unwrap();
        let db = test_db(&dir);
        // Stub produces 768/1536 but the orchestrator expects 8/16
        let ingestor = Ingestor::new(Arc::new(StubModel::new(1, 768, 1536)), 8, 16);

        let err = ingestor
            .ingest(&db, b"bytes", "x.jpg", "fs://x", None)
            .unwrap_err();
        assert!(matches!(err, HomelensError::Inference(_)));
        assert_eq!(db.count_images().unwrap(), 0);
    }

    #[test]
    fn empty_label_payload_writes_no_label_row() {
        let dir = TempDir::new().unwrap();
        let db = test_db(&dir);
        let ingestor = Ingestor::new(Arc::new(EmptyLabelVision), 8, 16);

        let outcome = ingestor
            .ingest(&db, b"bytes", "bare.jpg", "fs://bare", None)
            .unwrap();

        assert!(outcome.label_summary.is_none());
        assert_eq!(db.count_images().unwrap(), 1);
        assert_eq!(db.count_labels().unwrap(), 0);
        // No text embedding either, so no index entry
        assert_eq!(db.count_index_entries().unwrap(), 0);
    }

    #[test]
    fn absent_label_fields_stay_null() {
        let dir = TempDir::new().unwrap();
        let db = test_db(&dir);

        struct PartialLabelVision;
        impl Vision for PartialLabelVision {
            fn infer(&self, _image_bytes: &[u8]) -> anyhow::Result<VisionOutput> {
                Ok(VisionOutput {
                    labels: LabelPayload {
                        room_type: Some(Classification {
                            label: "bedroom".to_string(),
                            confidence: 0.8,
                        }),
                        // No condition/light scores, no style
                        ..LabelPayload::default()
                    },
                    image_embedding: vec![0.1; 8],
                    text_embedding: None,
                })
            }
        }

        let ingestor = Ingestor::new(Arc::new(PartialLabelVision), 8, 16);
        let outcome = ingestor
            .ingest(&db, b"bytes", "p.jpg", "fs://p", None)
            .unwrap();

        let detail = db.get_image(outcome.image_id).unwrap().unwrap();
        let label = detail.label.unwrap();
        assert_eq!(label.room_type.as_deref(), Some("bedroom"));
        assert!(label.condition_score.is_none());
        assert!(label.natural_light_score.is_none());
        assert!(label.style.is_none());
    }
}
