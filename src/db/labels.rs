//! Structured per-image labels produced by the vision collaborator.
//!
//! Label rows are append-only: a re-inference inserts a new row under a
//! new model version and never rewrites history. Fields absent from the
//! collaborator payload stay null so missing data is distinguishable
//! from zero.

use anyhow::Result;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use super::Database;

/// A classification head's output: label plus confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub confidence: f64,
}

/// Cost bracket paired with one work recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub low_usd: f64,
    pub high_usd: f64,
}

/// What the vision collaborator reports for one image. Every field is
/// optional; an all-empty payload produces no label row at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelPayload {
    pub room_type: Option<Classification>,
    pub condition_score: Option<f64>,
    pub natural_light_score: Option<f64>,
    #[serde(default)]
    pub feature_tags: Vec<String>,
    pub localization: Option<Classification>,
    pub style: Option<Classification>,
    #[serde(default)]
    pub work_recommendations: Vec<String>,
    #[serde(default)]
    pub cost_estimates: Vec<CostEstimate>,
    pub model_version: Option<String>,
}

impl LabelPayload {
    pub fn is_empty(&self) -> bool {
        self.room_type.is_none()
            && self.condition_score.is_none()
            && self.natural_light_score.is_none()
            && self.feature_tags.is_empty()
            && self.localization.is_none()
            && self.style.is_none()
            && self.work_recommendations.is_empty()
    }
}

/// Persisted label row.
#[derive(Debug, Clone)]
pub struct ImageLabel {
    pub id: i64,
    pub image_id: i64,
    pub room_type: Option<String>,
    pub room_confidence: Option<f64>,
    pub condition_score: Option<f64>,
    pub natural_light_score: Option<f64>,
    pub features: Vec<String>,
    pub localization: Option<String>,
    pub localization_confidence: Option<f64>,
    pub style: Option<String>,
    pub style_confidence: Option<f64>,
    pub work_recommendations: Vec<String>,
    pub cost_estimates: Vec<CostEstimate>,
    pub model_version: Option<String>,
    pub inference_timestamp: Option<String>,
    pub created_at: String,
}

/// Insert one label row. Called inside the ingest transaction, so this
/// takes the raw connection rather than `&Database`.
pub(crate) fn insert_label(
    conn: &Connection,
    image_id: i64,
    payload: &LabelPayload,
    created_at: &str,
) -> Result<i64> {
    let features_json = serde_json::to_string(&payload.feature_tags)?;
    let recs_json = serde_json::to_string(&payload.work_recommendations)?;
    let costs_json = serde_json::to_string(&payload.cost_estimates)?;

    conn.execute(
        r#"
        INSERT INTO image_labels (
            image_id,
            room_type, room_confidence,
            condition_score, natural_light_score, features,
            localization, localization_confidence,
            style, style_confidence,
            work_recommendations, cost_estimates,
            model_version, inference_timestamp, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            image_id,
            payload.room_type.as_ref().map(|c| c.label.as_str()),
            payload.room_type.as_ref().map(|c| c.confidence),
            payload.condition_score,
            payload.natural_light_score,
            features_json,
            payload.localization.as_ref().map(|c| c.label.as_str()),
            payload.localization.as_ref().map(|c| c.confidence),
            payload.style.as_ref().map(|c| c.label.as_str()),
            payload.style.as_ref().map(|c| c.confidence),
            recs_json,
            costs_json,
            payload.model_version.as_deref().unwrap_or("model_v1"),
            created_at,
            created_at,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

fn label_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ImageLabel> {
    let features_json: Option<String> = row.get(6)?;
    let recs_json: Option<String> = row.get(11)?;
    let costs_json: Option<String> = row.get(12)?;

    Ok(ImageLabel {
        id: row.get(0)?,
        image_id: row.get(1)?,
        room_type: row.get(2)?,
        room_confidence: row.get(3)?,
        condition_score: row.get(4)?,
        natural_light_score: row.get(5)?,
        features: features_json
            .and_then(|j| serde_json::from_str(&j).ok())
            .unwrap_or_default(),
        localization: row.get(7)?,
        localization_confidence: row.get(8)?,
        style: row.get(9)?,
        style_confidence: row.get(10)?,
        work_recommendations: recs_json
            .and_then(|j| serde_json::from_str(&j).ok())
            .unwrap_or_default(),
        cost_estimates: costs_json
            .and_then(|j| serde_json::from_str(&j).ok())
            .unwrap_or_default(),
        model_version: row.get(13)?,
        inference_timestamp: row.get(14)?,
        created_at: row.get(15)?,
    })
}

const LABEL_COLUMNS: &str = r#"
    id, image_id, room_type, room_confidence,
    condition_score, natural_light_score, features,
    localization, localization_confidence, style, style_confidence,
    work_recommendations, cost_estimates,
    model_version, inference_timestamp, created_at
"#;

impl Database {
    /// All labels for every image of a listing, in insertion order.
    /// The aggregation scan depends on this order for tie-breaking.
    pub fn labels_for_listing(&self, listing_id: i64) -> Result<Vec<ImageLabel>> {
        let sql = format!(
            r#"
            SELECT {LABEL_COLUMNS}
            FROM image_labels
            WHERE image_id IN (SELECT id FROM images WHERE listing_id = ?)
            ORDER BY id
            "#
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let labels = stmt
            .query_map([listing_id], label_from_row)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(labels)
    }

    /// Most recent label for an image, if any.
    pub fn latest_label_for_image(&self, image_id: i64) -> Result<Option<ImageLabel>> {
        let sql = format!(
            "SELECT {LABEL_COLUMNS} FROM image_labels WHERE image_id = ? ORDER BY id DESC LIMIT 1"
        );
        let result = self.conn.query_row(&sql, [image_id], label_from_row);

        match result {
            Ok(label) => Ok(Some(label)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn count_labels(&self) -> Result<i64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM image_labels", [], |row| row.get(0))?;
        Ok(count)
    }
}
