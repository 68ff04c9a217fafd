//! Property aggregation rows: one live snapshot per listing.

use anyhow::Result;
use rusqlite::{params, OptionalExtension};

use super::{now_timestamp, Database};

/// Point-in-time rollup of a listing's labels. Recomputed wholesale;
/// `recompute` replaces any existing row for the listing.
#[derive(Debug, Clone)]
pub struct PropertyAggregation {
    pub listing_id: i64,
    pub overall_condition_score: Option<f64>,
    pub avg_natural_light_score: Option<f64>,
    /// Room-type counts in first-encountered order.
    pub room_counts: Vec<(String, i64)>,
    pub dominant_room_type: Option<String>,
    /// Most common feature tags, highest count first.
    pub common_features: Vec<String>,
    pub dominant_style: Option<String>,
    /// Normalized style shares; sums to 1.0 when non-empty.
    pub style_distribution: Vec<(String, f64)>,
    pub primary_localization: Option<String>,
    pub localization_distribution: Vec<(String, f64)>,
    pub total_images: i64,
    pub last_calculated_at: String,
    pub calculation_version: String,
}

fn counts_to_json(counts: &[(String, i64)]) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = counts
        .iter()
        .map(|(k, v)| (k.clone(), serde_json::Value::from(*v)))
        .collect();
    serde_json::Value::Object(map)
}

fn distribution_to_json(distribution: &[(String, f64)]) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = distribution
        .iter()
        .map(|(k, v)| (k.clone(), serde_json::Value::from(*v)))
        .collect();
    serde_json::Value::Object(map)
}

fn json_to_counts(json: Option<String>) -> Vec<(String, i64)> {
    json.and_then(|j| serde_json::from_str::<serde_json::Value>(&j).ok())
        .and_then(|v| match v {
            serde_json::Value::Object(map) => Some(
                map.into_iter()
                    .filter_map(|(k, v)| v.as_i64().map(|n| (k, n)))
                    .collect(),
            ),
            _ => None,
        })
        .unwrap_or_default()
}

fn json_to_distribution(json: Option<String>) -> Vec<(String, f64)> {
    json.and_then(|j| serde_json::from_str::<serde_json::Value>(&j).ok())
        .and_then(|v| match v {
            serde_json::Value::Object(map) => Some(
                map.into_iter()
                    .filter_map(|(k, v)| v.as_f64().map(|n| (k, n)))
                    .collect(),
            ),
            _ => None,
        })
        .unwrap_or_default()
}

impl Database {
    pub fn aggregation_exists(&self, listing_id: i64) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM property_aggregations WHERE listing_id = ?)",
            [listing_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Idempotent replace keyed by listing id. Concurrent recomputes for
    /// the same listing cannot interleave into a half-written row.
    pub fn upsert_aggregation(&self, agg: &PropertyAggregation) -> Result<i64> {
        let now = now_timestamp();
        self.conn.execute(
            r#"
            INSERT INTO property_aggregations (
                listing_id,
                overall_condition_score, avg_natural_light_score,
                room_counts, dominant_room_type,
                common_features,
                dominant_style, style_distribution,
                primary_localization, localization_distribution,
                total_images, last_calculated_at, calculation_version,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(listing_id) DO UPDATE SET
                overall_condition_score = excluded.overall_condition_score,
                avg_natural_light_score = excluded.avg_natural_light_score,
                room_counts = excluded.room_counts,
                dominant_room_type = excluded.dominant_room_type,
                common_features = excluded.common_features,
                dominant_style = excluded.dominant_style,
                style_distribution = excluded.style_distribution,
                primary_localization = excluded.primary_localization,
                localization_distribution = excluded.localization_distribution,
                total_images = excluded.total_images,
                last_calculated_at = excluded.last_calculated_at,
                calculation_version = excluded.calculation_version,
                updated_at = excluded.updated_at
            "#,
            params![
                agg.listing_id,
                agg.overall_condition_score,
                agg.avg_natural_light_score,
                counts_to_json(&agg.room_counts).to_string(),
                agg.dominant_room_type,
                serde_json::to_string(&agg.common_features)?,
                agg.dominant_style,
                distribution_to_json(&agg.style_distribution).to_string(),
                agg.primary_localization,
                distribution_to_json(&agg.localization_distribution).to_string(),
                agg.total_images,
                agg.last_calculated_at,
                agg.calculation_version,
                now,
                now,
            ],
        )?;

        let id: i64 = self.conn.query_row(
            "SELECT id FROM property_aggregations WHERE listing_id = ?",
            [agg.listing_id],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn get_aggregation(&self, listing_id: i64) -> Result<Option<PropertyAggregation>> {
        let result = self
            .conn
            .query_row(
                r#"
                SELECT listing_id,
                       overall_condition_score, avg_natural_light_score,
                       room_counts, dominant_room_type,
                       common_features,
                       dominant_style, style_distribution,
                       primary_localization, localization_distribution,
                       total_images, last_calculated_at, calculation_version
                FROM property_aggregations WHERE listing_id = ?
                "#,
                [listing_id],
                |row| {
                    let room_counts_json: Option<String> = row.get(3)?;
                    let common_features_json: Option<String> = row.get(5)?;
                    let style_json: Option<String> = row.get(7)?;
                    let localization_json: Option<String> = row.get(9)?;
                    Ok(PropertyAggregation {
                        listing_id: row.get(0)?,
                        overall_condition_score: row.get(1)?,
                        avg_natural_light_score: row.get(2)?,
                        room_counts: json_to_counts(room_counts_json),
                        dominant_room_type: row.get(4)?,
                        common_features: common_features_json
                            .and_then(|j| serde_json::from_str(&j).ok())
                            .unwrap_or_default(),
                        dominant_style: row.get(6)?,
                        style_distribution: json_to_distribution(style_json),
                        primary_localization: row.get(8)?,
                        localization_distribution: json_to_distribution(localization_json),
                        total_images: row.get::<_, Option<i64>>(10)?.unwrap_or(0),
                        last_calculated_at: row.get::<_, Option<String>>(11)?.unwrap_or_default(),
                        calculation_version: row.get::<_, Option<String>>(12)?.unwrap_or_default(),
                    })
                },
            )
            .optional()?;
        Ok(result)
    }
}
