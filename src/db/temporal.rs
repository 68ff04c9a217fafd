//! Append-only temporal change records.

use anyhow::Result;
use rusqlite::params;

use super::{now_timestamp, Database};

#[derive(Debug, Clone)]
pub struct TemporalChange {
    pub id: i64,
    pub listing_id: i64,
    pub image_id: i64,
    pub change_type: String,
    pub change_magnitude: f64,
    pub change_direction: String,
    pub previous_value: f64,
    pub current_value: f64,
    pub previous_image_id: i64,
    pub time_delta_days: i64,
    pub model_version: Option<String>,
    pub flagged_for_review: bool,
    pub detected_at: String,
}

impl Database {
    pub(crate) fn insert_temporal_change(
        &self,
        change: &TemporalChange,
    ) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO temporal_changes (
                listing_id, image_id,
                change_type, change_magnitude, change_direction,
                previous_value, current_value, previous_image_id, time_delta_days,
                model_version, flagged_for_review, detected_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                change.listing_id,
                change.image_id,
                change.change_type,
                change.change_magnitude,
                change.change_direction,
                change.previous_value,
                change.current_value,
                change.previous_image_id,
                change.time_delta_days,
                change.model_version,
                change.flagged_for_review,
                change.detected_at,
                now_timestamp(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn changes_for_listing(&self, listing_id: i64) -> Result<Vec<TemporalChange>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, listing_id, image_id,
                   change_type, change_magnitude, change_direction,
                   previous_value, current_value, previous_image_id, time_delta_days,
                   model_version, flagged_for_review, detected_at
            FROM temporal_changes
            WHERE listing_id = ?
            ORDER BY id
            "#,
        )?;

        let changes = stmt
            .query_map([listing_id], |row| {
                Ok(TemporalChange {
                    id: row.get(0)?,
                    listing_id: row.get(1)?,
                    image_id: row.get(2)?,
                    change_type: row.get(3)?,
                    change_magnitude: row.get(4)?,
                    change_direction: row.get(5)?,
                    previous_value: row.get(6)?,
                    current_value: row.get(7)?,
                    previous_image_id: row.get(8)?,
                    time_delta_days: row.get(9)?,
                    model_version: row.get(10)?,
                    flagged_for_review: row.get(11)?,
                    detected_at: row.get(12)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(changes)
    }
}
