//! Listing-level rollups over per-image labels.
//!
//! Recompute is wholesale: every label for the listing is rescanned and
//! the aggregation row replaced, which keeps the snapshot consistent
//! with the label set at scan time. Concurrent ingest can make the
//! snapshot slightly stale; the next recompute corrects it.

use tracing::debug;

use crate::db::{now_timestamp, Database, PropertyAggregation};
use crate::error::{HomelensError, Result};

pub struct AggregationEngine {
    calculation_version: String,
    top_features: usize,
}

/// Frequency table that remembers first-encountered order, which is the
/// tie-break for dominant categories and common features.
#[derive(Default)]
struct OrderedCounts {
    entries: Vec<(String, i64)>,
}

impl OrderedCounts {
    fn bump(&mut self, key: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, count)) => *count += 1,
            None => self.entries.push((key.to_string(), 1)),
        }
    }

    /// Highest-count key; earliest entry wins a tie.
    fn dominant(&self) -> Option<String> {
        let mut best: Option<(&str, i64)> = None;
        for (key, count) in &self.entries {
            if best.map_or(true, |(_, best_count)| *count > best_count) {
                best = Some((key, *count));
            }
        }
        best.map(|(key, _)| key.to_string())
    }

    fn total(&self) -> i64 {
        self.entries.iter().map(|(_, c)| c).sum()
    }

    /// Counts normalized by their sum; empty input yields an empty map.
    fn distribution(&self) -> Vec<(String, f64)> {
        let total = self.total();
        if total == 0 {
            return Vec::new();
        }
        self.entries
            .iter()
            .map(|(k, c)| (k.clone(), *c as f64 / total as f64))
            .collect()
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

impl AggregationEngine {
    pub fn new(calculation_version: impl Into<String>, top_features: usize) -> Self {
        Self {
            calculation_version: calculation_version.into(),
            top_features,
        }
    }

    /// Recompute and persist the rollup for one listing.
    ///
    /// Returns `None` without touching the store when the listing has no
    /// images (or no labeled images). On first creation the dominant
    /// room type, condition score, room counts, and image count are also
    /// denormalized onto the listing row.
    pub fn recompute(&self, db: &Database, listing_id: i64) -> Result<Option<PropertyAggregation>> {
        let total_images = db
            .count_images_for_listing(listing_id)
            .map_err(HomelensError::Persistence)?;
        if total_images == 0 {
            return Ok(None);
        }

        let labels = db
            .labels_for_listing(listing_id)
            .map_err(HomelensError::Persistence)?;
        if labels.is_empty() {
            return Ok(None);
        }

        // A label missing one score still contributes to the other mean
        let condition_scores: Vec<f64> =
            labels.iter().filter_map(|l| l.condition_score).collect();
        let light_scores: Vec<f64> = labels
            .iter()
            .filter_map(|l| l.natural_light_score)
            .collect();

        let overall_condition_score = mean(&condition_scores).map(round3);
        let avg_natural_light_score = mean(&light_scores).map(round3);

        let mut room_counts = OrderedCounts::default();
        let mut style_counts = OrderedCounts::default();
        let mut localization_counts = OrderedCounts::default();
        let mut feature_counts = OrderedCounts::default();

        for label in &labels {
            if let Some(room) = &label.room_type {
                room_counts.bump(room);
            }
            if let Some(style) = &label.style {
                style_counts.bump(style);
            }
            if let Some(localization) = &label.localization {
                localization_counts.bump(localization);
            }
            for feature in &label.features {
                feature_counts.bump(feature);
            }
        }

        // Stable sort keeps first-encountered order among equal counts
        let mut ranked_features = feature_counts.entries.clone();
        ranked_features.sort_by(|a, b| b.1.cmp(&a.1));
        let common_features: Vec<String> = ranked_features
            .into_iter()
            .take(self.top_features)
            .map(|(feature, _)| feature)
            .collect();

        let aggregation = PropertyAggregation {
            listing_id,
            overall_condition_score,
            avg_natural_light_score,
            dominant_room_type: room_counts.dominant(),
            room_counts: room_counts.entries.clone(),
            common_features,
            dominant_style: style_counts.dominant(),
            style_distribution: style_counts.distribution(),
            primary_localization: localization_counts.dominant(),
            localization_distribution: localization_counts.distribution(),
            total_images,
            last_calculated_at: now_timestamp(),
            calculation_version: self.calculation_version.clone(),
        };

        let existed = db
            .aggregation_exists(listing_id)
            .map_err(HomelensError::Persistence)?;
        db.upsert_aggregation(&aggregation)
            .map_err(HomelensError::Persistence)?;

        if !existed {
            let room_counts_json = serde_json::to_string(
                &aggregation
                    .room_counts
                    .iter()
                    .cloned()
                    .collect::<std::collections::BTreeMap<String, i64>>(),
            )
            .map_err(|e| HomelensError::Persistence(e.into()))?;
            db.denormalize_listing_rollup(
                listing_id,
                aggregation.dominant_room_type.as_deref(),
                aggregation.overall_condition_score,
                &room_counts_json,
                aggregation.total_images,
            )
            .map_err(HomelensError::Persistence)?;
        }

        debug!(
            listing_id,
            total_images,
            dominant_room = ?aggregation.dominant_room_type,
            "aggregation recomputed"
        );

        Ok(Some(aggregation))
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
