//! Pairwise change detection between two time-ordered images of one
//! listing.
//!
//! Direction uses the metric's natural ordering: a larger value is
//! "improved". That holds for the score metrics this ships with; a
//! metric where less is better would need its own ordering before being
//! added here.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::db::{now_timestamp, Database, ImageLabel, TemporalChange};
use crate::error::{HomelensError, Result};

/// Which labeled quantity a comparison reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeMetric {
    Condition,
    NaturalLight,
    Feature,
    Style,
}

impl ChangeMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeMetric::Condition => "condition",
            ChangeMetric::NaturalLight => "natural_light",
            ChangeMetric::Feature => "feature",
            ChangeMetric::Style => "style",
        }
    }

    /// Numeric reading of this metric from a label, if present.
    fn value(&self, label: &ImageLabel) -> Option<f64> {
        match self {
            ChangeMetric::Condition => label.condition_score,
            ChangeMetric::NaturalLight => label.natural_light_score,
            ChangeMetric::Feature => Some(label.features.len() as f64),
            ChangeMetric::Style => label.style_confidence,
        }
    }
}

pub struct TemporalAnalyzer {
    review_threshold: f64,
}

impl TemporalAnalyzer {
    pub fn new(review_threshold: f64) -> Self {
        Self { review_threshold }
    }

    /// Compare two labeled images of `listing_id` on one metric and
    /// append the resulting change record.
    ///
    /// The previous image must exist, belong to the same listing, and be
    /// strictly older than the current one; both labels must carry the
    /// metric. Anything else is the caller's mistake, not a degraded
    /// comparison.
    pub fn detect_change(
        &self,
        db: &Database,
        listing_id: i64,
        current_image_id: i64,
        previous_image_id: Option<i64>,
        metric: ChangeMetric,
    ) -> Result<TemporalChange> {
        let previous_image_id =
            previous_image_id.ok_or(HomelensError::Precondition("no previous image to compare"))?;

        let current_created = self.image_timestamp(db, current_image_id)?;
        let previous_created = self.image_timestamp(db, previous_image_id)?;

        self.check_listing(db, current_image_id, listing_id)?;
        self.check_listing(db, previous_image_id, listing_id)?;

        if previous_created >= current_created {
            return Err(HomelensError::Precondition(
                "previous image is not older than current image",
            ));
        }

        let current_label = db
            .latest_label_for_image(current_image_id)
            .map_err(HomelensError::Persistence)?
            .ok_or(HomelensError::NotFound("label for current image"))?;
        let previous_label = db
            .latest_label_for_image(previous_image_id)
            .map_err(HomelensError::Persistence)?
            .ok_or(HomelensError::NotFound("label for previous image"))?;

        let current_value = metric
            .value(&current_label)
            .ok_or(HomelensError::Precondition("current label lacks the metric"))?;
        let previous_value = metric
            .value(&previous_label)
            .ok_or(HomelensError::Precondition("previous label lacks the metric"))?;

        let change_magnitude = (current_value - previous_value).abs();
        let change_direction = if current_value > previous_value {
            "improved"
        } else if current_value < previous_value {
            "degraded"
        } else {
            "stable"
        };
        let time_delta_days = (current_created - previous_created).num_days();

        let mut change = TemporalChange {
            id: 0,
            listing_id,
            image_id: current_image_id,
            change_type: metric.as_str().to_string(),
            change_magnitude,
            change_direction: change_direction.to_string(),
            previous_value,
            current_value,
            previous_image_id,
            time_delta_days,
            model_version: current_label.model_version.clone(),
            flagged_for_review: change_magnitude > self.review_threshold,
            detected_at: now_timestamp(),
        };

        change.id = db
            .insert_temporal_change(&change)
            .map_err(HomelensError::Persistence)?;

        info!(
            listing_id,
            current_image_id,
            previous_image_id,
            metric = metric.as_str(),
            magnitude = change.change_magnitude,
            direction = %change.change_direction,
            flagged = change.flagged_for_review,
            "temporal change recorded"
        );

        Ok(change)
    }

    fn image_timestamp(&self, db: &Database, image_id: i64) -> Result<DateTime<Utc>> {
        let created_at = db
            .image_created_at(image_id)
            .map_err(HomelensError::Persistence)?
            .ok_or(HomelensError::NotFound("image"))?;
        DateTime::parse_from_rfc3339(&created_at)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| HomelensError::Persistence(e.into()))
    }

    fn check_listing(&self, db: &Database, image_id: i64, listing_id: i64) -> Result<()> {
        match db
            .image_listing(image_id)
            .map_err(HomelensError::Persistence)?
        {
            None => Err(HomelensError::NotFound("image")),
            Some(Some(id)) if id == listing_id => Ok(()),
            Some(_) => Err(HomelensError::Precondition(
                "image does not belong to the listing",
            )),
        }
    }
}
