//! Listing rows: property metadata plus denormalized rollup columns.

use anyhow::Result;
use rusqlite::{params, OptionalExtension};

use super::{now_timestamp, Database};

#[derive(Debug, Clone, Default)]
pub struct NewListing {
    pub address: String,
    pub price: Option<f64>,
    pub zip_code: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Listing {
    pub id: i64,
    pub address: String,
    pub price: Option<f64>,
    pub zip_code: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub dominant_room_types: Vec<String>,
    pub overall_condition_score: Option<f64>,
    pub room_counts_json: Option<String>,
    pub total_images: i64,
    pub created_at: String,
}

impl Database {
    pub fn create_listing(&self, listing: &NewListing) -> Result<i64> {
        let now = now_timestamp();
        self.conn.execute(
            r#"
            INSERT INTO listings (address, price, zip_code, city, state, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                listing.address,
                listing.price,
                listing.zip_code,
                listing.city,
                listing.state,
                now,
                now,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_listing(&self, listing_id: i64) -> Result<Option<Listing>> {
        let result = self
            .conn
            .query_row(
                r#"
                SELECT id, address, price, zip_code, city, state,
                       dominant_room_types, overall_condition_score, room_counts,
                       total_images, created_at
                FROM listings WHERE id = ?
                "#,
                [listing_id],
                |row| {
                    let dominant_json: Option<String> = row.get(6)?;
                    Ok(Listing {
                        id: row.get(0)?,
                        address: row.get(1)?,
                        price: row.get(2)?,
                        zip_code: row.get(3)?,
                        city: row.get(4)?,
                        state: row.get(5)?,
                        dominant_room_types: dominant_json
                            .and_then(|j| serde_json::from_str(&j).ok())
                            .unwrap_or_default(),
                        overall_condition_score: row.get(7)?,
                        room_counts_json: row.get(8)?,
                        total_images: row.get::<_, Option<i64>>(9)?.unwrap_or(0),
                        created_at: row.get(10)?,
                    })
                },
            )
            .optional()?;
        Ok(result)
    }

    /// Write rollup columns back onto the listing for join-free reads.
    pub fn denormalize_listing_rollup(
        &self,
        listing_id: i64,
        dominant_room_type: Option<&str>,
        overall_condition_score: Option<f64>,
        room_counts_json: &str,
        total_images: i64,
    ) -> Result<()> {
        let dominant_json = match dominant_room_type {
            Some(room) => serde_json::to_string(&vec![room])?,
            None => "[]".to_string(),
        };

        self.conn.execute(
            r#"
            UPDATE listings
            SET dominant_room_types = ?, overall_condition_score = ?,
                room_counts = ?, total_images = ?, updated_at = ?
            WHERE id = ?
            "#,
            params![
                dominant_json,
                overall_condition_score,
                room_counts_json,
                total_images,
                now_timestamp(),
                listing_id,
            ],
        )?;
        Ok(())
    }
}
