mod schema;
pub mod aggregates;
pub mod conversations;
pub mod images;
pub mod index;
pub mod labels;
pub mod listings;
pub mod temporal;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use std::path::Path;

pub use aggregates::PropertyAggregation;
pub use conversations::{Message, MessageLatencies, MessageRole};
pub use images::{Image, ImageDetail, NewImageRecord};
pub use index::{bytes_to_embedding, cosine_similarity, embedding_to_bytes};
pub use labels::{Classification, CostEstimate, ImageLabel, LabelPayload};
pub use listings::{Listing, NewListing};
pub use schema::SCHEMA;
pub use temporal::TemporalChange;

/// SQLite store shared by ingestion and all read paths.
///
/// One `Database` wraps one connection; parallel workers each open their
/// own handle against the same file.
pub struct Database {
    pub(crate) conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        // Writers from multiple worker threads share this file
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self { conn })
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }
}

/// Current UTC time as the text timestamp format used across all tables.
///
/// Microsecond precision keeps message ordering strict even for writes
/// landing within the same second.
pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
