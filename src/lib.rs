//! Property-photo intelligence core.
//!
//! Ingests listing photos through a vision collaborator, stores labels
//! and embeddings in SQLite, and serves similarity search, per-listing
//! rollups, temporal change detection, and retrieval-augmented chat on
//! top of the same store.

pub mod aggregate;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod inference;
pub mod ingest;
pub mod jobs;
pub mod logging;
pub mod search;
pub mod storage;
pub mod temporal;
