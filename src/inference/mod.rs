//! Collaborator contracts for model inference, text embedding, and
//! reply generation, plus the provider implementations.
//!
//! The core never runs a model itself; it consumes these seams. The
//! HTTP provider talks to a hosted model service; the stub provider is
//! deterministic and network-free.

mod http;
mod stub;

use anyhow::Result;

use crate::db::LabelPayload;

pub use http::OpenAiClient;
pub use stub::{SeededVectors, StubModel};

/// Everything the vision collaborator reports for one image.
#[derive(Debug, Clone)]
pub struct VisionOutput {
    pub labels: LabelPayload,
    /// Fixed-length image embedding.
    pub image_embedding: Vec<f32>,
    /// Optional caption-space embedding for cross-modal search.
    pub text_embedding: Option<Vec<f32>>,
}

/// Image inference collaborator.
pub trait Vision: Send + Sync {
    fn infer(&self, image_bytes: &[u8]) -> Result<VisionOutput>;
}

/// Text embedding collaborator; vectors share the text-embedding
/// dimension of the store.
pub trait TextEmbedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Chat reply collaborator.
pub trait ReplyGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String>;
}
