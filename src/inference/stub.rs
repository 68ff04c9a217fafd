//! Deterministic stub collaborator for tests and offline runs.
//!
//! Vectors come from an explicit seeded generator owned by the stub,
//! never from process-wide RNG state, so two stubs with the same seed
//! agree and stubs with different seeds do not.

use anyhow::Result;

use super::{ReplyGenerator, TextEmbedder, Vision, VisionOutput};
use crate::db::{Classification, LabelPayload};

/// Splitmix64-based vector source. Identical (seed, key) pairs produce
/// identical unit-norm vectors.
#[derive(Debug, Clone, Copy)]
pub struct SeededVectors {
    seed: u64,
}

impl SeededVectors {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Unit-norm vector of the given dimension, keyed by arbitrary bytes.
    pub fn vector(&self, key: &[u8], dim: usize) -> Vec<f32> {
        let mut state = self.seed ^ fnv1a(key);
        let mut v: Vec<f32> = (0..dim)
            .map(|_| {
                state = splitmix64(state);
                // Map to roughly [-1, 1)
                (state >> 11) as f32 / (1u64 << 52) as f32 - 1.0
            })
            .collect();

        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e3779b97f4a7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d049bb133111eb);
    x ^ (x >> 31)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Stub standing in for all three model collaborators.
pub struct StubModel {
    vectors: SeededVectors,
    image_dim: usize,
    text_dim: usize,
}

impl StubModel {
    pub fn new(seed: u64, image_dim: usize, text_dim: usize) -> Self {
        Self {
            vectors: SeededVectors::new(seed),
            image_dim,
            text_dim,
        }
    }

    fn stub_labels() -> LabelPayload {
        LabelPayload {
            room_type: Some(Classification {
                label: "kitchen".to_string(),
                confidence: 0.93,
            }),
            condition_score: Some(0.78),
            natural_light_score: Some(0.61),
            feature_tags: vec![
                "hardwood_floors".to_string(),
                "island".to_string(),
                "stainless_steel_appliances".to_string(),
            ],
            localization: None,
            style: Some(Classification {
                label: "modern".to_string(),
                confidence: 0.71,
            }),
            work_recommendations: Vec::new(),
            cost_estimates: Vec::new(),
            model_version: Some("model_v1".to_string()),
        }
    }
}

impl Vision for StubModel {
    fn infer(&self, image_bytes: &[u8]) -> Result<VisionOutput> {
        Ok(VisionOutput {
            labels: Self::stub_labels(),
            image_embedding: self.vectors.vector(image_bytes, self.image_dim),
            text_embedding: Some(self.vectors.vector(image_bytes, self.text_dim)),
        })
    }
}

impl TextEmbedder for StubModel {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectors.vector(text.as_bytes(), self.text_dim))
    }
}

impl ReplyGenerator for StubModel {
    fn generate(&self, _prompt: &str) -> Result<String> {
        Ok("Top 3 quick improvements:\n\
            1) Repaint kitchen cabinets (Medium cost, High ROI)\n\
            2) Replace dated hardware & fixtures (Low cost, Medium ROI)\n\
            3) Stage with a few potted plants & lighting (Low cost, Medium ROI)\n\
            Estimated combined cost: $800-$2,500."
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_key_agree() {
        let a = SeededVectors::new(7).vector(b"kitchen", 16);
        let b = SeededVectors::new(7).vector(b"kitchen", 16);
        assert_eq!(a, b);
    }

    #[test]
    fn different_keys_differ() {
        let gen = SeededVectors::new(7);
        assert_ne!(gen.vector(b"kitchen", 16), gen.vector(b"bathroom", 16));
    }

    #[test]
    fn vectors_are_unit_norm() {
        let v = SeededVectors::new(42).vector(b"anything", 768);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn stub_output_dimensions_follow_construction() {
        let model = StubModel::new(1, 768, 1536);
        let out = model.infer(b"img").unwrap();
        assert_eq!(out.image_embedding.len(), 768);
        assert_eq!(out.text_embedding.unwrap().len(), 1536);
        assert_eq!(model.embed("hello").unwrap().len(), 1536);
    }
}
