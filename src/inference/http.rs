//! HTTP provider for the model collaborators.
//!
//! Embeddings and chat use OpenAI-compatible routes (works with hosted
//! APIs and LM Studio-style local servers). Vision inference posts to
//! the model service's `/inference` route with a base64 payload and
//! expects the label/embedding JSON back.

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

use super::{ReplyGenerator, TextEmbedder, Vision, VisionOutput};
use crate::config::ModelConfig;
use crate::db::LabelPayload;

pub struct OpenAiClient {
    endpoint: String,
    vision_model: String,
    chat_model: String,
    embedding_model: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Serialize)]
struct InferenceRequest {
    model: String,
    image_base64: String,
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    labels: LabelPayload,
    image_embedding: Vec<f32>,
    #[serde(default)]
    text_embedding: Option<Vec<f32>>,
}

impl OpenAiClient {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            vision_model: config.vision_model.clone(),
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
            api_key: config.api_key.clone(),
        }
    }

    fn post(&self, path: &str) -> ureq::Request {
        let url = format!("{}{}", self.endpoint, path);
        let mut request = ureq::post(&url).set("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            request = request.set("Authorization", &format!("Bearer {}", key));
        }
        request
    }
}

impl Vision for OpenAiClient {
    fn infer(&self, image_bytes: &[u8]) -> Result<VisionOutput> {
        let request = InferenceRequest {
            model: self.vision_model.clone(),
            image_base64: BASE64.encode(image_bytes),
        };

        let response = self
            .post("/inference")
            .send_json(&request)
            .map_err(|e| anyhow!("inference request failed: {}", e))?;

        let parsed: InferenceResponse = response
            .into_json()
            .map_err(|e| anyhow!("failed to parse inference response: {}", e))?;

        if parsed.image_embedding.is_empty() {
            return Err(anyhow!("inference response carried an empty image embedding"));
        }

        Ok(VisionOutput {
            labels: parsed.labels,
            image_embedding: parsed.image_embedding,
            text_embedding: parsed.text_embedding,
        })
    }
}

impl TextEmbedder for OpenAiClient {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: self.embedding_model.clone(),
            input: text.to_string(),
        };

        let response = self
            .post("/embeddings")
            .send_json(&request)
            .map_err(|e| anyhow!("embedding request failed: {}", e))?;

        let parsed: EmbeddingResponse = response
            .into_json()
            .map_err(|e| anyhow!("failed to parse embedding response: {}", e))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| anyhow!("embedding response contained no data"))
    }
}

impl ReplyGenerator for OpenAiClient {
    fn generate(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.chat_model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: 800,
            temperature: 0.4,
        };

        let response = self
            .post("/chat/completions")
            .send_json(&request)
            .map_err(|e| anyhow!("chat request failed: {}", e))?;

        let parsed: ChatResponse = response
            .into_json()
            .map_err(|e| anyhow!("failed to parse chat response: {}", e))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("chat response contained no choices"))
    }
}
