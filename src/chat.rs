//! Retrieval-augmented chat over a listing's ingested images.
//!
//! One user turn drives one embedding call, two similarity lookups, one
//! reply generation, and two message writes. The user message is
//! persisted before the assistant reply so history reads always see the
//! roles alternate in chronological order.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::config::ChatConfig;
use crate::db::{Database, Listing, MessageLatencies, MessageRole};
use crate::error::{HomelensError, Result};
use crate::inference::{ReplyGenerator, TextEmbedder};
use crate::search::{MessageHit, SearchEngine, SearchHit};

/// What a chat turn drew on, reported back to the caller.
#[derive(Debug, Clone, Copy)]
pub struct ContextSummary {
    pub images_count: usize,
    pub messages_count: usize,
}

#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub conversation_id: i64,
    pub reply: String,
    pub context: ContextSummary,
}

pub struct ChatEngine {
    embedder: Arc<dyn TextEmbedder>,
    generator: Arc<dyn ReplyGenerator>,
    search: SearchEngine,
    options: ChatConfig,
}

impl ChatEngine {
    pub fn new(
        embedder: Arc<dyn TextEmbedder>,
        generator: Arc<dyn ReplyGenerator>,
        search: SearchEngine,
        options: ChatConfig,
    ) -> Self {
        Self {
            embedder,
            generator,
            search,
            options,
        }
    }

    /// Run one chat turn.
    ///
    /// A missing `conversation_id` starts a new conversation; a supplied
    /// one must exist. Image retrieval runs over the text-embedding
    /// column so the text query needs no recomputation, filtered by
    /// listing when one is given.
    pub fn respond(
        &self,
        db: &Database,
        conversation_id: Option<i64>,
        user_id: Option<&str>,
        listing_id: Option<i64>,
        message: &str,
    ) -> Result<ChatOutcome> {
        let conversation_id = match conversation_id {
            Some(id) => {
                if !db.conversation_exists(id).map_err(HomelensError::Persistence)? {
                    return Err(HomelensError::NotFound("conversation"));
                }
                id
            }
            None => db
                .create_conversation(user_id, listing_id)
                .map_err(HomelensError::Persistence)?,
        };

        let embed_start = Instant::now();
        let user_embedding = self
            .embedder
            .embed(message)
            .map_err(HomelensError::Inference)?;
        let embedding_ms = embed_start.elapsed().as_secs_f64() * 1000.0;

        let retrieval_start = Instant::now();
        let similar_images = self.search.search(
            db,
            &user_embedding,
            self.options.image_k,
            listing_id,
            true,
        )?;
        let similar_messages = self.search.search_messages(
            db,
            conversation_id,
            &user_embedding,
            self.options.message_k,
        )?;
        let retrieval_ms = retrieval_start.elapsed().as_secs_f64() * 1000.0;

        let listing = match listing_id {
            Some(id) => db.get_listing(id).map_err(HomelensError::Persistence)?,
            None => None,
        };

        let prompt = build_prompt(
            message,
            &similar_images,
            &similar_messages,
            listing_id,
            listing.as_ref(),
            self.options.context_messages,
            self.options.snippet_chars,
        );

        let llm_start = Instant::now();
        let reply = self
            .generator
            .generate(&prompt)
            .map_err(HomelensError::Inference)?;
        let llm_ms = llm_start.elapsed().as_secs_f64() * 1000.0;

        // User write first; the assistant write must observe it
        db.add_message(
            conversation_id,
            MessageRole::User,
            message,
            Some(&user_embedding),
            MessageLatencies {
                embedding_ms: Some(embedding_ms),
                retrieval_ms: Some(retrieval_ms),
                llm_ms: None,
            },
        )
        .map_err(HomelensError::Persistence)?;

        let reply_embedding = self
            .embedder
            .embed(&reply)
            .map_err(HomelensError::Inference)?;
        db.add_message(
            conversation_id,
            MessageRole::Assistant,
            &reply,
            Some(&reply_embedding),
            MessageLatencies {
                embedding_ms: None,
                retrieval_ms: None,
                llm_ms: Some(llm_ms),
            },
        )
        .map_err(HomelensError::Persistence)?;

        info!(
            conversation_id,
            images = similar_images.len(),
            messages = similar_messages.len(),
            "chat turn completed"
        );

        Ok(ChatOutcome {
            conversation_id,
            reply,
            context: ContextSummary {
                images_count: similar_images.len(),
                messages_count: similar_messages.len(),
            },
        })
    }
}

/// Assemble the grounding prompt. Deterministic for identical inputs.
fn build_prompt(
    user_message: &str,
    similar_images: &[SearchHit],
    similar_messages: &[MessageHit],
    listing_id: Option<i64>,
    listing: Option<&Listing>,
    context_messages: usize,
    snippet_chars: usize,
) -> String {
    let mut prompt = String::from(
        "You are a home improvement advisor. Use only the following context and answer concisely.\n",
    );

    if let Some(id) = listing_id {
        prompt.push_str(&format!("Listing metadata:\n- Listing ID: {id}\n"));
        if let Some(listing) = listing {
            if let Some(price) = listing.price {
                prompt.push_str(&format!("- Price: ${}\n", format_thousands(price)));
            }
            if let Some(zip) = &listing.zip_code {
                prompt.push_str(&format!("- Location: {zip}\n"));
            }
        }
        prompt.push('\n');
    }

    if !similar_images.is_empty() {
        prompt.push_str(&format!(
            "Top {} relevant images (summaries):\n",
            similar_images.len()
        ));
        for (i, img) in similar_images.iter().enumerate() {
            prompt.push_str(&format!(
                "{}) Image id {} - room: {} (conf={:.2}), features: {:?}, condition: {:.2}, light: {:.2}\n",
                i + 1,
                img.image_id,
                img.room_type.as_deref().unwrap_or("unknown"),
                img.room_confidence.unwrap_or(0.0),
                img.features,
                img.condition_score.unwrap_or(0.0),
                img.natural_light_score.unwrap_or(0.0),
            ));
        }
        prompt.push('\n');
    }

    if !similar_messages.is_empty() {
        prompt.push_str("Relevant past conversation context:\n");
        for msg in similar_messages.iter().take(context_messages) {
            let snippet: String = msg.text.chars().take(snippet_chars).collect();
            prompt.push_str(&format!("- {}: {}...\n", msg.role, snippet));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("User question:\n{user_message}\n\n"));
    prompt.push_str(
        "Instruction:\n\
         Provide up to 5 prioritized improvement suggestions with estimated cost brackets \
         (Low: <$500, Medium: $500-$3k, High: >$3k) and expected ROI qualitative (Low/Medium/High). \
         If insufficient data, ask for clarification.",
    );

    prompt
}

/// Whole-dollar rendering with thousands separators.
fn format_thousands(value: f64) -> String {
    let whole = value.round() as i64;
    let digits = whole.abs().to_string();
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if whole < 0 {
        format!("-{out}")
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Classification, LabelPayload, NewImageRecord, NewListing};
    use crate::inference::StubModel;
    use tempfile::TempDir;

    fn test_db(dir: &TempDir) -> Database {
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        db.initialize().unwrap();
        db
    }

    fn engine() -> ChatEngine {
        let model = Arc::new(StubModel::new(1, 8, 16));
        ChatEngine::new(
            model.clone(),
            model,
            SearchEngine::new(8, 16),
            ChatConfig::default(),
        )
    }

    fn labeled_image(db: &Database, listing_id: Option<i64>, name: &str) {
        let vectors = crate::inference::SeededVectors::new(1);
        db.insert_image_record(&NewImageRecord {
            filename: name.to_string(),
            locator: format!("fs://{name}"),
            listing_id,
            embedding: vectors.vector(name.as_bytes(), 8),
            text_embedding: Some(vectors.vector(name.as_bytes(), 16)),
            labels: LabelPayload {
                room_type: Some(Classification {
                    label: "kitchen".to_string(),
                    confidence: 0.93,
                }),
                condition_score: Some(0.78),
                natural_light_score: Some(0.61),
                feature_tags: vec!["island".to_string()],
                ..LabelPayload::default()
            },
            meta: None,
        })
        .unwrap();
    }

    #[test]
    fn new_conversation_persists_user_then_assistant() {
        let dir = TempDir::new().unwrap();
        let db = test_db(&dir);
        let engine = engine();

        let outcome = engine
            .respond(&db, None, Some("u1"), None, "How can I improve the kitchen?")
            .unwrap();

        let messages = db.get_conversation_messages(outcome.conversation_id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[0].text, "How can I improve the kitchen?");
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[1].text, outcome.reply);
        assert!(messages[0].embedding.is_some());
        assert!(messages[1].embedding.is_some());
    }

    #[test]
    fn two_turns_keep_strict_role_alternation() {
        let dir = TempDir::new().unwrap();
        let db = test_db(&dir);
        let engine = engine();

        let first = engine
            .respond(&db, None, None, None, "What should I renovate first?")
            .unwrap();
        let second = engine
            .respond(
                &db,
                Some(first.conversation_id),
                None,
                None,
                "And what about the bathroom?",
            )
            .unwrap();
        assert_eq!(first.conversation_id, second.conversation_id);

        let messages = db.get_conversation_messages(first.conversation_id).unwrap();
        assert_eq!(messages.len(), 4);
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant", "user", "assistant"]);
        for pair in messages.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
        }
    }

    #[test]
    fn unknown_conversation_is_not_found() {
        let dir = TempDir::new().unwrap();
        let db = test_db(&dir);
        let engine = engine();

        let err = engine
            .respond(&db, Some(12345), None, None, "hello")
            .unwrap_err();
        assert!(matches!(err, HomelensError::NotFound("conversation")));
    }

    #[test]
    fn context_counts_respect_retrieval_limits() {
        let dir = TempDir::new().unwrap();
        let db = test_db(&dir);
        let engine = engine();

        for i in 0..10 {
            labeled_image(&db, None, &format!("img{i}.jpg"));
        }

        let outcome = engine
            .respond(&db, None, None, None, "Which rooms need work?")
            .unwrap();
        assert_eq!(outcome.context.images_count, 6);
        // First turn has no prior messages to retrieve
        assert_eq!(outcome.context.messages_count, 0);

        let followup = engine
            .respond(
                &db,
                Some(outcome.conversation_id),
                None,
                None,
                "Tell me more",
            )
            .unwrap();
        assert_eq!(followup.context.messages_count, 2);
    }

    #[test]
    fn listing_filter_reaches_retrieval() {
        let dir = TempDir::new().unwrap();
        let db = test_db(&dir);
        let engine = engine();

        let listing_id = db
            .create_listing(&NewListing {
                address: "5 Cedar Ct".to_string(),
                price: Some(350_000.0),
                zip_code: Some("90210".to_string()),
                ..Default::default()
            })
            .unwrap();

        labeled_image(&db, Some(listing_id), "in.jpg");
        labeled_image(&db, None, "out1.jpg");
        labeled_image(&db, None, "out2.jpg");

        let outcome = engine
            .respond(&db, None, None, Some(listing_id), "Is this worth the price?")
            .unwrap();
        assert_eq!(outcome.context.images_count, 1);
    }

    #[test]
    fn prompt_layout_is_deterministic() {
        let images = vec![SearchHit {
            image_id: 7,
            filename: "k.jpg".to_string(),
            locator: "fs://k".to_string(),
            room_type: Some("kitchen".to_string()),
            room_confidence: Some(0.93),
            features: vec!["island".to_string()],
            condition_score: Some(0.78),
            natural_light_score: Some(0.61),
            similarity: 0.9,
        }];
        let messages = vec![MessageHit {
            message_id: 1,
            role: "user".to_string(),
            text: "x".repeat(300),
            similarity: 0.5,
        }];
        let listing = Listing {
            id: 3,
            address: "5 Cedar Ct".to_string(),
            price: Some(1_250_000.0),
            zip_code: Some("90210".to_string()),
            city: None,
            state: None,
            dominant_room_types: Vec::new(),
            overall_condition_score: None,
            room_counts_json: None,
            total_images: 0,
            created_at: String::new(),
        };

        let prompt = build_prompt(
            "What first?",
            &images,
            &messages,
            Some(3),
            Some(&listing),
            3,
            200,
        );

        assert!(prompt.starts_with("You are a home improvement advisor."));
        assert!(prompt.contains("- Listing ID: 3\n"));
        assert!(prompt.contains("- Price: $1,250,000\n"));
        assert!(prompt.contains("- Location: 90210\n"));
        assert!(prompt.contains(
            "1) Image id 7 - room: kitchen (conf=0.93), features: [\"island\"], condition: 0.78, light: 0.61\n"
        ));
        // Quoted history is truncated to the snippet cap
        assert!(prompt.contains(&format!("- user: {}...\n", "x".repeat(200))));
        assert!(prompt.contains("User question:\nWhat first?\n\n"));
        assert!(prompt.ends_with("If insufficient data, ask for clarification."));

        let again = build_prompt(
            "What first?",
            &images,
            &messages,
            Some(3),
            Some(&listing),
            3,
            200,
        );
        assert_eq!(prompt, again);
    }

    #[test]
    fn prompt_caps_quoted_history_at_three() {
        let hits: Vec<MessageHit> = (0..5)
            .map(|i| MessageHit {
                message_id: i,
                role: "user".to_string(),
                text: format!("message {i}"),
                similarity: 0.5,
            })
            .collect();

        let prompt = build_prompt("q", &[], &hits, None, None, 3, 200);
        assert_eq!(prompt.matches("- user: message").count(), 3);
    }
}
