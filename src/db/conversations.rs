//! Conversation and message storage for the chat context assembler.

use anyhow::Result;
use rusqlite::params;

use super::index::{bytes_to_embedding, embedding_to_bytes};
use super::{now_timestamp, Database};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub role: String,
    pub text: String,
    pub embedding: Option<Vec<f32>>,
    pub created_at: String,
}

/// Latency measurements recorded alongside a persisted message.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageLatencies {
    pub embedding_ms: Option<f64>,
    pub retrieval_ms: Option<f64>,
    pub llm_ms: Option<f64>,
}

impl Database {
    pub fn create_conversation(
        &self,
        user_id: Option<&str>,
        listing_id: Option<i64>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO conversations (user_id, listing_id, created_at) VALUES (?, ?, ?)",
            params![user_id, listing_id, now_timestamp()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn conversation_exists(&self, conversation_id: i64) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM conversations WHERE id = ?)",
            [conversation_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn add_message(
        &self,
        conversation_id: i64,
        role: MessageRole,
        text: &str,
        embedding: Option<&[f32]>,
        latencies: MessageLatencies,
    ) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO messages (
                conversation_id, role, text, embedding,
                embedding_latency_ms, retrieval_latency_ms, llm_latency_ms,
                created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                conversation_id,
                role.as_str(),
                text,
                embedding.map(embedding_to_bytes),
                latencies.embedding_ms,
                latencies.retrieval_ms,
                latencies.llm_ms,
                now_timestamp(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Messages in chronological order. The id tiebreak keeps the order
    /// strict even when two writes share a timestamp.
    pub fn get_conversation_messages(&self, conversation_id: i64) -> Result<Vec<Message>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, conversation_id, role, text, embedding, created_at
            FROM messages
            WHERE conversation_id = ?
            ORDER BY created_at, id
            "#,
        )?;

        let messages = stmt
            .query_map([conversation_id], |row| {
                let embedding: Option<Vec<u8>> = row.get(4)?;
                Ok(Message {
                    id: row.get(0)?,
                    conversation_id: row.get(1)?,
                    role: row.get(2)?,
                    text: row.get(3)?,
                    embedding: embedding.as_deref().map(bytes_to_embedding),
                    created_at: row.get(5)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(messages)
    }

    /// Messages of one conversation that carry an embedding, for
    /// similarity ranking over prior turns.
    pub fn embedded_messages(&self, conversation_id: i64) -> Result<Vec<Message>> {
        let messages = self
            .get_conversation_messages(conversation_id)?
            .into_iter()
            .filter(|m| m.embedding.is_some())
            .collect();
        Ok(messages)
    }
}
