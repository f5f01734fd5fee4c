//! Per-call conversation history with deterministic overflow-summarization,
//! and the process-wide registry of active call stores.

use crate::types::{Message, Role};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

#[derive(Debug, Clone)]
pub struct ConversationMetadata {
    pub call_sid: String,
    pub caller: String,
    pub started_at: DateTime<Utc>,
    pub turn_count: usize,
}

/// Per-call store of ordered messages plus metadata.
pub struct ConversationStore {
    metadata: ConversationMetadata,
    messages: Vec<Message>,
    max_turns: usize,
}

impl ConversationStore {
    pub fn new(call_sid: impl Into<String>, caller: impl Into<String>, max_turns: usize) -> Self {
        Self {
            metadata: ConversationMetadata {
                call_sid: call_sid.into(),
                caller: caller.into(),
                started_at: Utc::now(),
                turn_count: 0,
            },
            messages: Vec::new(),
            max_turns,
        }
    }

    /// Append a user message, bump the turn count, and summarize on overflow.
    pub fn add_user(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
        self.metadata.turn_count += 1;
        if self.user_message_count() > self.max_turns {
            self.trim_if_needed();
        }
    }

    /// Append an assistant message. Does not affect turn count.
    pub fn add_assistant(&mut self, text: impl Into<String>) {
        self.messages.push(Message::assistant(text));
    }

    /// Snapshot of `{role, content}` entries suitable for the chat provider.
    pub fn get_messages(&self) -> Vec<serde_json::Value> {
        self.messages
            .iter()
            .map(|m| serde_json::json!({"role": m.role.to_string(), "content": m.content}))
            .collect()
    }

    /// Plain-text summary: caller identity, user-turn count, elapsed
    /// minutes, and the truncated tail of the most recent message.
    pub fn get_summary(&self) -> String {
        let elapsed_minutes = (Utc::now() - self.metadata.started_at).num_seconds() as f64 / 60.0;
        let tail = self
            .messages
            .last()
            .map(|m| truncate(&m.content, 160))
            .unwrap_or_else(|| "(no messages yet)".to_string());

        format!(
            "Samantekt: caller {} spoke {} turn(s) over {:.1} min. Last message: {}",
            self.metadata.caller, self.metadata.turn_count, elapsed_minutes, tail
        )
    }

    /// Log aggregate timings and release the stored history.
    pub fn cleanup(&mut self) {
        let elapsed = Utc::now() - self.metadata.started_at;
        info!(
            call_sid = %self.metadata.call_sid,
            turn_count = self.metadata.turn_count,
            elapsed_secs = elapsed.num_seconds(),
            "conversation_cleanup"
        );
        self.messages.clear();
    }

    pub fn metadata(&self) -> &ConversationMetadata {
        &self.metadata
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    fn user_message_count(&self) -> usize {
        self.messages.iter().filter(|m| m.role == Role::User).count()
    }

    /// Replace everything except the first two messages and the last
    /// `max(4, 2*(max_turns-2))` with a single synthesized summary message.
    fn trim_if_needed(&mut self) {
        if self.messages.len() <= 2 {
            return;
        }
        let keep_recent = (2 * self.max_turns.saturating_sub(2)).max(4);
        if self.messages.len() <= 2 + keep_recent {
            return;
        }

        let summary = self.get_summary();
        let prefix: Vec<Message> = self.messages[..2].to_vec();
        let suffix_start = self.messages.len() - keep_recent;
        let suffix: Vec<Message> = self.messages[suffix_start..].to_vec();

        let mut trimmed = prefix;
        trimmed.push(Message::assistant(summary));
        trimmed.extend(suffix);
        self.messages = trimmed;
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{truncated}…")
    }
}

/// Process-wide concurrent mapping from call id to active conversation store.
pub struct ConversationRegistry {
    stores: RwLock<HashMap<String, Arc<Mutex<ConversationStore>>>>,
}

impl ConversationRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { stores: RwLock::new(HashMap::new()) })
    }

    /// Idempotently fetch or create the store for `call_sid`.
    pub async fn get_or_create(
        &self,
        call_sid: &str,
        caller: &str,
        max_turns: usize,
    ) -> Arc<Mutex<ConversationStore>> {
        if let Some(existing) = self.stores.read().await.get(call_sid) {
            return existing.clone();
        }
        let mut stores = self.stores.write().await;
        stores
            .entry(call_sid.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ConversationStore::new(call_sid, caller, max_turns))))
            .clone()
    }

    /// Remove a call's store; tolerant of absent keys.
    pub async fn remove(&self, call_sid: &str) {
        self.stores.write().await.remove(call_sid);
    }

    pub async fn count(&self) -> usize {
        self.stores.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_count_matches_add_user_invocations() {
        let mut store = ConversationStore::new("CA1", "+15551234567", 50);
        store.add_user("hi");
        store.add_user("again");
        assert_eq!(store.metadata().turn_count, 2);
    }

    #[test]
    fn overflow_summarization_keeps_anchor_and_tail() {
        let mut store = ConversationStore::new("CA1", "+15551234567", 5);
        for i in 0..10 {
            store.add_user(format!("user turn {i}"));
            store.add_assistant(format!("assistant reply {i}"));
        }

        assert!(store.message_count() < 20);
        assert_eq!(store.messages[0].content, "user turn 0");
        assert_eq!(store.messages[1].content, "assistant reply 0");

        let last_six: Vec<&str> = store.messages[store.messages.len() - 6..]
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(
            last_six,
            vec![
                "assistant reply 6",
                "user turn 7",
                "assistant reply 7",
                "user turn 8",
                "assistant reply 8",
                "user turn 9",
            ]
        );

        let summary_position = &store.messages[2];
        assert_eq!(summary_position.role, Role::Assistant);
        assert!(summary_position.content.contains("Samantekt"));
    }

    #[tokio::test]
    async fn registry_get_or_create_is_idempotent() {
        let registry = ConversationRegistry::new();
        let a = registry.get_or_create("CA1", "+1555", 50).await;
        let b = registry.get_or_create("CA1", "+1555", 50).await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn registry_remove_tolerates_absent_key() {
        let registry = ConversationRegistry::new();
        registry.remove("does-not-exist").await;
        assert_eq!(registry.count().await, 0);
    }
}
