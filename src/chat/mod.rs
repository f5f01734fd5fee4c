//! Streaming chat driver: wraps a content-block streaming chat provider,
//! emits complete sentences as soon as they're detected, and runs the
//! tool-use round-trip loop transparently.

pub mod segmenter;
pub mod tools;

use crate::config::Config;
use crate::types::ToolInvocation;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tokio_stream::Stream;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ChatDriverError {
    #[error("chat provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("chat provider returned status {0}")]
    BadStatus(reqwest::StatusCode),
}

/// Tagged content-block stream events the provider emits over SSE.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum StreamEvent {
    #[serde(rename = "content_block_start")]
    ContentBlockStart { index: usize, content_block: ContentBlock },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { index: usize, delta: Delta },
    #[serde(rename = "content_block_stop")]
    #[allow(dead_code)]
    ContentBlockStop { index: usize },
    #[serde(rename = "message_stop")]
    MessageStop,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text {},
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Delta {
    #[serde(rename = "text_delta")]
    Text { text: String },
    #[serde(rename = "input_json_delta")]
    InputJson { partial_json: String },
    #[serde(other)]
    Other,
}

/// Accumulator for one open tool-use content block.
#[derive(Default)]
struct OpenToolUse {
    id: String,
    name: String,
    input_json: String,
}

struct StreamOutcome {
    sentences: Vec<String>,
    tool_calls: Vec<ToolInvocation>,
    full_text: String,
}

pub struct ChatDriver {
    client: Arc<reqwest::Client>,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl ChatDriver {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Arc::new(reqwest::Client::new()),
            base_url: config.chat_base_url.clone(),
            api_key: config.chat_api_key.clone(),
            model: config.chat_model.clone(),
            max_tokens: 300,
            temperature: 0.7,
        }
    }

    /// Warm the provider connection with a minimal completion.
    pub async fn warmup(&self) {
        let body = json!({
            "model": self.model,
            "max_tokens": 8,
            "messages": [{"role": "user", "content": "hello"}],
        });
        if let Err(e) = self.post(&body).await {
            warn!(error = %e, "chat_warmup_failed");
        }
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, ChatDriverError> {
        let resp = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ChatDriverError::BadStatus(resp.status()));
        }
        Ok(resp)
    }

    /// Stream one completion round, extracting sentences and any tool calls.
    async fn stream_once(
        &self,
        messages: &[Value],
        system_prompt: &str,
        tool_defs: &[tools::ToolDefinition],
    ) -> Result<StreamOutcome, ChatDriverError> {
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "system": system_prompt,
            "messages": messages,
            "tools": tool_defs,
            "stream": true,
        });

        let response = self.post(&body).await?;
        let mut byte_stream = response.bytes_stream();

        let mut segmenter = segmenter::SentenceSegmenter::new();
        let mut sentences = Vec::new();
        let mut tool_calls = Vec::new();
        let mut full_text = String::new();
        let mut open_tool: Option<OpenToolUse> = None;
        let mut sse_buffer = String::new();

        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk?;
            sse_buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = sse_buffer.find("\n\n") {
                let event_block: String = sse_buffer.drain(..pos + 2).collect();
                for line in event_block.lines() {
                    let Some(data) = line.strip_prefix("data: ") else { continue };
                    let Ok(event) = serde_json::from_str::<StreamEvent>(data) else { continue };

                    match event {
                        StreamEvent::ContentBlockStart { content_block: ContentBlock::ToolUse { id, name }, .. } => {
                            open_tool = Some(OpenToolUse { id, name, input_json: String::new() });
                        }
                        StreamEvent::ContentBlockStart { .. } => {}
                        StreamEvent::ContentBlockDelta { delta: Delta::Text { text }, .. } => {
                            full_text.push_str(&text);
                            sentences.extend(segmenter.push(&text));
                        }
                        StreamEvent::ContentBlockDelta { delta: Delta::InputJson { partial_json }, .. } => {
                            if let Some(tool) = open_tool.as_mut() {
                                tool.input_json.push_str(&partial_json);
                            }
                        }
                        StreamEvent::ContentBlockDelta { .. } => {}
                        StreamEvent::ContentBlockStop { .. } => {
                            if let Some(tool) = open_tool.take() {
                                let input = serde_json::from_str::<Value>(&tool.input_json)
                                    .unwrap_or_else(|_| json!({}));
                                tool_calls.push(ToolInvocation { id: tool.id, name: tool.name, input });
                            }
                        }
                        StreamEvent::MessageStop | StreamEvent::Other => {}
                    }
                }
            }
        }

        if let Some(sentence) = segmenter.finish() {
            sentences.push(sentence);
        }

        Ok(StreamOutcome { sentences, tool_calls, full_text })
    }

    /// Stream complete sentences for one chat exchange, transparently
    /// running the tool-use loop when the model requests tools.
    pub fn get_response(
        self: Arc<Self>,
        mut messages: Vec<Value>,
        system_prompt: String,
    ) -> impl Stream<Item = String> {
        async_stream::stream! {
            let tool_defs = tools::catalog();
            loop {
                let outcome = match self.stream_once(&messages, &system_prompt, &tool_defs).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(error = %e, "chat_stream_failed");
                        break;
                    }
                };

                for sentence in outcome.sentences {
                    yield sentence;
                }

                if outcome.tool_calls.is_empty() {
                    break;
                }

                let mut assistant_content = Vec::new();
                if !outcome.full_text.is_empty() {
                    assistant_content.push(json!({"type": "text", "text": outcome.full_text}));
                }
                for call in &outcome.tool_calls {
                    assistant_content.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.input,
                    }));
                }
                messages.push(json!({"role": "assistant", "content": assistant_content}));

                let mut tool_results = Vec::new();
                for call in &outcome.tool_calls {
                    let result = tools::execute_tool(&call.name, &call.input).await;
                    tool_results.push(json!({
                        "type": "tool_result",
                        "tool_use_id": call.id,
                        "content": result,
                    }));
                }
                messages.push(json!({"role": "user", "content": tool_results}));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_event_parses_text_delta() {
        let data = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"hi"}}"#;
        let event: StreamEvent = serde_json::from_str(data).unwrap();
        matches!(event, StreamEvent::ContentBlockDelta { delta: Delta::Text { .. }, .. });
    }

    #[test]
    fn stream_event_parses_tool_use_start() {
        let data = r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_1","name":"check_availability"}}"#;
        let event: StreamEvent = serde_json::from_str(data).unwrap();
        match event {
            StreamEvent::ContentBlockStart { content_block: ContentBlock::ToolUse { id, name }, .. } => {
                assert_eq!(id, "toolu_1");
                assert_eq!(name, "check_availability");
            }
            _ => panic!("expected tool_use content block start"),
        }
    }

    #[test]
    fn unrecognized_event_type_does_not_error() {
        let data = r#"{"type":"ping"}"#;
        let event: StreamEvent = serde_json::from_str(data).unwrap();
        matches!(event, StreamEvent::Other);
    }
}
