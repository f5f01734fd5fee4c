//! Session-level integration tests exercising the orchestrator's state
//! machine directly, against fake STT/TTS adapters so nothing touches the
//! network. The chat driver is pointed at an unreachable address — its
//! requests fail fast, exercising the "no response" path deterministically
//! without depending on the network being present.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use voxrelay::chat::ChatDriver;
use voxrelay::config::Config;
use voxrelay::conversation::ConversationStore;
use voxrelay::orchestrator::{AgentState, OutboundEvent, Session};
use voxrelay::types::TranscriptionResult;
use voxrelay::voice::{BaseStt, BaseTts, SttError, TtsError};

struct FakeStt {
    transcript: String,
}

#[async_trait]
impl BaseStt for FakeStt {
    async fn transcribe(&self, _wideband_pcm: &[u8]) -> Result<TranscriptionResult, SttError> {
        Ok(TranscriptionResult { text: self.transcript.clone(), confidence: 1.0, is_final: true })
    }
    async fn warmup(&self) {}
    async fn close(&self) {}
}

struct FakeTts;

#[async_trait]
impl BaseTts for FakeTts {
    fn output_sample_rate(&self) -> u32 {
        8000
    }
    async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, TtsError> {
        Ok(vec![0u8; 3200]) // 200ms of silence at 8kHz/16-bit
    }
    async fn get_filler_audio(&self, _key: &str) -> Option<Vec<u8>> {
        None
    }
    async fn warmup(&self) {}
    async fn close(&self) {}
}

fn unreachable_chat() -> Arc<ChatDriver> {
    let mut config = (*Config::load()).clone();
    config.chat_base_url = "http://127.0.0.1:1".to_string();
    Arc::new(ChatDriver::new(&config))
}

fn new_session(outbound_tx: mpsc::Sender<OutboundEvent>) -> Session {
    let config = Config::load();
    let conversation = Arc::new(Mutex::new(ConversationStore::new("CA_TEST", "+15550001111", config.max_turns)));
    Session::new(
        "CA_TEST",
        "+15550001111",
        config,
        Arc::new(FakeStt { transcript: "Halló, ég þarf aðstoð".to_string() }),
        Arc::new(FakeTts),
        unreachable_chat(),
        conversation,
        outbound_tx,
    )
}

fn loud_frame() -> Vec<u8> {
    vec![0x00u8; 160]
}

fn silent_frame() -> Vec<u8> {
    vec![0xFFu8; 160]
}

#[tokio::test]
async fn greeting_sends_media_then_one_mark_and_ends_in_listening() {
    let (tx, mut rx) = mpsc::channel(64);
    let mut session = new_session(tx);

    session.greet().await;

    let mut saw_media = false;
    let mut mark_name = None;
    while let Ok(event) = rx.try_recv() {
        match event {
            OutboundEvent::Media { .. } => saw_media = true,
            OutboundEvent::Mark { name } => mark_name = Some(name),
            OutboundEvent::Clear => {}
        }
    }

    assert!(saw_media, "greeting should produce at least one media frame");
    let mark_name = mark_name.expect("greeting should end with a mark");
    assert_eq!(session.state().await, AgentState::Speaking);

    session.handle_mark(&mark_name).await;
    assert_eq!(session.state().await, AgentState::Listening);
}

#[tokio::test]
async fn sustained_loud_audio_while_speaking_triggers_barge_in() {
    let (tx, mut rx) = mpsc::channel(64);
    let mut session = new_session(tx);
    session.greet().await;
    while rx.try_recv().is_ok() {} // drain the greeting's own media/mark

    let threshold = Config::load().barge_in_threshold_frames as usize;
    for _ in 0..threshold {
        session.handle_media(&loud_frame()).await;
    }

    assert_eq!(session.state().await, AgentState::Listening);
    let saw_clear = std::iter::from_fn(|| rx.try_recv().ok()).any(|e| matches!(e, OutboundEvent::Clear));
    assert!(saw_clear, "barge-in should clear in-flight playback");
}

#[tokio::test]
async fn silence_while_speaking_does_not_interrupt() {
    let (tx, _rx) = mpsc::channel(64);
    let mut session = new_session(tx);
    session.greet().await;

    let threshold = Config::load().barge_in_threshold_frames as usize;
    for _ in 0..(threshold * 2) {
        session.handle_media(&silent_frame()).await;
    }

    assert_eq!(session.state().await, AgentState::Speaking);
}

#[tokio::test]
async fn stop_clears_conversation_and_resets_to_listening() {
    let (tx, _rx) = mpsc::channel(64);
    let mut session = new_session(tx);
    session.greet().await;

    session.handle_stop().await;
    assert_eq!(session.state().await, AgentState::Listening);
}
