//! Session orchestrator: the per-call state machine that turns inbound
//! narrowband frames into VAD-gated utterances, drives the transcribe →
//! chat → synthesize pipeline, and arbitrates barge-in against whatever
//! the pipeline is currently doing.
//!
//! Three cooperating tasks share one [`Session`]: the frame reader (owns
//! `Session` and calls its `handle_*` methods from the transport's receive
//! loop), a spawned pipeline task per utterance, and a sender task that
//! drains `OutboundEvent`s onto the wire. State that both the frame reader
//! and the pipeline must see — [`AgentState`], the mark counter, and the
//! interruption flag — is shared via `Arc`; everything else belongs to
//! whichever task owns it.

pub mod vad;

use crate::audio;
use crate::chat::ChatDriver;
use crate::conversation::ConversationStore;
use crate::config::Config;
use crate::voice::{BaseStt, BaseTts};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Minimum buffered utterance length (60ms narrowband) before the pipeline
/// is worth dispatching; shorter buffers are almost certainly a VAD blip.
const MIN_UTTERANCE_BYTES: usize = 480;

const APOLOGY_TEXT: &str = "Afsakið, það kom upp villa. Get ég hjálpað þér á annan hátt?";
const GREETING_TEXT: &str = "Góðan daginn, hvernig get ég aðstoðað þig?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Listening,
    Processing,
    Speaking,
}

/// Outbound wire events, decoupled from the transport's JSON encoding.
#[derive(Debug, Clone)]
pub enum OutboundEvent {
    Media { payload_b64: String },
    Mark { name: String },
    Clear,
}

struct PipelineHandle {
    join: tokio::task::JoinHandle<()>,
    cancel: CancellationToken,
}

/// Everything a spawned pipeline task needs, independent of the frame
/// reader's local (non-shared) VAD bookkeeping.
#[derive(Clone)]
struct PipelineContext {
    state: Arc<RwLock<AgentState>>,
    mark_counter: Arc<AtomicU64>,
    interrupted: Arc<AtomicBool>,
    stt: Arc<dyn BaseStt>,
    tts: Arc<dyn BaseTts>,
    chat: Arc<ChatDriver>,
    conversation: Arc<Mutex<ConversationStore>>,
    outbound_tx: mpsc::Sender<OutboundEvent>,
    persona_prompt: String,
    response_timeout_seconds: u64,
}

/// Per-call session state. Owned and driven by the transport's frame
/// reader; the pipeline and sender tasks it spawns hold only what they
/// need via `Arc`.
pub struct Session {
    call_sid: String,
    #[allow(dead_code)]
    caller: String,
    config: Arc<Config>,
    conversation: Arc<Mutex<ConversationStore>>,
    outbound_tx: mpsc::Sender<OutboundEvent>,

    state: Arc<RwLock<AgentState>>,
    mark_counter: Arc<AtomicU64>,
    interrupted: Arc<AtomicBool>,

    pipeline_ctx: PipelineContext,

    utterance_buffer: Vec<u8>,
    silence_start: Option<Instant>,
    has_speech: bool,
    barge_in_counter: u32,
    pipeline: Option<PipelineHandle>,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        call_sid: impl Into<String>,
        caller: impl Into<String>,
        config: Arc<Config>,
        stt: Arc<dyn BaseStt>,
        tts: Arc<dyn BaseTts>,
        chat: Arc<ChatDriver>,
        conversation: Arc<Mutex<ConversationStore>>,
        outbound_tx: mpsc::Sender<OutboundEvent>,
    ) -> Self {
        let call_sid = call_sid.into();
        let caller = caller.into();
        let state = Arc::new(RwLock::new(AgentState::Listening));
        let mark_counter = Arc::new(AtomicU64::new(0));
        let interrupted = Arc::new(AtomicBool::new(false));

        let pipeline_ctx = PipelineContext {
            state: state.clone(),
            mark_counter: mark_counter.clone(),
            interrupted: interrupted.clone(),
            stt,
            tts,
            chat,
            conversation: conversation.clone(),
            outbound_tx: outbound_tx.clone(),
            persona_prompt: config.persona_prompt.clone(),
            response_timeout_seconds: config.response_timeout_seconds,
        };

        Self {
            call_sid,
            caller,
            config,
            conversation,
            outbound_tx,
            state,
            mark_counter,
            interrupted,
            pipeline_ctx,
            utterance_buffer: Vec::new(),
            silence_start: None,
            has_speech: false,
            barge_in_counter: 0,
            pipeline: None,
        }
    }

    pub async fn state(&self) -> AgentState {
        *self.state.read().await
    }

    /// Speak the opening greeting. Called once, right after `start`.
    pub async fn greet(&mut self) {
        *self.state.write().await = AgentState::Speaking;
        self.speak_direct(GREETING_TEXT).await;
    }

    async fn speak_direct(&mut self, text: &str) {
        match self.pipeline_ctx.tts.synthesize(text).await {
            Ok(pcm) => {
                let rate = self.pipeline_ctx.tts.output_sample_rate();
                let _ = emit_speech(&self.outbound_tx, &self.mark_counter, &pcm, rate, None).await;
            }
            Err(e) => warn!(call_sid = %self.call_sid, error = %e, "tts_failed"),
        }
    }

    /// One inbound narrowband media frame, base64-decoded by the transport.
    pub async fn handle_media(&mut self, frame: &[u8]) {
        let silent = vad::is_silent(frame, self.config.vad_energy_threshold);
        let state = self.state().await;

        match state {
            AgentState::Speaking | AgentState::Processing => {
                if silent {
                    self.barge_in_counter = 0;
                    return;
                }
                self.barge_in_counter += 1;
                if self.barge_in_counter >= self.config.barge_in_threshold_frames {
                    self.interrupt().await;
                    self.utterance_buffer.clear();
                    self.utterance_buffer.extend_from_slice(frame);
                    self.has_speech = true;
                    self.silence_start = None;
                    self.barge_in_counter = 0;
                }
            }
            AgentState::Listening => {
                self.utterance_buffer.extend_from_slice(frame);
                if !silent {
                    self.has_speech = true;
                    self.silence_start = None;
                    return;
                }

                let now = Instant::now();
                let silence_start = *self.silence_start.get_or_insert(now);
                let elapsed_ms = now.duration_since(silence_start).as_millis() as u64;
                if self.has_speech
                    && elapsed_ms >= self.config.silence_threshold_ms
                    && self.utterance_buffer.len() > MIN_UTTERANCE_BYTES
                {
                    self.dispatch_pipeline().await;
                }
            }
        }
    }

    /// A mark echoed back by the transport. Only marks observed while
    /// `Speaking` end the turn — fillers played during `Processing` are
    /// acknowledged too, but they don't drive a state transition.
    pub async fn handle_mark(&mut self, _name: &str) {
        if self.state().await == AgentState::Speaking {
            *self.state.write().await = AgentState::Listening;
        }
    }

    pub async fn handle_stop(&mut self) {
        self.interrupt().await;
        self.conversation.lock().await.cleanup();
    }

    /// Cancel any in-flight pipeline, clear playback, and reset to
    /// `Listening`. Used both by barge-in and by `stop`.
    async fn interrupt(&mut self) {
        self.interrupted.store(true, Ordering::SeqCst);
        if let Some(handle) = self.pipeline.take() {
            handle.cancel.cancel();
            let _ = handle.join.await;
        }
        let _ = self.outbound_tx.send(OutboundEvent::Clear).await;
        self.utterance_buffer.clear();
        self.has_speech = false;
        *self.state.write().await = AgentState::Listening;
    }

    async fn dispatch_pipeline(&mut self) {
        let utterance = std::mem::take(&mut self.utterance_buffer);
        self.silence_start = None;
        self.has_speech = false;
        self.interrupted.store(false, Ordering::SeqCst);
        *self.state.write().await = AgentState::Processing;

        let cancel = CancellationToken::new();
        let ctx = self.pipeline_ctx.clone();
        let call_sid = self.call_sid.clone();
        let join = tokio::spawn(run_pipeline(ctx, call_sid, utterance, cancel.clone()));
        self.pipeline = Some(PipelineHandle { join, cancel });
    }
}

async fn run_pipeline(ctx: PipelineContext, call_sid: String, utterance: Vec<u8>, cancel: CancellationToken) {
    let wideband = audio::mulaw_to_pcm16(&utterance, 16000);

    let transcription = tokio::select! {
        _ = cancel.cancelled() => return,
        result = ctx.stt.transcribe(&wideband) => result,
    };

    let transcription = match transcription {
        Ok(t) => t,
        Err(e) => {
            warn!(call_sid = %call_sid, error = %e, "stt_failed");
            speak_text(&ctx, APOLOGY_TEXT, &cancel).await;
            *ctx.state.write().await = AgentState::Listening;
            return;
        }
    };

    if transcription.text.trim().is_empty() {
        *ctx.state.write().await = AgentState::Listening;
        return;
    }

    info!(call_sid = %call_sid, "utterance_transcribed");
    ctx.conversation.lock().await.add_user(transcription.text.clone());

    if !ctx.interrupted.load(Ordering::SeqCst) {
        if let Some(filler) = ctx.tts.get_filler_audio("thinking").await {
            let rate = ctx.tts.output_sample_rate();
            let _ = emit_speech(&ctx.outbound_tx, &ctx.mark_counter, &filler, rate, Some(&cancel)).await;
        }
    }

    let messages = ctx.conversation.lock().await.get_messages();
    let sentence_stream = ctx.chat.clone().get_response(messages, ctx.persona_prompt.clone());
    tokio::pin!(sentence_stream);

    let deadline = tokio::time::sleep(Duration::from_secs(ctx.response_timeout_seconds));
    tokio::pin!(deadline);

    let mut accumulated = String::new();
    let mut timed_out = false;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = &mut deadline => {
                timed_out = true;
                break;
            }
            next = sentence_stream.next() => {
                match next {
                    Some(sentence) => {
                        if ctx.interrupted.load(Ordering::SeqCst) {
                            return;
                        }
                        if !accumulated.is_empty() {
                            accumulated.push(' ');
                        }
                        accumulated.push_str(sentence.trim());
                    }
                    None => break,
                }
            }
        }
    }

    if timed_out {
        warn!(call_sid = %call_sid, "chat_response_timed_out");
        speak_text(&ctx, APOLOGY_TEXT, &cancel).await;
        *ctx.state.write().await = AgentState::Listening;
        return;
    }

    if accumulated.trim().is_empty() {
        *ctx.state.write().await = AgentState::Listening;
        return;
    }

    let _ = ctx.outbound_tx.send(OutboundEvent::Clear).await;
    *ctx.state.write().await = AgentState::Speaking;
    speak_text(&ctx, &accumulated, &cancel).await;
    ctx.conversation.lock().await.add_assistant(accumulated);
}

async fn speak_text(ctx: &PipelineContext, text: &str, cancel: &CancellationToken) {
    match ctx.tts.synthesize(text).await {
        Ok(pcm) => {
            let rate = ctx.tts.output_sample_rate();
            let _ = emit_speech(&ctx.outbound_tx, &ctx.mark_counter, &pcm, rate, Some(cancel)).await;
        }
        Err(e) => warn!(error = %e, "tts_failed"),
    }
}

/// Transcode wideband PCM to narrowband, chunk to frame size, send every
/// chunk, and emit one mark afterward. Bails out early (dropping the mark)
/// if `cancel` fires mid-stream.
async fn emit_speech(
    outbound_tx: &mpsc::Sender<OutboundEvent>,
    mark_counter: &AtomicU64,
    wideband_pcm: &[u8],
    input_rate: u32,
    cancel: Option<&CancellationToken>,
) -> Result<(), ()> {
    let narrowband = audio::pcm16_to_mulaw(wideband_pcm, input_rate).map_err(|_| ())?;
    let chunks = audio::chunk_audio(&narrowband, audio::FRAME_MS, audio::NARROWBAND_RATE, 1);

    for chunk in chunks {
        if cancel.is_some_and(|c| c.is_cancelled()) {
            return Err(());
        }
        let payload_b64 = BASE64.encode(&chunk);
        if outbound_tx.send(OutboundEvent::Media { payload_b64 }).await.is_err() {
            return Err(());
        }
    }

    let mark_id = mark_counter.fetch_add(1, Ordering::SeqCst);
    let _ = outbound_tx.send(OutboundEvent::Mark { name: format!("mark-{mark_id}") }).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_utterance_bytes_is_at_least_one_frame() {
        assert!(MIN_UTTERANCE_BYTES >= audio::narrowband_frame_len());
    }

    #[test]
    fn apology_text_carries_the_spec_marker() {
        assert!(APOLOGY_TEXT.contains("Afsakið"));
    }
}
