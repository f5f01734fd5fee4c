//! Speech-to-text capability contract and an HTTP-backed reference adapter.

use crate::config::Config;
use crate::types::TranscriptionResult;
use async_trait::async_trait;
use std::io::Cursor;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SttError {
    #[error("failed to frame audio for transcription: {0}")]
    Framing(#[from] hound::Error),
    #[error("transcription request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("provider returned status {0}")]
    BadStatus(reqwest::StatusCode),
}

/// Narrow capability contract for speech-to-text providers. Implementations
/// are swappable without touching the orchestrator.
#[async_trait]
pub trait BaseStt: Send + Sync {
    /// Transcribe a complete utterance of 16 kHz mono PCM16 audio.
    async fn transcribe(&self, wideband_pcm: &[u8]) -> Result<TranscriptionResult, SttError>;

    /// Warm up the provider connection (called once at startup).
    async fn warmup(&self);

    /// Release transport resources.
    async fn close(&self);
}

/// Reference STT adapter against an OpenAI-compatible `/audio/transcriptions`
/// endpoint.
pub struct HttpStt {
    client: Arc<reqwest::Client>,
    base_url: String,
    api_key: String,
}

impl HttpStt {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Arc::new(reqwest::Client::new()),
            base_url: config.stt_base_url.clone(),
            api_key: config.stt_api_key.clone(),
        }
    }
}

fn pcm16_to_wav(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let mut cursor = Cursor::new(Vec::new());
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
    for chunk in pcm.chunks_exact(2) {
        writer.write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))?;
    }
    writer.finalize()?;
    Ok(cursor.into_inner())
}

#[async_trait]
impl BaseStt for HttpStt {
    async fn transcribe(&self, wideband_pcm: &[u8]) -> Result<TranscriptionResult, SttError> {
        if wideband_pcm.is_empty() {
            return Ok(TranscriptionResult { text: String::new(), confidence: 0.0, is_final: true });
        }

        let wav_bytes = pcm16_to_wav(wideband_pcm, 16000)?;
        let part = reqwest::multipart::Part::bytes(wav_bytes)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .expect("static mime type is valid");
        let form = reqwest::multipart::Form::new()
            .text("model", "whisper-1")
            .part("file", part);

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SttError::BadStatus(response.status()));
        }

        let body: serde_json::Value = response.json().await?;
        let text = body.get("text").and_then(|t| t.as_str()).unwrap_or("").trim().to_string();

        Ok(TranscriptionResult { text, confidence: 1.0, is_final: true })
    }

    async fn warmup(&self) {
        let silence = vec![0u8; 320]; // 10ms of 16kHz PCM16 silence
        let _ = self.transcribe(&silence).await;
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm16_to_wav_produces_riff_header() {
        let pcm = vec![0u8; 320];
        let wav = pcm16_to_wav(&pcm, 16000).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
    }

    #[tokio::test]
    async fn empty_utterance_short_circuits_without_a_request() {
        let stt = HttpStt {
            client: Arc::new(reqwest::Client::new()),
            base_url: "http://127.0.0.1:0".to_string(),
            api_key: String::new(),
        };
        let result = stt.transcribe(&[]).await.unwrap();
        assert!(result.text.is_empty());
        assert_eq!(result.confidence, 0.0);
    }
}
