//! Text-to-speech capability contract, an HTTP-backed reference adapter, and
//! the process-wide filler-phrase cache populated at warmup.

use crate::config::Config;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::warn;

/// Filler phrase keys the TTS adapter must pre-synthesize at warmup.
pub const FILLER_KEYS: &[&str] = &["thinking", "checking"];

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("synthesis request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("provider returned status {0}")]
    BadStatus(reqwest::StatusCode),
    #[error("failed to decode synthesized audio: {0}")]
    Decode(#[from] hound::Error),
}

/// Narrow capability contract for text-to-speech providers.
#[async_trait]
pub trait BaseTts: Send + Sync {
    /// Sample rate of the PCM16 audio `synthesize` returns.
    fn output_sample_rate(&self) -> u32;

    /// Synthesize `text` to wideband (16-bit signed PCM) audio.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, TtsError>;

    /// Pre-cached filler phrase audio, or `None` if not cached.
    async fn get_filler_audio(&self, key: &str) -> Option<Vec<u8>>;

    /// Warm up the connection and populate the filler cache.
    async fn warmup(&self);

    /// Release transport resources.
    async fn close(&self);
}

/// Reference TTS adapter against an OpenAI-compatible `/audio/speech`
/// endpoint.
pub struct HttpTts {
    client: Arc<reqwest::Client>,
    base_url: String,
    api_key: String,
    voice: String,
    output_rate: u32,
    filler_cache: RwLock<HashMap<String, Vec<u8>>>,
}

impl HttpTts {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Arc::new(reqwest::Client::new()),
            base_url: config.tts_base_url.clone(),
            api_key: config.tts_api_key.clone(),
            voice: config.tts_voice.clone(),
            output_rate: 24000,
            filler_cache: RwLock::new(HashMap::new()),
        }
    }

    async fn synthesize_uncached(&self, text: &str) -> Result<Vec<u8>, TtsError> {
        let body = serde_json::json!({
            "model": "tts-1",
            "input": text,
            "voice": self.voice,
            "response_format": "wav",
        });

        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TtsError::BadStatus(response.status()));
        }

        let wav_bytes = response.bytes().await?;
        Ok(wav_to_pcm16(&wav_bytes)?)
    }
}

fn wav_to_pcm16(wav_bytes: &[u8]) -> Result<Vec<u8>, hound::Error> {
    let mut reader = hound::WavReader::new(Cursor::new(wav_bytes))?;
    let spec = reader.spec();

    let mut pcm = Vec::new();
    match spec.sample_format {
        hound::SampleFormat::Int => {
            for sample in reader.samples::<i32>() {
                let sample = sample?;
                let scaled = match spec.bits_per_sample {
                    16 => sample as i16,
                    32 => (sample >> 16) as i16,
                    bits => (sample >> (bits - 16)) as i16,
                };
                pcm.extend_from_slice(&scaled.to_le_bytes());
            }
        }
        hound::SampleFormat::Float => {
            for sample in reader.samples::<f32>() {
                let sample = sample?;
                let scaled = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                pcm.extend_from_slice(&scaled.to_le_bytes());
            }
        }
    }
    Ok(pcm)
}

#[async_trait]
impl BaseTts for HttpTts {
    fn output_sample_rate(&self) -> u32 {
        self.output_rate
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, TtsError> {
        self.synthesize_uncached(text).await
    }

    async fn get_filler_audio(&self, key: &str) -> Option<Vec<u8>> {
        self.filler_cache.read().await.get(key).cloned()
    }

    async fn warmup(&self) {
        for &key in FILLER_KEYS {
            match self.synthesize_uncached(key).await {
                Ok(audio) => {
                    self.filler_cache.write().await.insert(key.to_string(), audio);
                }
                Err(e) => warn!(error = %e, key, "tts_filler_warmup_failed"),
            }
        }
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_wav(samples: &[i16]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 24000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn wav_to_pcm16_round_trips_int16_samples() {
        let samples = [0i16, 100, -100, i16::MAX, i16::MIN];
        let wav = minimal_wav(&samples);
        let pcm = wav_to_pcm16(&wav).unwrap();
        let decoded: Vec<i16> = pcm
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(decoded, samples);
    }

    #[tokio::test]
    async fn filler_cache_starts_empty() {
        let tts = HttpTts {
            client: Arc::new(reqwest::Client::new()),
            base_url: "http://127.0.0.1:0".to_string(),
            api_key: String::new(),
            voice: "nova".to_string(),
            output_rate: 24000,
            filler_cache: RwLock::new(HashMap::new()),
        };
        assert!(tts.get_filler_audio("thinking").await.is_none());
    }
}
