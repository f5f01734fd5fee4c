//! Environment-driven process configuration.
//!
//! Every setting has a typed default matching what the core components
//! assume when unconfigured; `Config::load()` reads the environment once at
//! startup and the result is shared read-only for the life of the process.

use std::env;
use std::sync::Arc;

/// Immutable process configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Public origin used to build the `wss://` media-stream URL returned
    /// from the incoming-call webhook.
    pub base_url: String,
    /// Address the HTTP/WebSocket server binds to.
    pub host: String,
    pub port: u16,

    /// Silence duration (ms) that ends an utterance in `Listening`.
    pub silence_threshold_ms: u64,
    /// Consecutive voiced frames required to trigger barge-in.
    pub barge_in_threshold_frames: u32,
    /// Mean per-frame energy below which a narrowband frame is silent.
    pub vad_energy_threshold: u8,

    /// Max user turns retained before overflow-summarization kicks in.
    pub max_turns: usize,
    /// Upper bound on a single chat-driver completion round-trip.
    pub response_timeout_seconds: u64,

    /// Shared secret used to validate the carrier's webhook signature.
    pub webhook_signing_secret: String,
    /// Header name the carrier's webhook signature arrives in.
    pub webhook_signature_header: String,

    pub chat_base_url: String,
    pub chat_api_key: String,
    pub chat_model: String,

    pub stt_base_url: String,
    pub stt_api_key: String,

    pub tts_base_url: String,
    pub tts_api_key: String,
    pub tts_voice: String,

    /// Static persona prompt passed verbatim to the chat provider.
    pub persona_prompt: String,

    /// Filter string for `tracing_subscriber::EnvFilter`.
    pub log_filter: String,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    pub const DEFAULT_SILENCE_THRESHOLD_MS: u64 = 800;
    pub const DEFAULT_MAX_TURNS: usize = 50;
    pub const DEFAULT_RESPONSE_TIMEOUT_SECONDS: u64 = 10;
    pub const DEFAULT_BARGE_IN_THRESHOLD_FRAMES: u32 = 10;
    pub const DEFAULT_VAD_ENERGY_THRESHOLD: u8 = 10;

    /// Load configuration from the process environment, falling back to the
    /// defaults named in the component specs for anything unset.
    pub fn load() -> Arc<Self> {
        Arc::new(Self {
            base_url: env_or("BASE_URL", "http://localhost:8080"),
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse_or("PORT", 8080),

            silence_threshold_ms: env_parse_or(
                "SILENCE_THRESHOLD_MS",
                Self::DEFAULT_SILENCE_THRESHOLD_MS,
            ),
            barge_in_threshold_frames: env_parse_or(
                "BARGE_IN_THRESHOLD_FRAMES",
                Self::DEFAULT_BARGE_IN_THRESHOLD_FRAMES,
            ),
            vad_energy_threshold: env_parse_or(
                "VAD_ENERGY_THRESHOLD",
                Self::DEFAULT_VAD_ENERGY_THRESHOLD,
            ),

            max_turns: env_parse_or("MAX_TURNS", Self::DEFAULT_MAX_TURNS),
            response_timeout_seconds: env_parse_or(
                "RESPONSE_TIMEOUT_SECONDS",
                Self::DEFAULT_RESPONSE_TIMEOUT_SECONDS,
            ),

            webhook_signing_secret: env_or("WEBHOOK_SIGNING_SECRET", ""),
            webhook_signature_header: env_or("WEBHOOK_SIGNATURE_HEADER", "X-Webhook-Signature"),

            chat_base_url: env_or("CHAT_BASE_URL", "https://api.anthropic.com/v1"),
            chat_api_key: env_or("CHAT_API_KEY", ""),
            chat_model: env_or("CHAT_MODEL", "claude-sonnet-4-5"),

            stt_base_url: env_or("STT_BASE_URL", "https://api.openai.com/v1"),
            stt_api_key: env_or("STT_API_KEY", ""),

            tts_base_url: env_or("TTS_BASE_URL", "https://api.openai.com/v1"),
            tts_api_key: env_or("TTS_API_KEY", ""),
            tts_voice: env_or("TTS_VOICE", "nova"),

            persona_prompt: env_or(
                "PERSONA_PROMPT",
                "You are a courteous, efficient phone agent. Keep replies short.",
            ),

            log_filter: env_or("LOG_FILTER", "info"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parse_or_falls_back_on_missing() {
        let v: u64 = env_parse_or("VOXRELAY_TEST_DOES_NOT_EXIST", 42);
        assert_eq!(v, 42);
    }

    #[test]
    fn load_produces_spec_defaults_when_unset() {
        let cfg = Config::load();
        assert_eq!(cfg.silence_threshold_ms, 800);
        assert_eq!(cfg.max_turns, 50);
        assert_eq!(cfg.response_timeout_seconds, 10);
        assert_eq!(cfg.barge_in_threshold_frames, 10);
        assert_eq!(cfg.vad_energy_threshold, 10);
    }
}
