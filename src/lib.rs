//! Voxrelay - Real-Time Telephony Voice Agent
//!
//! Bridges a carrier's bidirectional audio WebSocket to a streaming chat
//! provider: mu-law transcoding, voice-activity-gated utterance capture,
//! barge-in, and per-call conversation history with deterministic
//! overflow-summarization.

pub mod audio;
pub mod chat;
pub mod config;
pub mod conversation;
pub mod orchestrator;
pub mod server;
pub mod types;
pub mod voice;

pub use config::Config;
pub use conversation::ConversationRegistry;
pub use server::{start as start_server, ServerState};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
