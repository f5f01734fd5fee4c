//! Provider-facing speech capability contracts (§4.4): narrow async traits
//! with a single HTTP-backed implementation each. No inheritance hierarchy —
//! a process instantiates exactly one of each per startup config.

pub mod stt;
pub mod tts;

pub use stt::{BaseStt, HttpStt, SttError};
pub use tts::{BaseTts, HttpTts, TtsError};
