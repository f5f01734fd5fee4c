//! Voxrelay server entrypoint.

use std::sync::Arc;
use voxrelay::chat::ChatDriver;
use voxrelay::config::Config;
use voxrelay::conversation::ConversationRegistry;
use voxrelay::server::{self, ServerState};
use voxrelay::voice::{BaseStt, BaseTts, HttpStt, HttpTts};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Rustls 0.23+ requires an explicit default crypto provider.
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    let config = Config::load();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(config.log_filter.clone()))
        .init();

    let stt: Arc<dyn BaseStt> = Arc::new(HttpStt::new(&config));
    let tts: Arc<dyn BaseTts> = Arc::new(HttpTts::new(&config));
    let chat = Arc::new(ChatDriver::new(&config));

    tracing::info!("warming_up_providers");
    tokio::join!(stt.warmup(), tts.warmup(), chat.warmup());

    let state = ServerState {
        config,
        conversations: ConversationRegistry::new(),
        stt,
        tts,
        chat,
    };

    server::start(state).await
}
