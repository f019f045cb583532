use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use furigana_rs::annotate::Annotator;
use furigana_rs::config::Config;
use furigana_rs::history::JsonFileHistoryStore;
use furigana_rs::server::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "furigana_rs=info,tower_http=info".into()),
        )
        .init();

    let config = Config::load_from_default();
    if !config.is_llm_enabled() {
        tracing::warn!("No LLM provider configured; annotation requests will fail");
    }

    let history_path = config.history_path();
    tracing::info!("History file: {}", history_path.display());

    let state = AppState {
        annotator: Arc::new(Annotator::new(config.clone())),
        history: Arc::new(JsonFileHistoryStore::new(history_path)),
    };

    server::serve(state, &config.server.host, config.server.port).await
}
