pub mod ai;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod quiz;
pub mod routes;
pub mod state;
pub mod store;

use std::sync::Arc;

/// Wires the store and AI collaborators chosen by `config`.
///
/// A reachable `DATABASE_URL` selects MySQL; otherwise users live in memory
/// (optionally snapshotted to `LOCAL_STATE_PATH`). Without `GEMINI_API_KEY`
/// the mock AI client answers.
pub async fn build_state(config: &config::Config) -> anyhow::Result<state::AppState> {
    let store: Arc<dyn store::UserStore> = match config.database_url.as_deref() {
        Some(db_url) => match store::MySqlStore::connect(db_url).await {
            Ok(mysql) => Arc::new(mysql),
            Err(err) => {
                tracing::warn!(
                    "mysql is unavailable ({}), backend continues in local in-memory mode",
                    err
                );
                Arc::new(store::InMemoryStore::new(config.local_state_path.as_deref()))
            }
        },
        None => Arc::new(store::InMemoryStore::new(config.local_state_path.as_deref())),
    };

    let ai_client: Arc<dyn ai::AiClient> = match config.gemini.api_key.clone() {
        Some(key) => {
            let gemini = ai::GeminiAiClient::new(&config.gemini, key)?;
            tracing::info!(
                chat_model = gemini.chat_model(),
                quiz_model = gemini.quiz_model(),
                "gemini enabled"
            );
            Arc::new(gemini)
        }
        None => {
            tracing::info!("gemini disabled (no GEMINI_API_KEY), using mock replies");
            Arc::new(ai::MockAiClient)
        }
    };

    Ok(state::AppState::new(store, ai_client))
}
