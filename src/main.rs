use std::net::SocketAddr;
use std::sync::Arc;

use dotenvy::dotenv;
use tracing_subscriber::EnvFilter;

use stepflow::config::AppConfig;
use stepflow::engine::Engine;
use stepflow::gateway::{router, AppState};
use stepflow::llm::{LlmRouter, MockProvider};
use stepflow::store::MemoryStore;
#[cfg(feature = "postgres")]
use stepflow::store::PgStore;
use stepflow::store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(true)
        .init();

    let config = AppConfig::from_env();

    let store: Arc<dyn Store> = match &config.database_url {
        #[cfg(feature = "postgres")]
        Some(url) => {
            tracing::info!("using postgres store");
            Arc::new(PgStore::connect(url).await?)
        }
        #[cfg(not(feature = "postgres"))]
        Some(_) => {
            anyhow::bail!("DATABASE_URL is set but this build has no postgres support");
        }
        None => {
            tracing::info!("using in-process memory store");
            Arc::new(MemoryStore::new())
        }
    };

    if config.anthropic_api_key.is_some() {
        tracing::info!("LLM live mode enabled");
    } else {
        tracing::info!("no LLM credential in environment, mock mode unless a credential is stored");
    }
    let llm = Arc::new(LlmRouter::new(
        config.anthropic_api_key.clone(),
        config.anthropic_base_url.clone(),
        store.clone(),
        MockProvider::new(),
    ));

    let engine = Arc::new(Engine::new(store.clone(), llm, config.engine.clone()));
    let app = router(AppState { store, engine });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "starting workflow engine server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
