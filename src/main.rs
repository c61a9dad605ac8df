//! ai-chat server
//!
//! Serves the chat engine over a small JSON API. Conversations are written to
//! `AI_CHAT_DATA_DIR` and provider keys come from the environment.

use std::net::SocketAddr;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ai_chat::{routes, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ai_chat=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tokio::fs::create_dir_all(&config.base_dir).await?;
    tracing::info!(
        "💬 Conversations stored under {}",
        config.base_dir.display()
    );

    let state = AppState::new(config);
    {
        let registry = state.chat_engine.registry().read().await;
        tracing::info!(
            "📦 Loaded {} provider(s), default {}",
            registry.len(),
            state.chat_engine.defaults().provider_spec
        );
    }

    let app = Router::new()
        .merge(routes::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("🔥 ai-chat API running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
