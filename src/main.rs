use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wordtraitor::{state::AppState, tasks, words, ws};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wordtraitor=debug,tower_http=debug,axum=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Word Traitor...");

    // Initialize the remote word-pair provider. Without one, rounds fall
    // straight through to the built-in pool.
    let word_config = words::WordConfig::from_env();
    let provider = match word_config.build_provider() {
        Ok(Some(p)) => {
            tracing::info!("Remote word service initialized");
            Some(p)
        }
        Ok(None) => {
            tracing::info!("No word service configured, using the built-in pool");
            None
        }
        Err(e) => {
            tracing::warn!(
                "Failed to initialize word service: {}. Using the built-in pool.",
                e
            );
            None
        }
    };

    let state = Arc::new(AppState::new_with_words(provider));

    // Background sweeps: hint deadlines and ghost players
    tasks::spawn_hint_deadline_watcher(state.clone());
    tasks::spawn_ghost_reaper(state.clone());

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 7368));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
