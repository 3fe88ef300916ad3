use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use happypics_auth::RestIdentityProvider;
use happypics_core::OnnxEmotionDetector;
use happypics_store::SqliteHistory;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod http;
mod session;
mod view;

use config::{Config, Mode};
use http::{AppState, Backend};
use session::SessionRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("happypicsd starting");

    let config = Config::from_env();
    let addr: SocketAddr = config
        .bind
        .parse()
        .with_context(|| format!("invalid HAPPYPICS_BIND address {:?}", config.bind))?;

    let backend = match config.mode {
        Mode::Volatile => Backend::Volatile,
        Mode::Durable => {
            let Some(api_key) = config.identity_api_key.as_deref() else {
                bail!("durable mode requires HAPPYPICS_IDENTITY_API_KEY");
            };
            let store = SqliteHistory::open(&config.db_path).with_context(|| {
                format!("failed to open history database {}", config.db_path.display())
            })?;
            tracing::info!(path = %config.db_path.display(), "history database opened");
            Backend::Durable {
                store: Arc::new(Mutex::new(store)),
                identity: Arc::new(RestIdentityProvider::new(&config.identity_endpoint, api_key)),
            }
        }
    };

    // Models are loaded once, up front. A missing model is fatal.
    let detector = OnnxEmotionDetector::load(&config.scrfd_model_path(), &config.ferplus_model_path())
        .with_context(|| format!("failed to load models from {}", config.model_dir.display()))?;
    tracing::info!(model_dir = %config.model_dir.display(), "models loaded");

    let engine = engine::spawn_engine(Box::new(detector), config.engine_queue_depth)?;

    let sessions = Arc::new(SessionRegistry::new(config.session_ttl));
    spawn_session_sweeper(sessions.clone(), config.session_ttl);

    let state = AppState {
        backend,
        engine,
        sessions,
        thumbnail_width: config.thumbnail_width,
    };
    let app = http::router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, mode = ?config.mode, "happypicsd ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("happypicsd shutting down");
    Ok(())
}

/// Drop idle sessions even when no request arrives to trigger the sweep.
fn spawn_session_sweeper(sessions: Arc<SessionRegistry>, ttl: Duration) {
    let period = ttl.min(Duration::from_secs(60));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            sessions.evict_idle();
        }
    });
}
