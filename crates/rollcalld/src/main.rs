use anyhow::{Context, Result};
use rollcall_core::{EuclideanMatcher, RosterHandle, SystemClock};
use rollcall_store::{Config, SqliteStore};
use rollcalld::embedder::HttpDetector;
use rollcalld::state::AppState;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::load()?;
    tracing::info!(bind = %config.bind, db = %config.db_path.display(), "rollcalld starting");

    let store = SqliteStore::open(&config.db_path, config.store_options())
        .await
        .context("opening attendance database")?;
    let store = Arc::new(store);

    // Fatal: the daemon cannot recognize anyone without a roster.
    let roster = RosterHandle::load(&*store)
        .await
        .context("loading identity roster")?;
    tracing::info!(identities = roster.snapshot().len(), "roster loaded");

    let detector = HttpDetector::new(&config.embedder_url, config.detect_timeout())
        .context("building embedder client")?;

    let state = AppState::new(
        store,
        Arc::new(roster),
        Arc::new(detector),
        Arc::new(SystemClock),
        EuclideanMatcher::new(config.match_threshold)?,
        config.policy()?,
    );
    let app = rollcalld::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    tracing::info!(bind = %config.bind, "rollcalld ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
