mod api;
mod middleware;

use std::sync::Arc;

use dealdesk_ai::GenerativeClient;
use dealdesk_core::AppConfig;
use dealdesk_store::{DocumentStore, MemoryStore, PgStore};
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = dealdesk_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let (store, db) = open_store(&config).await?;
    let ai = GenerativeClient::from_settings(&config.ai)?;
    if config.ai.api_key.is_empty() {
        tracing::warn!("GEMINI_API_KEY is empty; relying on an upstream proxy to inject it");
    }

    let auth = AuthState::from_config(&config)?;
    let state = AppState::new(store, ai, &config.app_id, db);
    let app = build_app(state.clone(), auth, default_rate_limit_state());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, env = %config.env, app_id = %config.app_id, "dealdesk server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            state.begin_shutdown();
        })
        .await?;
    Ok(())
}

/// Postgres when `DATABASE_URL` is set, otherwise the in-process store.
async fn open_store(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn DocumentStore>, Option<PgPool>)> {
    let Some(database_url) = config.database_url.as_deref() else {
        tracing::info!("DATABASE_URL not set; using in-memory document store");
        return Ok((Arc::new(MemoryStore::new()), None));
    };

    let pool_config = dealdesk_store::PoolConfig::from_app_config(config);
    let pool = dealdesk_store::connect_pool(database_url, pool_config).await?;
    dealdesk_store::run_migrations(&pool).await?;
    let store = PgStore::connect(pool.clone()).await?;
    tracing::info!("using Postgres document store");
    Ok((Arc::new(store), Some(pool)))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
