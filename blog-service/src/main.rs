use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use argon2::Argon2;
use blog_service::config::load_service_config;
use blog_service::{build_router, AppState};
use common_auth::{InMemoryRevocationStore, RedisRevocationStore, RevocationStore};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_service_config()?;

    let revocations: Arc<dyn RevocationStore> = match &config.redis_url {
        Some(url) => {
            let store = RedisRevocationStore::new(url, config.redis_prefix.clone())
                .context("Invalid REDIS_URL")?;
            info!(prefix = %config.redis_prefix, "using redis revocation store");
            Arc::new(store)
        }
        None => {
            let store = InMemoryRevocationStore::new();
            let _sweeper = store.spawn_sweeper(config.revocation_sweep_interval);
            info!("REDIS_URL not set, using in-process revocation store");
            Arc::new(store)
        }
    };

    let ip: std::net::IpAddr = config
        .host
        .parse()
        .with_context(|| format!("Invalid HOST '{}'", config.host))?;
    let addr = SocketAddr::from((ip, config.port));
    info!(
        policy = ?config.revocation.on_unavailable,
        timeout_ms = config.revocation.timeout.as_millis() as u64,
        "revocation failure policy"
    );

    let state = AppState::new(config, revocations, Argon2::default())?;
    state.seed_bootstrap_admin().await?;
    let app = build_router(state);

    info!(%addr, "starting blog-service");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
