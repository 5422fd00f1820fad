//! creo-server binary.
//!
//! Configuration comes from the environment (and `.env`); see
//! [`creo_server::config`].

use std::sync::Arc;

use anyhow::Result;
use creo_core::store::{GenerationStore, MemoryStore};
use creo_server::{build_router, AppState, ServerConfig};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "postgres")]
async fn connect_store(config: &ServerConfig) -> Result<Arc<dyn GenerationStore>> {
    use anyhow::Context;
    use creo_core::store::PgGenerationStore;

    match &config.database_url {
        Some(url) => {
            let store = PgGenerationStore::connect(url, config.db_max_connections)
                .await
                .context("failed to connect to database")?;
            store
                .ensure_schema()
                .await
                .context("failed to apply schema")?;
            tracing::info!("Connected to database");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, grade files are kept in memory");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[cfg(not(feature = "postgres"))]
async fn connect_store(config: &ServerConfig) -> Result<Arc<dyn GenerationStore>> {
    if config.database_url.is_some() {
        tracing::warn!("built without the postgres feature, ignoring DATABASE_URL");
    }
    Ok(Arc::new(MemoryStore::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "creo_server=debug,creo_core=info,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;
    config.ensure_dirs()?;

    let store = connect_store(&config).await?;
    let addr = config.bind_addr();
    tracing::info!(
        templates = %config.template_dir.display(),
        generated = %config.generated_dir.display(),
        "starting Creo server on {}",
        addr
    );

    let app = build_router(AppState::new(config, store));
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
