//! OpenSASE Cart - cart inventory-reservation service

use anyhow::Result;
use opensase_cart::api::{self, AppState};
use opensase_cart::publisher::{EventPublisher, NatsPublisher, NoopPublisher};
use opensase_cart::store::{MemoryStore, PgStore, Store};
use opensase_cart::{CartEngine, Config};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = Config::from_env()?;

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let pg = PgStore::connect(url, config.database_max_connections).await?;
            pg.migrate().await?;
            tracing::info!("using postgres store");
            Arc::new(pg)
        }
        None => {
            let memory = match &config.product_seed_path {
                Some(path) => MemoryStore::from_seed_file(path).await?,
                None => MemoryStore::new(),
            };
            tracing::warn!("DATABASE_URL not set, carts are kept in memory");
            Arc::new(memory)
        }
    };

    let publisher: Arc<dyn EventPublisher> = match &config.nats_url {
        Some(url) => match NatsPublisher::connect(url).await {
            Ok(p) => Arc::new(p),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, events will not be published");
                Arc::new(NoopPublisher)
            }
        },
        None => Arc::new(NoopPublisher),
    };

    let engine = CartEngine::new(store, config.engine.clone()).with_publisher(publisher);
    let app = api::router(AppState { engine: Arc::new(engine) });

    tracing::info!("🚀 OpenSASE Cart listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}
