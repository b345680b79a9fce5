//! Banca settlement service.
//!
//! Wires the store, prize table and incremental recalculator together and
//! serves the HTTP trigger/read surface. The nightly full-batch run goes
//! through the same orchestrator via the settle_day CLI or the manual
//! trigger endpoint.

use anyhow::{Context, Result};
use axum::middleware as axum_middleware;
use dotenv::dotenv;
use std::{path::Path, sync::Arc};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use banca_backend::{
    api::{create_router, AppState},
    middleware::request_logging,
    models::Config,
    settlement::{spawn_recalculator, MultiplierTable, PrizeTable, Recalculator},
    store::SettlementDb,
};

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "banca_backend=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_prize_table(config: &Config) -> Result<Arc<dyn PrizeTable>> {
    match &config.prize_table_path {
        Some(path) => {
            let table = MultiplierTable::from_toml_file(Path::new(path))?;
            info!(path = %path, "loaded prize table override");
            Ok(Arc::new(table))
        }
        None => Ok(Arc::new(MultiplierTable::default())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    let config = Config::from_env();
    info!(db = %config.db_path, port = config.port, "banca settlement service starting");

    let db = SettlementDb::open(&config.db_path).context("open settlement database")?;
    let prize_table = load_prize_table(&config)?;

    let recalculator = Recalculator::new(db.clone(), prize_table.clone());
    let events = spawn_recalculator(recalculator);

    let app = create_router(AppState {
        db,
        prize_table,
        events,
        admin_token: config.admin_token.clone(),
    })
    .layer(axum_middleware::from_fn(request_logging))
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("bind port {}", config.port))?;
    info!(port = config.port, "listening");

    axum::serve(listener, app).await.context("serve http")?;
    Ok(())
}
