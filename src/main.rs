use std::sync::Arc;

use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use anyhow::Context;
use dotenvy::dotenv;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use medirecords::auth::JwtConfig;
use medirecords::config::Config;
use medirecords::store::{MemoryStore, PgStore, Store};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize logging; actix's access log arrives through the log bridge
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn Store> = match &config.database_url {
        Some(database_url) => {
            let store = PgStore::connect(database_url, config.db_pool_size)
                .context("Failed to create database pool")?;
            store
                .ensure_schema()
                .context("Failed to prepare database tables")?;
            info!(pool_size = config.db_pool_size, "Connected to PostgreSQL");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL is not set, records are kept in memory and lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let store: web::Data<dyn Store> = web::Data::from(store);
    let jwt = web::Data::new(JwtConfig::new(
        &config.jwt_secret,
        config.access_token_minutes,
        config.refresh_token_days,
    ));

    info!("Server listening on http://{}", config.bind_addr);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(store.clone())
            .app_data(jwt.clone())
            .configure(medirecords::configure)
    })
    .bind(config.bind_addr.as_str())
    .with_context(|| format!("Failed to bind to {}", config.bind_addr))?
    .run()
    .await?;

    Ok(())
}
