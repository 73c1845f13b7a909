use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::info;

use qrtrack::analytics::GeoIpResolver;
use qrtrack::api;
use qrtrack::auth::AuthService;
use qrtrack::config::{Config, DatabaseBackend};
use qrtrack::storage::{PostgresStorage, SqliteStorage, Storage};
use qrtrack::track;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // Initialize storage
    let storage: Arc<dyn Storage> = match config.database.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.database.url);
            Arc::new(
                SqliteStorage::new(&config.database.url, config.database.max_connections).await?,
            )
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage: {}", config.database.url);
            Arc::new(
                PostgresStorage::new(&config.database.url, config.database.max_connections)
                    .await?,
            )
        }
    };

    info!("Initializing database...");
    storage.init().await?;
    info!("Database initialized successfully");

    // Auth and enrichment services
    let auth_service = Arc::new(AuthService::new(config.auth.clone()));

    let geoip = Arc::new(GeoIpResolver::new(
        config.geoip.lookup_url.clone(),
        Duration::from_millis(config.geoip.timeout_ms),
    )?);
    if geoip.is_enabled() {
        info!("🌍 Geolocation enrichment enabled");
    } else {
        info!("🌍 GEOIP_URL not set - scans will be recorded without location data");
    }

    // Assemble the application: authenticated API plus the public tracking
    // route, CORS wide open as the frontend is served separately.
    let app = api::create_api_router(
        Arc::clone(&storage),
        auth_service,
        config.public_base_url.clone(),
    )
    .merge(track::create_track_router(Arc::clone(&storage), geoip))
    .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 Server listening on http://{}", addr);
    info!("   - Tracking endpoint at http://{}/track/<id>", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
