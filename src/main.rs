use ossm_web::{
    config::session::{validate_production_config, SessionConfig},
    config::AppConfig,
    db, routes, AppState,
};

use anyhow::Context;
use std::net::SocketAddr;
use tower_sessions_sqlx_store::SqliteStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ossm_web=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!("Using user API at {}", config.api_url);

    // Session store
    validate_production_config()?;
    let pool = db::create_pool(&config.database_url)
        .await
        .with_context(|| format!("Could not open session database {}", config.database_url))?;
    let session_store = SqliteStore::new(pool)
        .with_table_name("sessions")
        .map_err(|e| anyhow::anyhow!("Invalid session table name: {}", e))?;
    session_store.migrate().await?;

    let session_layer = SessionConfig::from_env().create_layer(session_store);

    let addr = SocketAddr::from((
        config
            .host
            .parse::<std::net::IpAddr>()
            .with_context(|| format!("Invalid HOST '{}'", config.host))?,
        config.port,
    ));

    let app = routes::build_router(AppState::from_config(config), session_layer);

    tracing::info!("Server running on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
