//! Export Hub - role-gated database export service
//!
//! Wires configuration, the users database, both query backends and the
//! refresh coordinator into one Axum server.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use export_hub::app::{AppState, build_app};
use export_hub::backends::{Backends, MySqlExecutor, PgExecutor};
use export_hub::config::Config;
use export_hub::db::Database;
use export_hub::exports::{CsvSink, MetadataStore, QueryStore, RefreshCoordinator};
use export_hub::services::AuthService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "export_hub=debug,tower_http=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!("Starting Export Hub");

    let config = Arc::new(Config::from_env()?);
    tracing::info!(
        data_dir = %config.data_dir.display(),
        query_dir = %config.query_dir.display(),
        metadata = %config.metadata_path.display(),
        cooldown_secs = config.refresh_cooldown.as_secs(),
        "Configuration loaded"
    );

    // Users live in the primary database; the pool connects on first use so a
    // down database does not keep the server from starting.
    let db = Database::connect_lazy(&config.postgres);
    if let Err(e) = db.ensure_schema().await {
        tracing::warn!(error = %e, "Could not ensure users table, retrying on first users request");
    }

    let backends = Backends::new(
        Arc::new(PgExecutor::new(config.postgres.clone())),
        Arc::new(MySqlExecutor::new(config.mysql.clone())),
    );

    let metadata = Arc::new(MetadataStore::new(&config.metadata_path));
    let queries = QueryStore::new(&config.query_dir, &config.mysql_readback_schema);
    let sink = CsvSink::new(&config.data_dir);
    let coordinator = Arc::new(
        RefreshCoordinator::new(metadata.clone(), queries, sink.clone(), backends)
            .with_cooldown(config.refresh_cooldown),
    );

    let auth = Arc::new(AuthService::new(
        db.clone(),
        config.auth.clone(),
        config.default_user_role,
    ));

    let state = AppState {
        config: config.clone(),
        db,
        auth,
        metadata,
        sink,
        coordinator: coordinator.clone(),
    };
    let app = build_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down, closing backend pools");
    coordinator.backends().close_all().await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
