use pocketbook_access::{Argon2Hasher, MemorySessionStore, TokenCodec};
use pocketbook_server::{
    auth::AppState,
    config::ServerConfig,
    db::{MemoryRoleStore, MemoryUserStore, RoleRepository, SessionRepository, UserRepository},
    router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    tracing::info!(tokens = ?config.tokens, roles = ?config.roles, "Loaded configuration");

    let codec = TokenCodec::new(&config.tokens).expect("invalid token configuration");
    let hasher = Arc::new(Argon2Hasher);

    let state = match config.database_url.as_deref() {
        Some(database_url) => {
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(5))
                .connect(database_url)
                .await
                .expect("failed to connect to database");

            tracing::info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&db_pool)
                .await
                .expect("failed to run migrations");

            spawn_session_cleanup(
                SessionRepository::new(db_pool.clone()),
                config.session.cleanup_interval_seconds,
            );

            AppState::new(
                codec,
                &config.roles,
                Arc::new(UserRepository::new(db_pool.clone())),
                Arc::new(SessionRepository::new(db_pool.clone())),
                Arc::new(RoleRepository::new(db_pool)),
                hasher,
            )
        }
        None => {
            tracing::warn!("DATABASE_URL is not set; all state is kept in memory and lost on exit");
            AppState::new(
                codec,
                &config.roles,
                Arc::new(MemoryUserStore::new()),
                Arc::new(MemorySessionStore::new()),
                Arc::new(MemoryRoleStore::new()),
                hasher,
            )
        }
    };

    let app = router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

/// Periodically deletes sessions whose refresh token has expired.
fn spawn_session_cleanup(repo: SessionRepository, interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            interval.tick().await;
            match repo.delete_expired().await {
                Ok(count) if count > 0 => {
                    tracing::debug!(deleted_sessions = count, "Periodic session cleanup");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to cleanup expired sessions");
                }
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
