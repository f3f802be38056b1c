mod app;
mod middleware;
mod tools;

use tracing_subscriber::EnvFilter;

use crate::app::{build_app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = storefront_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = storefront_db::PoolConfig::from_app_config(&config);
    // Lazy pool: the server boots even when Postgres is down and /health
    // reports db_ready from a live ping.
    let pool = storefront_db::connect_pool_lazy(&config.database_url, pool_config)?;
    match storefront_db::run_migrations(&pool).await {
        Ok(applied) => tracing::info!(applied, "migrations up to date"),
        Err(error) => {
            tracing::warn!(error = %error, "migrations deferred; database unavailable at startup");
        }
    }

    let app = build_app(AppState::new(pool, &config));

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "storefront MCP server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
