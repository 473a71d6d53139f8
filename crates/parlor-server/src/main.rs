mod cleanup;
mod config;

use std::path::Path;
use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing::{error, info};

use parlor_api::routes::{self, AppState};
use parlor_api::uploads::UploadStorage;
use parlor_api::views::Views;
use parlor_db::Database;

use crate::config::Config;

/// How often expired sessions are pruned.
const SESSION_CLEANUP_SECS: u64 = 3600;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parlor_server=debug,parlor_api=debug,parlor_db=info,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("FATAL: {}", e);
            eprintln!("FATAL: {e}");
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    // Init database
    let db = if config.database_url == ":memory:" {
        Database::open_in_memory()?
    } else {
        Database::open(Path::new(&config.database_url))?
    };
    let db = Arc::new(db);

    let uploads = Arc::new(UploadStorage::new(config.upload_dir.clone()).await?);
    let views = Arc::new(Views::new()?);

    tokio::spawn(cleanup::run_cleanup_loop(db.clone(), SESSION_CLEANUP_SECS));

    let state = AppState::new(
        db,
        uploads,
        views,
        &config.session_secret,
        chrono::Duration::hours(config.session_ttl_hours),
    );

    let app = routes::router(state, &config.public_dir, config.max_upload_mb * 1024 * 1024)
        .layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!("Parlor listening on http://{}", addr);
    info!("Public assets: {}, uploads: {}", config.public_dir.display(), config.upload_dir.display());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
