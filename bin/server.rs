// IFSC Catalog - Web Server

use anyhow::{Context, Result};
use clap::Parser;
use ifsc_catalog::config::{init_tracing, ServerArgs, Verbosity};
use ifsc_catalog::server::{build_router, AppState};
use ifsc_catalog::{load_from_file, Database};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = ServerArgs::parse();
    init_tracing(Verbosity::from_flags(args.debug, false));

    info!("Starting {} v{}", args.app_name, ifsc_catalog::VERSION);

    let db = Database::open(&args.database)
        .with_context(|| format!("Failed to open database {}", args.database.display()))?;

    if let Some(csv) = &args.load_csv {
        let report = db
            .with_conn(|conn| load_from_file(conn, csv))
            .with_context(|| format!("Failed to load {}", csv.display()))?;
        if !report.is_clean() {
            warn!(
                "Startup load skipped {} malformed rows, {} rows in failed batches",
                report.malformed_rows, report.failed_rows
            );
        }
    }

    let app = build_router(AppState::new(db, &args.app_name));

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", args.bind))?;

    info!("Listening on http://{}", args.bind);
    info!("   API: http://{}/api/branches", args.bind);
    info!("   UI:  http://{}/ui", args.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
