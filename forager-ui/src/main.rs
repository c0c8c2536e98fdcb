//! Forager UI server - read-only dashboard over a run's snapshot files.

mod ingest;
mod routes;
mod sse;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::Router;
use axum::routing::get;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "forager-ui")]
#[command(about = "Read-only dashboard for watching forager runs")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "8765")]
    port: u16,

    /// Run directory containing episode snapshot files
    #[arg(long, default_value = "./data/runs")]
    run_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("forager_ui=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let run_dir = args.run_dir.canonicalize().unwrap_or(args.run_dir);
    info!(run_dir = %run_dir.display(), "starting forager-ui");

    let state = AppState::new(run_dir);

    // Start the snapshot ingest task
    ingest::start(state.clone());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .nest("/api", routes::api_router())
        .route("/stream", get(sse::stream_handler))
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
