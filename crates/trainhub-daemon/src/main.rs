use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use trainhub_daemon::{api, app, config::Config};

#[derive(Debug, Parser)]
#[command(name = "trainhubd", version, about = "Training job control plane daemon")]
struct Cli {
    /// TOML config file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides `[server] listen`, e.g. 127.0.0.1:8080
    #[arg(long)]
    listen: Option<String>,

    /// Log filter in env-filter syntax. Falls back to RUST_LOG, then `info`.
    #[arg(long)]
    log: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log {
        Some(f) => EnvFilter::try_new(f).context("invalid --log filter")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    fmt().with_target(false).with_env_filter(filter).init();

    let mut cfg = Config::load(cli.config.as_deref())?;
    if let Some(listen) = cli.listen {
        cfg.server.listen = listen;
    }
    info!("starting daemon with config: {:?}", cfg);

    let app::App { service, engine } = app::build(&cfg)?;
    let watch = engine.start();

    let router = api::router(service)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = cfg
        .server
        .listen
        .parse()
        .with_context(|| format!("invalid listen address {}", cfg.server.listen))?;
    info!("listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    watch.stop().await;
    info!("daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("shutdown requested");
}
