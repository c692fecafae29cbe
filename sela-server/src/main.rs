use clap::Parser;
use sela_core::SelaConfig;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use sela_server::state::AppState;
use sela_server::subsystems::synthesis;
use sela_server::http;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "sela.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match SelaConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging; RUST_LOG overrides the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    // Connect to DB (optional: without DATABASE_URL the server runs file-only)
    let pool = match sela_core::db::create_pool(&config.database).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        match &pool {
            Some(pool) => match sela_core::db::health_check(pool).await {
                Ok(v) => println!("PostgreSQL connected: {}", v),
                Err(e) => {
                    println!("PostgreSQL connection failed: {}", e);
                    std::process::exit(1);
                }
            },
            None => println!("No database configured (file-only mode)"),
        }
        println!("Sela health check passed");
        return Ok(());
    }

    if let Some(pool) = &pool {
        sela_core::db::init_schema(pool).await?;
        tracing::info!("Database schema ready");
    } else {
        tracing::warn!("No DATABASE_URL configured; running file-only");
    }

    let (state, synth_rx) = AppState::build(config, pool)?;

    // Shutdown signal
    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    // Reply-synthesis worker pool
    let workers = synthesis::spawn_workers(
        state.config.storage.synthesis_workers,
        synth_rx,
        state.synthesizer.clone(),
        state.pool.clone(),
    );
    tracing::info!(count = workers.len(), "synthesis workers running");

    http::start_http_server(state, tx.subscribe()).await?;

    Ok(())
}
