//! Trading calls feed terminal client - Entry Point

use anyhow::Result;
use callfeed_telemetry::Metrics;
use clap::Parser;
use tracing::info;

/// Live terminal view of the trading calls feed
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via CALLFEED_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// API origin, overrides config and CALLFEED_API_URL
    #[arg(long)]
    origin: Option<String>,

    /// Number of recent messages to load
    #[arg(long)]
    limit: Option<usize>,

    /// Print Prometheus metrics on exit
    #[arg(long)]
    dump_metrics: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize TLS crypto provider (must be before any wss:// connection)
    callfeed_ws::init_crypto();

    let args = Args::parse();

    callfeed_telemetry::init_logging()?;

    info!("Starting callfeed v{}", env!("CARGO_PKG_VERSION"));

    let mut config = callfeed_app::AppConfig::load(args.config.as_deref())?;
    config.override_origin(args.origin);
    if let Some(limit) = args.limit {
        config.snapshot.limit = limit;
    }
    info!(origin = %config.origin, limit = config.snapshot.limit, "Configuration loaded");

    let app = callfeed_app::Application::new(config)?;
    app.run().await?;

    if args.dump_metrics {
        println!("{}", Metrics::gather_text()?);
    }

    Ok(())
}
