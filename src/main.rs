use anyhow::Result;
use clap::{Parser, Subcommand};
use opensky_tracker::log_format::TargetFirstFormat;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser)]
#[command(name = "opensky-tracker")]
#[command(about = "Track aircraft over a geofence using the OpenSky Network API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll OpenSky and keep the latest aircraft states in PostgreSQL
    Ingest,
    /// Show the most recently updated aircraft, refreshing in place
    View,
    /// Apply pending database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .event_format(TargetFirstFormat),
        )
        .init();

    match cli.command {
        Commands::Ingest => commands::handle_ingest().await,
        Commands::View => commands::handle_view().await,
        Commands::Migrate => commands::handle_migrate().await,
    }
}
