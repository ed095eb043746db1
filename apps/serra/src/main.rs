//! # Serra
//!
//! Greenhouse and terrarium controller: HTTP API, rule scheduler and
//! offline maintenance commands.

use clap::{Parser, Subcommand};
use serra::cli;
use serra::config::ServerConfig;
use serra_core::condition::DEFAULT_STALE_AFTER_SECS;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "serra", version, about = "Greenhouse and terrarium outlet automation")]
struct Cli {
    /// State database path.
    #[arg(long, env = "SERRA_DB", default_value = "serra.db", global = true)]
    db: PathBuf,

    /// Storage backend: file or redb.
    #[arg(long, env = "SERRA_BACKEND", default_value = "file", global = true)]
    backend: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a database with the default zones, outlets and sensors.
    Init {
        /// Overwrite an existing database.
        #[arg(long)]
        force: bool,
    },
    /// Run the HTTP API and the rule scheduler.
    Serve(ServerConfig),
    /// Show what is stored.
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Record a sensor reading for a zone.
    Ingest {
        /// Zone slug or id.
        #[arg(long)]
        zone: String,
        #[arg(long)]
        temperature: Option<f64>,
        #[arg(long)]
        humidity: Option<f64>,
    },
    /// Show the decisions a scene would take now, without switching.
    Evaluate {
        #[arg(long)]
        scene: u64,
        #[arg(long)]
        json: bool,
        /// Age after which readings are ignored.
        #[arg(long, env = "SERRA_SENSOR_STALE_SECONDS", default_value_t = DEFAULT_STALE_AFTER_SECS)]
        stale_seconds: u64,
    },
    /// Export the state as a binary snapshot or JSON.
    Export {
        #[arg(long)]
        output: PathBuf,
        /// canonical or json.
        #[arg(long, default_value = "canonical")]
        format: String,
    },
    /// Replace the state with a binary snapshot.
    Import {
        #[arg(long)]
        input: PathBuf,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "serra=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();
    init_tracing();

    let db = args.db.as_path();
    let backend = args.backend.as_str();
    let result = match args.command {
        Command::Init { force } => cli::cmd_init(db, backend, force),
        Command::Serve(config) => cli::cmd_serve(db, backend, config).await,
        Command::Status { json } => cli::cmd_status(db, backend, json),
        Command::Ingest {
            zone,
            temperature,
            humidity,
        } => cli::cmd_ingest(db, backend, &zone, temperature, humidity),
        Command::Evaluate {
            scene,
            json,
            stale_seconds,
        } => cli::cmd_evaluate(db, backend, scene, json, stale_seconds),
        Command::Export { output, format } => cli::cmd_export(db, backend, &output, &format),
        Command::Import { input } => cli::cmd_import(db, backend, &input),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
