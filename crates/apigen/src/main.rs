use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use apigen::{RunConfig, VersionInfo, run_catalogs};
use schema_canon::TypeScriptCompiler;

/// Generate typed request functions from API catalogs.
#[derive(Debug, Parser)]
#[command(name = "apigen", version)]
struct Args {
    /// Path to the JSON run configuration.
    #[arg(short, long)]
    config: PathBuf,

    /// Catalog names to skip.
    #[arg(long, num_args = 1..)]
    filter: Vec<String>,

    /// Output directory (created if absent).
    #[arg(short, long, default_value = "src/api")]
    output: PathBuf,
}

fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let base_level = match std::env::var("APIGEN_LOG").as_deref() {
            Ok("debug") => "debug",
            Ok("trace") => "trace",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!(
            "apigen={level},schema_canon={level}",
            level = base_level
        ))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let args = Args::parse();

    if let Err(e) = run(args).await {
        tracing::error!(error = %format!("{e:#}"), "apigen failed");
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let version = VersionInfo::new();
    tracing::info!(version = version.apigen, config = %args.config.display(), "Starting apigen");

    let config = RunConfig::load(&args.config)?;
    let compiler = TypeScriptCompiler::new();
    let summaries = run_catalogs(&config, &args.filter, &args.output, &compiler).await?;
    tracing::info!(catalogs = summaries.len(), "apigen finished");

    Ok(())
}
