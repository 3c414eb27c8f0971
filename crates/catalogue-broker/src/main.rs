//! Catalogue Broker - Main entry point
//!
//! Serves the configured catalogue databases as devices and answers
//! symbolic lookups against whichever device currently hosts a name.

mod api;
mod config;
mod server;
mod state;
mod ws;

use anyhow::{Context, Result};
use catalogue_core::{instance_count, ObjectType, SchemaTable};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "catalogue-broker")]
#[command(about = "Catalogue broker resolving symbolic lookups to connected catalogue databases")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "catalogue.toml")]
    config: PathBuf,

    /// Bind address for web server
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Load every configured database, print a summary and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Catalogue broker v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config::load_config(&args.config)?;

    if let Some(bind) = args.bind {
        config.broker.bind = bind;
    }

    info!(
        databases = config.databases.len(),
        base_url = %config.catalogue.base_url,
        "Configuration loaded"
    );

    if args.check {
        return check(&config);
    }

    let state = state::AppState::new(config.clone()).await?;
    let connected = state.connect_all().await;
    info!(
        connected,
        configured = config.databases.len(),
        "Catalogue databases connected"
    );

    server::run(state, &config.broker.bind).await
}

/// Load every configured database and print what it would serve
fn check(config: &config::Config) -> Result<()> {
    let schema = SchemaTable::bundled().context("bundled object schema is invalid")?;

    for db in &config.databases {
        let set = state::load_catalogue_blocking(
            &schema,
            config.catalogue.base_url.clone(),
            &db.path,
        )?;
        println!(
            "{} ({}): {} instances",
            db.device_id,
            db.path.display(),
            instance_count(&set)
        );
        for object_type in ObjectType::ALL {
            let Some(instances) = set.get(&object_type) else {
                continue;
            };
            println!("  {}:", object_type);
            for instance in instances {
                let package = if instance.source_package.is_some() {
                    " (+ source package)"
                } else {
                    ""
                };
                println!("    - {}{}", instance.name().unwrap_or("<unnamed>"), package);
            }
        }
    }

    Ok(())
}
