mod config;
mod errors;
mod models;
mod oracle;
mod order;
mod packing;
mod report;

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::oracle::{OracleServer, PreformClient};
use crate::order::OrderManifest;
use crate::packing::{run_session, SessionOptions};

/// Packs print orders onto build plates and saves one job file per plate.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pack one or more JSON order manifests, one after another
    Manifest {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Pack every .stl file in a folder, each with the same quantity
    Folder {
        #[arg(long)]
        order_id: String,
        #[arg(long)]
        quantity: u32,
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting batcher v{}", env!("CARGO_PKG_VERSION"));

    let orders = load_orders(&args.command)?;
    info!("Loaded {} order(s)", orders.len());

    let client = PreformClient::new(&config.oracle_url, config.oracle_timeout)?;

    // Held for the whole run; killed on drop if anything below unwinds.
    let server = match &config.oracle_server_path {
        Some(binary) => Some(OracleServer::start(binary, &client, config.oracle_startup_timeout).await?),
        None => {
            info!("Using externally managed layout service at {}", client.base_url());
            None
        }
    };

    let failed = process_orders(&client, &config, orders).await;

    if let Some(server) = server {
        server.shutdown().await;
    }

    if failed > 0 {
        bail!("{failed} order(s) failed");
    }
    Ok(())
}

fn load_orders(command: &Command) -> Result<Vec<OrderManifest>> {
    match command {
        Command::Manifest { files } => files.iter().map(|f| OrderManifest::load(f)).collect(),
        Command::Folder {
            order_id,
            quantity,
            dir,
        } => Ok(vec![OrderManifest::from_folder(order_id, dir, *quantity)?]),
    }
}

/// Runs the orders one at a time against the shared workspace.
/// Returns the number of failed orders.
async fn process_orders(client: &PreformClient, config: &Config, orders: Vec<OrderManifest>) -> usize {
    let mut failed = 0;

    for manifest in orders {
        let options = SessionOptions {
            order_id: manifest.order_id.clone(),
            material: config.material.clone(),
            output_dir: config.job_output_dir.clone(),
            dispatch: config.dispatch.clone(),
        };
        info!(
            order_id = %options.order_id,
            files = manifest.items.len(),
            units = manifest.total_units(),
            "Processing order"
        );

        match run_session(client, client, manifest.into_items(), &options).await {
            Ok(session) => {
                print!("{}", report::render_summary(&session));
                match report::write_summary_json(&session, &config.job_output_dir) {
                    Ok(path) => info!(path = %path.display(), "Summary written"),
                    Err(e) => warn!("Failed to write summary: {e:#}"),
                }
            }
            Err(failure) => {
                eprint!("{}", report::render_failure(&failure));
                failed += 1;
            }
        }
    }

    failed
}
