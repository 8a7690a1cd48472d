mod demo;
mod session;

use anyhow::Result;
use clap::{Parser, Subcommand};
use session::Session;
use std::path::PathBuf;
use tabrec_engine::config::ConfigLoader;
use tabrec_engine::export::{ExportOutcome, write_export};
use tabrec_engine::formatter::{format_log_entry, format_network_entry};
use tabrec_engine::protocol::{TabId, now};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tabrec", version, about = "Tab console and network recorder")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Config file (defaults to ./tabrec.yaml, then ~/.tabrec/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the store server for the browser extension
    Serve {
        /// WebSocket port
        #[arg(long)]
        port: Option<u16>,
        /// Start from a pristine snapshot, discarding stored logs
        #[arg(long)]
        reset: bool,
    },
    /// Record a scripted session in a simulated tab and export it
    Demo {
        /// Export directory
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show buffer sizes and, with --tab, whether that tab is recording
    Status {
        #[arg(long)]
        tab: Option<TabId>,
    },
    /// Print captured entries
    Logs {
        /// Print network entries instead of console entries
        #[arg(long)]
        network: bool,
    },
    /// Write captured console entries to a JSON file
    Export {
        /// Export directory
        #[arg(long)]
        out: Option<PathBuf>,
        /// Page URL recorded in the export (defaults to the first entry's URL)
        #[arg(long)]
        url: Option<String>,
    },
    /// Delete all captured entries
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = ConfigLoader::load(args.config.as_deref()).await?;

    match args.command {
        Command::Serve { port, reset } => {
            let port = port.unwrap_or(config.server.port);
            tabrec_r::serve_until(&config, port, reset, async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Failed to listen for ctrl-c: {}", e);
                }
            })
            .await?;
        }
        Command::Demo { out } => {
            let out = out.unwrap_or_else(|| config.export.directory.clone());
            demo::run(&config, &out).await?;
        }
        Command::Status { tab } => {
            let mut session = Session::open(&config).await;
            let logs = session.get_logs().await?;
            println!("Console entries: {}", logs.console_logs.len());
            println!("Network entries: {}", logs.network_logs.len());
            if let Some(tab) = tab {
                let recording = session.is_recording(tab).await?;
                println!(
                    "Tab {}: {}",
                    tab,
                    if recording { "recording" } else { "not recording" }
                );
            }
            session.close().await?;
        }
        Command::Logs { network } => {
            let mut session = Session::open(&config).await;
            let logs = session.get_logs().await?;
            if network {
                for entry in &logs.network_logs {
                    println!("{}", format_network_entry(entry));
                }
            } else {
                for entry in &logs.console_logs {
                    println!("{}", format_log_entry(entry));
                }
            }
            session.close().await?;
        }
        Command::Export { out, url } => {
            let mut session = Session::open(&config).await;
            let logs = session.get_logs().await?;
            session.close().await?;

            let url = url
                .or_else(|| logs.console_logs.first().map(|e| e.source_url.clone()))
                .unwrap_or_default();
            let out = out.unwrap_or_else(|| config.export.directory.clone());
            match write_export(&logs, &url, &out, now()).await? {
                ExportOutcome::Written(path) => println!("Exported to {}", path.display()),
                ExportOutcome::NoData => println!("No data to export"),
            }
        }
        Command::Clear => {
            let mut session = Session::open(&config).await;
            session.clear_logs().await?;
            session.close().await?;
            println!("Logs cleared");
        }
    }

    Ok(())
}
