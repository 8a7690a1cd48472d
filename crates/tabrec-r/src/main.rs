use clap::Parser as ClapParser;
use std::path::PathBuf;
use tabrec_engine::config::ConfigLoader;
use tracing_subscriber::EnvFilter;

#[derive(ClapParser, Debug)]
#[command(author, version, about = "Tab recorder store server", long_about = None)]
struct Args {
    /// WebSocket port (overrides server.port from the config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Config file (defaults to ./tabrec.yaml, then ~/.tabrec/config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start from a pristine snapshot, discarding stored logs
    #[arg(long)]
    reset: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = ConfigLoader::load(args.config.as_deref()).await?;
    let port = args.port.unwrap_or(config.server.port);

    tabrec_r::serve_until(&config, port, args.reset, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
        }
    })
    .await?;
    Ok(())
}
