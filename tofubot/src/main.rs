use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tofubot::Config;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();

    info!("Starting tofubot {}", env!("CARGO_PKG_VERSION"));
    if let Err(e) = tofubot::run(&config).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
