//! wsrpc - call tools on a WebSocket JSON-RPC server
//!
//! This is the binary entry point. All logic lives in the library.

use clap::Parser;
use color_eyre::eyre::Result;
use tracing::{error, info};

use wsrpc::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    // Logs go to a file so stdout stays machine-readable
    wsrpc_core::logging::init()?;
    info!("Command: {:?}", cli.command);

    let result = wsrpc::run(cli).await;
    if let Err(ref e) = result {
        error!("Command failed: {:?}", e);
    }
    result
}
