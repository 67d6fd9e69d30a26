//! incidentd - incident management service over JSON-RPC.

use anyhow::Result;
use incidentd::cli::Cli;
use incidentd::config::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.log_level.as_deref())?;
    cli.run().await
}
