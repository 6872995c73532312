use std::time::Duration;

use clap::Parser;
use typetrail_lib::cli::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(typetrail_lib::run(cli));
    // A pending stdin read holds a blocking thread that cannot be cancelled.
    runtime.shutdown_timeout(Duration::from_millis(200));
    result
}
