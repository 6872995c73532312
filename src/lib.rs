pub mod app;
pub mod capture;
pub mod cli;
pub mod db;
pub mod models;
pub mod segmentation;
pub mod settings;
pub mod snapshot;
pub mod store;
pub mod utils;

use anyhow::Result;
use log::info;

use app::{AppState, ConfigOverrides};
use cli::{Cli, Command};

pub async fn run(cli: Cli) -> Result<()> {
    utils::logging::init_logging();

    let overrides = ConfigOverrides {
        inactivity_timeout_secs: cli.inactivity_timeout,
        retention_period_secs: cli.retention_period,
    };
    let app = AppState::open(&cli.data_dir, overrides).await?;

    match cli.command {
        Command::Run => {
            info!("TypeTrail capturing from stdin...");
            app.run_capture().await
        }
        Command::Export { output } => app.export(output.as_ref()),
        Command::Stats { by_name, segments } => {
            app.print_stats(by_name, segments);
            Ok(())
        }
        Command::Clear { bucket } => app.clear(bucket.as_deref()).await,
    }
}
