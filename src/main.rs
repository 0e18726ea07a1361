use std::{process::ExitCode, sync::Arc};

use clap::Parser;
use log::{error, info};

use commcards::{App, CardStore, Cli, Config, Result};

pub fn initialize_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .format_module_path(true)
        .init();

    info!("Logger initialized");
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    let store = Arc::new(CardStore::from_config(&config));
    store.initialize().await?;

    let app = App::new(Arc::clone(&store), cli.verbose);
    let outcome = app.run(cli.command).await;

    // Always let the pending write land, even when the command failed.
    if let Err(e) = store.shutdown().await {
        error!("Failed to shut down persistence: {}", e);
    }
    outcome
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    initialize_logger(cli.verbose);

    info!("Application starting up");
    let result = run(cli).await;
    info!("Application shutting down");

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
