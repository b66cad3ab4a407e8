use log_harvester::{Config, Harvester, Store};
use std::env;
use std::process;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "log_harvester=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = env::args().collect();
    let config_path = match args.len() {
        1 => "config.toml",
        2 => args[1].as_str(),
        _ => {
            eprintln!("Usage: {} [config_path]", args[0]);
            process::exit(1);
        }
    };

    info!("Welcome to the log harvester!");

    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Could not load configuration");
            process::exit(1);
        }
    };

    let store = match Store::open(&config.paths.database).await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "Could not open the database");
            process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("You have stopped the application");
            let _ = shutdown_tx.send(true);
        }
    });

    info!("Press CTRL+C to close the application");

    let result = Harvester::new(store.clone(), config, shutdown_rx).run().await;
    store.close().await;

    if result.is_err() {
        process::exit(1);
    }
}
