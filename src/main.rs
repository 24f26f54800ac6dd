// src/main.rs
use pallet_planner::api;
use pallet_planner::config::AppConfig;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let dotenv_result = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(err) = dotenv_result {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            warn!("Could not load .env: {}", err);
        }
    }

    let app_config = AppConfig::from_env();
    let packing = app_config.optimizer.packing_config();
    info!(
        mode = packing.mode.as_str(),
        cap_layers_by_weight = packing.cap_layers_by_weight,
        "Pallet planner starting"
    );

    api::start_api_server(app_config.api, app_config.optimizer).await
}
