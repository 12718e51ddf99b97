use log::*;
use service::{config::Config, logging::Logger, AppState};

#[tokio::main]
async fn main() {
    let config = get_config();

    Logger::init_logger(&config).expect("Failed to start logger");

    info!(
        "Starting Skaia realtime server in {} mode",
        config.runtime_env()
    );

    // One hub for the lifetime of the process; clients reconnect after a restart.
    let (hub, event_publisher) = service::init_hub(&config);
    let app_state = AppState::new(config, hub, event_publisher);

    if let Err(e) = web::init_server(app_state).await {
        error!("Server stopped with error: {e}");
        std::process::exit(1);
    }

    info!("Server stopped");
}

fn get_config() -> Config {
    Config::new()
}
