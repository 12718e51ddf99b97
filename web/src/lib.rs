use log::*;
use service::AppState;
use tokio::net::TcpListener;

mod controller;
mod error;
pub mod router;
mod ws;

pub use error::{Error, Result};

/// Binds the configured address and serves the API until Ctrl-C.
pub async fn init_server(app_state: AppState) -> std::io::Result<()> {
    let address = app_state.config.bind_address();
    let listener = TcpListener::bind(&address).await?;

    info!("Server starting... listening for connections on http://{address}");

    axum::serve(listener, router::define_routes(app_state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, stopping server"),
        Err(e) => {
            error!("Unable to listen for shutdown signal: {e}");
            std::future::pending::<()>().await
        }
    }
}
