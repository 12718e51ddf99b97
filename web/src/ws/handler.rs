use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::StreamExt;
use hub::Hub;
use log::*;
use service::AppState;

/// GET upgrade to a long-lived WebSocket that receives every broadcast envelope
#[utoipa::path(
    get,
    path = "/ws",
    responses(
        (status = 101, description = "Switched to the WebSocket envelope stream"),
        (status = 400, description = "Request was not a valid WebSocket upgrade"),
    )
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
) -> impl IntoResponse {
    let hub = app_state.hub.clone();
    ws.on_upgrade(move |socket| admit(socket, hub))
}

/// Registers the socket with the hub and hands it to the client loops.
/// Connections are admitted anonymously: no authenticated identity is bound.
async fn admit(socket: WebSocket, hub: Hub) {
    let connection = match hub.connect(None) {
        Ok(connection) => connection,
        Err(e) => {
            error!("Rejecting WebSocket connection: {e}");
            return;
        }
    };

    debug!("Establishing WebSocket connection for client {}", connection.id());

    let (sink, stream) = socket.split();
    // The loops own the socket halves and clean up after themselves.
    let _loops = connection.run(stream, sink);
}
