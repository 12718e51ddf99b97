use crate::controller::ApiResponse;
use crate::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use log::*;
use serde::Serialize;
use service::AppState;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct HubStatsResponse {
    /// Number of WebSocket clients currently registered with the hub
    pub connected_clients: usize,
}

/// GET the number of connected WebSocket clients
#[utoipa::path(
    get,
    path = "/ws/stats",
    responses(
        (status = 200, description = "Successfully read hub statistics", body = HubStatsResponse),
        (status = 503, description = "The hub coordinator is not running")
    )
)]
pub async fn stats(State(app_state): State<AppState>) -> Result<impl IntoResponse> {
    let stats = app_state.hub.snapshot().await?;
    debug!("Hub has {} connected client(s)", stats.connected_clients);

    Ok(Json(ApiResponse::new(
        StatusCode::OK.into(),
        HubStatsResponse {
            connected_clients: stats.connected_clients,
        },
    )))
}
