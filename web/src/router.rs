use crate::controller::{health_check_controller, hub_controller};
use crate::ws::handler;
use axum::http::{HeaderValue, Method};
use axum::{routing::get, Router};
use log::*;
use service::{config::Config, AppState};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

// This is the global definition of our OpenAPI spec. To be a part
// of the rendered spec, a path and schema must be listed here.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "Skaia Realtime API"
        ),
        paths(
            health_check_controller::health_check,
            hub_controller::stats,
            handler::ws_handler,
        ),
        components(
            schemas(
                hub_controller::HubStatsResponse,
            )
        ),
        tags(
            (name = "skaia_realtime", description = "Real-time store and forum updates")
        )
    )]
struct ApiDoc;

pub fn define_routes(app_state: AppState) -> Router {
    let cors = cors_layer(&app_state.config);

    Router::new()
        .merge(health_routes())
        .merge(ws_routes(app_state))
        .merge(RapiDoc::with_openapi("/api-docs/openapi.json", ApiDoc::openapi()).path("/rapidoc"))
        .layer(cors)
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn ws_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/ws", get(handler::ws_handler))
        .route("/ws/stats", get(hub_controller::stats))
        .with_state(app_state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(300));

    if config.allows_any_origin() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid CORS origin {origin}: {e}");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}
