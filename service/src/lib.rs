use config::Config;
use events::EventPublisher;
use hub::{Hub, HubDomainEventHandler};
use log::info;
use std::sync::Arc;

pub mod config;
pub mod logging;

/// Starts the process-wide hub and wires a publisher that forwards domain
/// events to it. Must be called from within a tokio runtime.
pub fn init_hub(config: &Config) -> (Hub, EventPublisher) {
    let hub_config = config.hub_config();
    info!(
        "Hub config: client_queue_capacity={}, broadcast_queue_capacity={}, \
         identity_policy={}, echo_to_sender={}",
        hub_config.client_queue_capacity,
        hub_config.broadcast_queue_capacity,
        hub_config.identity_policy,
        hub_config.echo_to_sender,
    );

    let hub = Hub::spawn(hub_config);
    let publisher =
        EventPublisher::new().with_handler(Arc::new(HubDomainEventHandler::new(hub.clone())));

    (hub, publisher)
}

// Service-level state shared by every handler.
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub hub: Hub,
    /// Storefront and forum code publishes changes here.
    pub event_publisher: EventPublisher,
}

impl AppState {
    pub fn new(app_config: Config, hub: Hub, event_publisher: EventPublisher) -> Self {
        Self {
            config: app_config,
            hub,
            event_publisher,
        }
    }
}
