use crate::message::{Envelope, Kind};
use crate::Hub;
use async_trait::async_trait;
use events::{DomainEvent, EventHandler};
use log::*;
use serde::Serialize;
use serde_json::Value;

/// Payload of `store:*` envelopes.
#[derive(Debug, Default, Serialize)]
pub struct StorePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cart: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub products: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Value>,
}

/// Payload of `forum:*` envelopes.
#[derive(Debug, Default, Serialize)]
pub struct ForumPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posts: Option<Value>,
}

/// Turns domain events published by the storefront and forum into envelopes
/// and broadcasts them to every connected client.
pub struct HubDomainEventHandler {
    hub: Hub,
}

impl HubDomainEventHandler {
    pub fn new(hub: Hub) -> Self {
        Self { hub }
    }

    /// Builds the envelope announced to clients for a domain event.
    pub fn envelope_for(event: &DomainEvent) -> Envelope {
        match event {
            DomainEvent::CartChanged { user_id, cart } => Envelope::new(Kind::StoreUpdate)
                .with_originator(Some(*user_id))
                .with_payload(to_value(StorePayload {
                    cart: Some(cart.clone()),
                    ..StorePayload::default()
                })),
            DomainEvent::CatalogSynced {
                products,
                categories,
            } => Envelope::new(Kind::StoreSync).with_payload(to_value(StorePayload {
                products: Some(products.clone()),
                categories: Some(categories.clone()),
                ..StorePayload::default()
            })),
            DomainEvent::ForumSynced { threads, posts } => Envelope::new(Kind::ForumSync)
                .with_payload(to_value(ForumPayload {
                    threads: Some(threads.clone()),
                    posts: Some(posts.clone()),
                })),
            DomainEvent::ForumThreadChanged { user_id, thread } => {
                Envelope::new(Kind::ForumUpdate)
                    .with_originator(*user_id)
                    .with_payload(to_value(ForumPayload {
                        threads: Some(Value::Array(vec![thread.clone()])),
                        posts: None,
                    }))
            }
            DomainEvent::ForumPostChanged { user_id, post } => Envelope::new(Kind::ForumUpdate)
                .with_originator(*user_id)
                .with_payload(to_value(ForumPayload {
                    threads: None,
                    posts: Some(Value::Array(vec![post.clone()])),
                })),
            DomainEvent::UserJoined { user_id } => Envelope::new(Kind::UserJoin)
                .with_originator(Some(*user_id))
                .with_payload(serde_json::json!({ "user_id": user_id })),
            DomainEvent::UserLeft { user_id } => Envelope::new(Kind::UserLeave)
                .with_originator(Some(*user_id))
                .with_payload(serde_json::json!({ "user_id": user_id })),
        }
    }
}

fn to_value<T: Serialize>(payload: T) -> Value {
    // Payload structs hold only JSON values, so this cannot fail.
    serde_json::to_value(payload).unwrap_or(Value::Null)
}

#[async_trait]
impl EventHandler for HubDomainEventHandler {
    async fn handle(&self, event: &DomainEvent) {
        let envelope = Self::envelope_for(event);
        debug!("Broadcasting {} envelope for domain event", envelope.kind());
        self.hub.broadcast(envelope);
    }
}
