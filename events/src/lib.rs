//! Event system infrastructure for the Skaia storefront and forum.
//!
//! This crate is the seam between the request/response layer (users, products,
//! carts, orders, forum threads and posts) and the real-time hub. Whenever a
//! durable change completes, the owning collaborator publishes a `DomainEvent`
//! and every registered handler decides what to do with it.
//!
//! # Architecture
//!
//! - **DomainEvent**: Enum representing the store, forum and presence changes
//! - **EventHandler**: Trait for implementing event handlers
//! - **EventPublisher**: Publishes events to registered handlers
//!
//! This crate has no dependencies on other internal crates, avoiding circular
//! dependencies. Entity data is carried as serialized JSON values.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// A type alias that represents any entity's id field data type.
pub type Id = Uuid;

/// Domain events that represent business-level changes in the system.
/// These events are emitted after the persistence layer has committed the change.
///
/// Entity data is carried as `serde_json::Value` so this crate stays free of
/// entity definitions.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    /// A user's cart was mutated (item added, quantity changed, checkout).
    CartChanged {
        /// Owner of the cart.
        user_id: Id,
        /// Complete serialized list of the cart's items after the change.
        cart: Value,
    },
    /// The product catalog or its categories changed and clients should resync.
    CatalogSynced {
        /// Serialized products.
        products: Value,
        /// Serialized store categories.
        categories: Value,
    },
    /// A full forum snapshot for clients to resync from.
    ForumSynced { threads: Value, posts: Value },
    /// A forum thread was created, edited or deleted.
    ForumThreadChanged {
        /// Author of the change, `None` for moderation or system actions.
        user_id: Option<Id>,
        /// Complete serialized thread entity.
        thread: Value,
    },
    /// A forum post was created, edited or deleted.
    ForumPostChanged {
        /// Author of the change, `None` for moderation or system actions.
        user_id: Option<Id>,
        /// Complete serialized post entity.
        post: Value,
    },
    /// A user signed in.
    UserJoined { user_id: Id },
    /// A user signed out.
    UserLeft { user_id: Id },
}

/// Trait for handling domain events.
/// Implementations can perform side effects like pushing real-time updates,
/// updating caches, logging, etc.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent);
}

/// Publishes domain events to registered handlers.
/// Handlers are called sequentially in registration order.
#[derive(Clone)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Register a new event handler.
    /// Note: This creates a new publisher instance with the additional handler.
    /// Store the returned publisher in your application state.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Publish an event to all registered handlers, in registration order.
    pub async fn publish(&self, event: DomainEvent) {
        for handler in self.handlers.iter() {
            handler.handle(&event).await;
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
