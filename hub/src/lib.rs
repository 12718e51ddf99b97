//! Real-time hub that fans out store and forum updates to every connected
//! WebSocket client.
//!
//! # Architecture
//!
//! - **Single coordinator**: one task exclusively owns the live set of clients.
//!   Registration, removal and fan-out reach it as messages, so there are no
//!   locks and no fan-out ever races with a membership change.
//! - **Bounded per-client queues**: every client has its own outbound queue. A
//!   broadcast that finds a queue full evicts that client instead of waiting,
//!   so one slow consumer never delays the others or the publisher.
//! - **Lossy ingress**: broadcasts are submitted without blocking; when the
//!   coordinator's queue is full new broadcasts are dropped and logged.
//! - **Opaque payloads**: the hub reads only an envelope's `type` and
//!   `user_id`. Unknown types are relayed untouched.
//! - **Ephemeral**: nothing is persisted or replayed. Clients that reconnect
//!   start from fresh data.
//!
//! # Message Flow
//!
//! 1. The web layer upgrades `GET /ws` and calls `Hub::connect`
//! 2. The coordinator admits the new `Client` into the live set
//! 3. `Connection::run` starts the read and write loops
//! 4. The read loop decodes envelopes from the socket and broadcasts them;
//!    storefront and forum code publishes `DomainEvent`s which
//!    `HubDomainEventHandler` turns into broadcasts
//! 5. The coordinator pushes each envelope onto every client's queue, in the
//!    order it accepted them, including the client that sent it
//! 6. Each write loop drains its queue onto its socket
//! 7. A failed read or write, or an eviction, unregisters the client; its queue
//!    and socket are released once
//!
//! # Example: announcing a change
//!
//! ```rust,ignore
//! use hub::message::{Envelope, Kind};
//!
//! app_state.hub.broadcast(
//!     Envelope::new(Kind::ForumUpdate)
//!         .with_originator(Some(author_id))
//!         .with_payload(serde_json::json!({ "posts": [post] })),
//! );
//! ```
//!
//! # Modules
//!
//! - `client`: hub-owned `Client` and the socket-owned `Connection` loops
//! - `config`: queue sizes, echo and identity policy
//! - `coordinator`: the `Hub` handle and the `Coordinator` actor
//! - `domain_event_handler`: bridge from `events::DomainEvent` to envelopes
//! - `message`: the `Envelope` wire type

pub mod client;
pub mod config;
pub mod coordinator;
pub mod domain_event_handler;
pub mod error;
pub mod message;

pub use client::{Client, ClientId, Connection};
pub use config::{HubConfig, IdentityPolicy};
pub use coordinator::{Hub, HubStats};
pub use domain_event_handler::HubDomainEventHandler;
pub use message::{Envelope, Kind, UserId};
