use crate::config::IdentityPolicy;
use crate::coordinator::Hub;
use crate::error::{Error, Result};
use crate::message::{Envelope, UserId};
use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use log::*;
use serde::Serialize;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// An envelope on its way to one client's socket.
pub type Outbound = Arc<Envelope>;

/// Unique identifier for a client connection (server-generated).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ClientId(uuid::Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The hub's side of a connection: owned by the coordinator while registered.
///
/// Holding the only sender of the outbound queue, a `Client` closes that queue
/// by dropping it. The write loop then drains what is left and hangs up.
#[derive(Debug)]
pub struct Client {
    id: ClientId,
    identity: Option<UserId>,
    queue: Option<mpsc::Sender<Outbound>>,
}

impl Client {
    /// Creates a client and the receiving end of its outbound queue.
    pub fn channel(capacity: usize, identity: Option<UserId>) -> (Self, mpsc::Receiver<Outbound>) {
        let (queue, outbound) = mpsc::channel(capacity.max(1));
        let client = Self {
            id: ClientId::new(),
            identity,
            queue: Some(queue),
        };
        (client, outbound)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Last-known user behind this connection.
    pub fn identity(&self) -> Option<UserId> {
        self.identity
    }

    pub(crate) fn set_identity(&mut self, identity: Option<UserId>) {
        self.identity = identity;
    }

    /// Non-blocking push onto the outbound queue. Returns `false` when the
    /// queue is full, closed, or its write loop has already gone away.
    pub fn enqueue(&self, envelope: Outbound) -> bool {
        match &self.queue {
            Some(queue) => queue.try_send(envelope).is_ok(),
            None => false,
        }
    }

    /// Closes the outbound queue. Returns `true` only for the call that
    /// actually tore the client down.
    pub fn close(&mut self) -> bool {
        self.queue.take().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_none()
    }
}

/// The socket's side of a connection: drives the read and write loops.
pub struct Connection {
    id: ClientId,
    hub: Hub,
    outbound: mpsc::Receiver<Outbound>,
    bound_identity: Option<UserId>,
    identity_policy: IdentityPolicy,
}

impl Connection {
    pub(crate) fn new(
        id: ClientId,
        hub: Hub,
        outbound: mpsc::Receiver<Outbound>,
        bound_identity: Option<UserId>,
        identity_policy: IdentityPolicy,
    ) -> Self {
        Self {
            id,
            hub,
            outbound,
            bound_identity,
            identity_policy,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Spawns the inbound and outbound loops as independent tasks.
    ///
    /// Either loop ending unregisters the client; the hub ignores every
    /// removal after the first. When the write loop ends it also stops the
    /// read loop, so both halves of the socket are released.
    pub fn run<S, K, E>(self, stream: S, sink: K) -> (JoinHandle<()>, JoinHandle<()>)
    where
        S: Stream<Item = core::result::Result<Message, E>> + Send + Unpin + 'static,
        E: Into<Box<dyn StdError + Send + Sync>> + Send + 'static,
        K: Sink<Message> + Send + Unpin + 'static,
        K::Error: fmt::Display + Send,
    {
        let (stop_tx, stop_rx) = oneshot::channel();

        let reader = Reader {
            id: self.id,
            hub: self.hub.clone(),
            bound_identity: self.bound_identity,
            identity_policy: self.identity_policy,
        };
        let read = tokio::spawn(reader.run(stream, stop_rx));
        let write = tokio::spawn(write_loop(self.id, self.hub, self.outbound, sink, stop_tx));

        (read, write)
    }
}

struct Reader {
    id: ClientId,
    hub: Hub,
    bound_identity: Option<UserId>,
    identity_policy: IdentityPolicy,
}

impl Reader {
    async fn run<S, E>(self, mut stream: S, mut stop: oneshot::Receiver<()>)
    where
        S: Stream<Item = core::result::Result<Message, E>> + Unpin,
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        let mut identity = self.bound_identity;

        let outcome: Result<()> = loop {
            let frame = tokio::select! {
                frame = stream.next() => frame,
                _ = &mut stop => break Ok(()),
            };

            let decoded = match frame {
                Some(Ok(Message::Text(text))) => Envelope::from_json(text.as_str()),
                Some(Ok(Message::Binary(bytes))) => Envelope::from_slice(&bytes),
                Some(Ok(Message::Close(_))) | None => break Ok(()),
                // Ping/pong are answered by the websocket layer.
                Some(Ok(_)) => continue,
                Some(Err(e)) => break Err(Error::transport(e)),
            };

            let envelope = match decoded {
                Ok(envelope) => envelope,
                Err(e) => break Err(e),
            };

            let envelope = match self.identity_policy {
                IdentityPolicy::Reported => {
                    identity = envelope.originator();
                    self.hub.identify(self.id, identity);
                    envelope
                }
                IdentityPolicy::Bound => envelope.with_originator(self.bound_identity),
            };

            trace!("Client {} sent {} envelope", self.id, envelope.kind());
            self.hub.broadcast_from(self.id, envelope);
        };

        match outcome {
            Ok(()) => debug!("Read loop for client {} finished", self.id),
            Err(e) => warn!("Read loop for client {} (user {:?}) failed: {e}", self.id, identity),
        }

        self.hub.unregister(self.id);
    }
}

async fn write_loop<K>(
    id: ClientId,
    hub: Hub,
    mut outbound: mpsc::Receiver<Outbound>,
    mut sink: K,
    _stop_reader: oneshot::Sender<()>,
) where
    K: Sink<Message> + Unpin,
    K::Error: fmt::Display,
{
    let mut write_failed = false;

    while let Some(envelope) = outbound.recv().await {
        let text = match envelope.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!("Dropping {} envelope for client {id}: {e}", envelope.kind());
                continue;
            }
        };

        if let Err(e) = sink.send(Message::Text(text.into())).await {
            warn!("Write to client {id} failed: {e}");
            write_failed = true;
            break;
        }
    }

    if write_failed {
        hub.unregister(id);
    } else if let Err(e) = sink.send(Message::Close(None)).await {
        debug!("Close frame to client {id} not delivered: {e}");
    }

    if let Err(e) = sink.close().await {
        debug!("Closing socket for client {id} failed: {e}");
    }

    debug!("Write loop for client {id} finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use crate::message::Kind;
    use futures::channel::mpsc as fmpsc;
    use futures::stream;
    use serde_json::json;
    use std::io;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    fn text(envelope: &Envelope) -> Message {
        Message::Text(envelope.to_json().unwrap().into())
    }

    fn decode(message: Message) -> Envelope {
        match message {
            Message::Text(text) => Envelope::from_json(text.as_str()).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    fn observer(hub: &Hub) -> mpsc::Receiver<Outbound> {
        let (client, outbound) = Client::channel(64, None);
        hub.register(client).unwrap();
        outbound
    }

    async fn wait_until_live(hub: &Hub, expected: usize) {
        timeout(WAIT, async {
            loop {
                if hub.snapshot().await.unwrap().connected_clients == expected {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("live set never reached the expected size");
    }

    #[test]
    fn close_tears_down_exactly_once() {
        let (mut client, _outbound) = Client::channel(4, None);
        assert!(!client.is_closed());
        assert!(client.close());
        assert!(!client.close());
        assert!(client.is_closed());
        assert!(!client.enqueue(Arc::new(Envelope::new(Kind::StoreSync))));
    }

    #[test]
    fn enqueue_fails_once_the_queue_is_full() {
        let (client, _outbound) = Client::channel(2, None);
        let envelope = Arc::new(Envelope::new(Kind::StoreSync));
        assert!(client.enqueue(envelope.clone()));
        assert!(client.enqueue(envelope.clone()));
        assert!(!client.enqueue(envelope));
    }

    #[test]
    fn enqueue_fails_when_the_write_loop_is_gone() {
        let (client, outbound) = Client::channel(2, None);
        drop(outbound);
        assert!(!client.enqueue(Arc::new(Envelope::new(Kind::StoreSync))));
    }

    #[tokio::test]
    async fn inbound_envelopes_are_broadcast_to_every_client() {
        let hub = Hub::spawn(HubConfig::default());
        let mut watcher = observer(&hub);

        let sent = Envelope::new(Kind::StoreUpdate).with_payload(json!({"cart": [{"id": "c1"}]}));
        let connection = hub.connect(None).unwrap();
        let inbound = stream::iter(vec![Ok::<_, io::Error>(text(&sent))]).chain(stream::pending());
        let (sink, mut wire) = fmpsc::unbounded::<Message>();
        let _loops = connection.run(inbound, sink);

        let received = timeout(WAIT, watcher.recv()).await.unwrap().unwrap();
        assert_eq!(*received, sent);

        // The reference behavior echoes a client's broadcast back to it.
        let echoed = timeout(WAIT, wire.next()).await.unwrap().unwrap();
        assert_eq!(decode(echoed), sent);
    }

    #[tokio::test]
    async fn reported_policy_tracks_the_last_originator() {
        let hub = Hub::spawn(HubConfig::default());
        let mut watcher = observer(&hub);
        let (first, second) = (UserId::new_v4(), UserId::new_v4());

        let connection = hub.connect(None).unwrap();
        let id = connection.id();
        let inbound = stream::iter(vec![
            Ok::<_, io::Error>(text(&Envelope::new(Kind::UserJoin).with_originator(Some(first)))),
            Ok(text(&Envelope::new(Kind::StoreUpdate).with_originator(Some(second)))),
        ])
        .chain(stream::pending());
        let (sink, _wire) = fmpsc::unbounded::<Message>();
        let _loops = connection.run(inbound, sink);

        let a = timeout(WAIT, watcher.recv()).await.unwrap().unwrap();
        let b = timeout(WAIT, watcher.recv()).await.unwrap().unwrap();
        assert_eq!(a.originator(), Some(first));
        assert_eq!(b.originator(), Some(second));

        let stats = hub.snapshot().await.unwrap();
        let summary = stats.clients.iter().find(|c| c.id == id).unwrap();
        assert_eq!(summary.identity, Some(second));
    }

    #[tokio::test]
    async fn reported_identity_survives_a_saturated_broadcast_queue() {
        let (hub, coordinator) = Hub::new(HubConfig {
            broadcast_queue_capacity: 1,
            ..HubConfig::default()
        });
        hub.broadcast(Envelope::new(Kind::StoreSync));
        let user = UserId::new_v4();

        let connection = hub.connect(None).unwrap();
        let id = connection.id();
        let claim = Envelope::new(Kind::UserJoin).with_originator(Some(user));
        let inbound =
            stream::iter(vec![Ok::<_, io::Error>(text(&claim))]).chain(stream::pending());
        let (sink, _wire) = fmpsc::unbounded::<Message>();
        let _loops = connection.run(inbound, sink);
        tokio::spawn(coordinator.run());

        timeout(WAIT, async {
            loop {
                let stats = hub.snapshot().await.unwrap();
                if stats.clients.iter().any(|c| c.id == id && c.identity == Some(user)) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("identity was never recorded");
    }

    #[tokio::test]
    async fn bound_policy_overwrites_claimed_originators() {
        let hub = Hub::spawn(HubConfig {
            identity_policy: IdentityPolicy::Bound,
            ..HubConfig::default()
        });
        let mut watcher = observer(&hub);
        let (bound, claimed) = (UserId::new_v4(), UserId::new_v4());

        let authenticated = hub.connect(Some(bound)).unwrap();
        let anonymous = hub.connect(None).unwrap();
        let claim = Envelope::new(Kind::ForumUpdate).with_originator(Some(claimed));

        let (sink_a, _wire_a) = fmpsc::unbounded::<Message>();
        let _a = authenticated.run(
            stream::iter(vec![Ok::<_, io::Error>(text(&claim))]).chain(stream::pending()),
            sink_a,
        );
        let first = timeout(WAIT, watcher.recv()).await.unwrap().unwrap();
        assert_eq!(first.originator(), Some(bound));

        let (sink_b, _wire_b) = fmpsc::unbounded::<Message>();
        let _b = anonymous.run(
            stream::iter(vec![Ok::<_, io::Error>(text(&claim))]).chain(stream::pending()),
            sink_b,
        );
        let second = timeout(WAIT, watcher.recv()).await.unwrap().unwrap();
        assert_eq!(second.originator(), None);
        assert_eq!(second.payload(), claim.payload());
    }

    #[tokio::test]
    async fn write_loop_preserves_order_and_closes_on_unregister() {
        let hub = Hub::spawn(HubConfig::default());
        let connection = hub.connect(None).unwrap();
        let id = connection.id();
        let (sink, mut wire) = fmpsc::unbounded::<Message>();
        let inbound = stream::pending::<core::result::Result<Message, io::Error>>();
        let (read, write) = connection.run(inbound, sink);

        for n in 0..5 {
            hub.broadcast(Envelope::new(Kind::ForumUpdate).with_payload(json!({ "n": n })));
        }
        for n in 0..5 {
            let frame = timeout(WAIT, wire.next()).await.unwrap().unwrap();
            assert_eq!(decode(frame).payload(), &json!({ "n": n }));
        }

        hub.unregister(id);
        timeout(WAIT, write).await.unwrap().unwrap();
        timeout(WAIT, read).await.unwrap().unwrap();

        assert!(matches!(wire.next().await, Some(Message::Close(None))));
        assert!(wire.next().await.is_none());
        assert_eq!(hub.snapshot().await.unwrap().connected_clients, 0);
    }

    #[tokio::test]
    async fn abrupt_transport_error_unregisters_the_client() {
        let hub = Hub::spawn(HubConfig::default());
        let mut watcher = observer(&hub);

        let connection = hub.connect(None).unwrap();
        let inbound = stream::iter(vec![Err::<Message, _>(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "reset by peer",
        ))]);
        let (sink, _wire) = fmpsc::unbounded::<Message>();
        let (read, write) = connection.run(inbound, sink);

        timeout(WAIT, read).await.unwrap().unwrap();
        timeout(WAIT, write).await.unwrap().unwrap();
        wait_until_live(&hub, 1).await;

        // Later broadcasts skip the torn-down client and still reach the rest.
        hub.broadcast(Envelope::new(Kind::StoreSync));
        let received = timeout(WAIT, watcher.recv()).await.unwrap().unwrap();
        assert_eq!(received.kind(), &Kind::StoreSync);
    }

    #[tokio::test]
    async fn malformed_frame_ends_the_connection() {
        let hub = Hub::spawn(HubConfig::default());
        let connection = hub.connect(None).unwrap();
        let inbound = stream::iter(vec![Ok::<_, io::Error>(Message::Text("{oops".into()))])
            .chain(stream::pending());
        let (sink, mut wire) = fmpsc::unbounded::<Message>();
        let (read, write) = connection.run(inbound, sink);

        timeout(WAIT, read).await.unwrap().unwrap();
        timeout(WAIT, write).await.unwrap().unwrap();

        assert!(matches!(wire.next().await, Some(Message::Close(None))));
        assert_eq!(hub.snapshot().await.unwrap().connected_clients, 0);
    }

    #[tokio::test]
    async fn close_frame_ends_the_connection() {
        let hub = Hub::spawn(HubConfig::default());
        let connection = hub.connect(None).unwrap();
        let inbound = stream::iter(vec![
            Ok::<_, io::Error>(Message::Ping(vec![1u8].into())),
            Ok(Message::Close(None)),
        ])
        .chain(stream::pending());
        let (sink, _wire) = fmpsc::unbounded::<Message>();
        let (read, _write) = connection.run(inbound, sink);

        timeout(WAIT, read).await.unwrap().unwrap();
        wait_until_live(&hub, 0).await;
    }

    #[tokio::test]
    async fn write_failure_tears_down_without_panicking() {
        let hub = Hub::spawn(HubConfig::default());
        let connection = hub.connect(None).unwrap();
        let (sink, wire) = fmpsc::unbounded::<Message>();
        drop(wire);
        let inbound = stream::pending::<core::result::Result<Message, io::Error>>();
        let (read, write) = connection.run(inbound, sink);

        hub.broadcast(Envelope::new(Kind::UserJoin));

        timeout(WAIT, write).await.unwrap().unwrap();
        timeout(WAIT, read).await.unwrap().unwrap();
        wait_until_live(&hub, 0).await;
    }
}
