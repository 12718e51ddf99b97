use crate::client::{Client, ClientId, Connection, Outbound};
use crate::config::HubConfig;
use crate::error::{Error, Result};
use crate::message::{Envelope, UserId};
use log::*;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

/// Membership requests. Carried on an unbounded channel: they are rare and
/// must never be dropped.
enum Control {
    Register(Client),
    Unregister(ClientId),
    Identify(ClientId, Option<UserId>),
    Snapshot(oneshot::Sender<HubStats>),
}

struct Broadcast {
    envelope: Outbound,
    origin: Option<ClientId>,
}

/// Point-in-time view of the live set.
#[derive(Debug, Clone, Serialize)]
pub struct HubStats {
    pub connected_clients: usize,
    pub clients: Vec<ClientSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientSummary {
    pub id: ClientId,
    pub identity: Option<UserId>,
}

/// Cloneable handle to the coordinator. Every operation is safe to call
/// from any number of tasks at once.
#[derive(Clone)]
pub struct Hub {
    control: mpsc::UnboundedSender<Control>,
    ingress: mpsc::Sender<Broadcast>,
    config: Arc<HubConfig>,
}

impl Hub {
    /// Builds a handle and the coordinator that serves it. The coordinator
    /// does nothing until `Coordinator::run` is awaited.
    pub fn new(config: HubConfig) -> (Self, Coordinator) {
        let (control, control_rx) = mpsc::unbounded_channel();
        let (ingress, ingress_rx) = mpsc::channel(config.broadcast_queue_capacity.max(1));

        let coordinator = Coordinator {
            control_rx,
            ingress_rx,
            live: HashMap::new(),
            echo_to_sender: config.echo_to_sender,
        };
        let hub = Self {
            control,
            ingress,
            config: Arc::new(config),
        };

        (hub, coordinator)
    }

    /// Builds a hub and runs its coordinator on the current tokio runtime.
    pub fn spawn(config: HubConfig) -> Self {
        let (hub, coordinator) = Self::new(config);
        tokio::spawn(coordinator.run());
        hub
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Admits a new connection. `bound_identity` is the authenticated user
    /// behind it, if the caller knows one.
    pub fn connect(&self, bound_identity: Option<UserId>) -> Result<Connection> {
        let (client, outbound) = Client::channel(self.config.client_queue_capacity, bound_identity);
        let id = client.id();
        self.register(client)?;

        Ok(Connection::new(
            id,
            self.clone(),
            outbound,
            bound_identity,
            self.config.identity_policy,
        ))
    }

    /// Adds a client to the live set. The client is moved in, so the same
    /// client can never be registered twice.
    pub fn register(&self, client: Client) -> Result<()> {
        self.control
            .send(Control::Register(client))
            .map_err(|_| Error::hub_unavailable())
    }

    /// Removes a client and closes its outbound queue. Only the first removal
    /// of a client has any effect.
    pub fn unregister(&self, id: ClientId) {
        if self.control.send(Control::Unregister(id)).is_err() {
            debug!("Hub already stopped, client {id} needs no unregistering");
        }
    }

    /// Records the user a client claims to be. Travels with membership
    /// requests, so it is applied even when the broadcast it came with is
    /// dropped.
    pub(crate) fn identify(&self, id: ClientId, identity: Option<UserId>) {
        if self.control.send(Control::Identify(id, identity)).is_err() {
            debug!("Hub already stopped, identity of client {id} not recorded");
        }
    }

    /// Queues an envelope for delivery to every registered client. Never
    /// blocks: when the broadcast queue is full the envelope is dropped.
    pub fn broadcast(&self, envelope: Envelope) {
        self.submit(envelope, None);
    }

    pub(crate) fn broadcast_from(&self, origin: ClientId, envelope: Envelope) {
        self.submit(envelope, Some(origin));
    }

    fn submit(&self, envelope: Envelope, origin: Option<ClientId>) {
        let broadcast = Broadcast {
            envelope: Arc::new(envelope),
            origin,
        };

        match self.ingress.try_send(broadcast) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                warn!(
                    "Broadcast queue full, dropping {} envelope",
                    dropped.envelope.kind()
                );
            }
            Err(TrySendError::Closed(dropped)) => {
                warn!(
                    "Hub stopped, dropping {} envelope",
                    dropped.envelope.kind()
                );
            }
        }
    }

    /// Reports the live set. Membership requests are served ahead of queued
    /// broadcasts, so the answer can precede broadcasts already submitted.
    pub async fn snapshot(&self) -> Result<HubStats> {
        let (reply, answer) = oneshot::channel();
        self.control
            .send(Control::Snapshot(reply))
            .map_err(|_| Error::hub_unavailable())?;
        answer.await.map_err(|_| Error::hub_unavailable())
    }
}

/// Sole owner of the live set. All admits, evictions and fan-outs happen on
/// this task, one at a time.
pub struct Coordinator {
    control_rx: mpsc::UnboundedReceiver<Control>,
    ingress_rx: mpsc::Receiver<Broadcast>,
    live: HashMap<ClientId, Client>,
    echo_to_sender: bool,
}

impl Coordinator {
    /// Runs until every `Hub` handle is gone, then tears down the remaining clients.
    pub async fn run(mut self) {
        info!("Hub coordinator started");

        loop {
            tokio::select! {
                // Membership first: a client's registration is always applied
                // before any broadcast its own read loop submits.
                biased;

                control = self.control_rx.recv() => match control {
                    Some(control) => self.handle_control(control),
                    None => break,
                },
                Some(broadcast) = self.ingress_rx.recv() => self.fan_out(broadcast),
            }
        }

        self.shutdown();
    }

    fn handle_control(&mut self, control: Control) {
        match control {
            Control::Register(client) => self.admit(client),
            Control::Unregister(id) => self.remove(id),
            Control::Identify(id, identity) => {
                if let Some(client) = self.live.get_mut(&id) {
                    client.set_identity(identity);
                }
            }
            Control::Snapshot(reply) => {
                let _ = reply.send(self.stats());
            }
        }
    }

    fn admit(&mut self, client: Client) {
        let connected = self.live.len() + 1;
        match self.live.entry(client.id()) {
            Entry::Vacant(slot) => {
                info!(
                    "Client registered: {} (user {:?}), {connected} connected",
                    client.id(),
                    client.identity(),
                );
                slot.insert(client);
            }
            Entry::Occupied(_) => {
                warn!("Ignoring duplicate registration of client {}", client.id());
            }
        }
    }

    fn remove(&mut self, id: ClientId) {
        match self.live.remove(&id) {
            Some(mut client) => {
                client.close();
                info!(
                    "Client unregistered: {id} (user {:?}), {} connected",
                    client.identity(),
                    self.live.len()
                );
            }
            None => trace!("Client {id} already removed"),
        }
    }

    fn fan_out(&mut self, broadcast: Broadcast) {
        let Broadcast { envelope, origin } = broadcast;

        let mut slow = Vec::new();
        for (id, client) in &self.live {
            if !self.echo_to_sender && origin == Some(*id) {
                continue;
            }
            if !client.enqueue(envelope.clone()) {
                slow.push(*id);
            }
        }

        for id in slow {
            if let Some(mut client) = self.live.remove(&id) {
                client.close();
                warn!(
                    "Evicted client {id} (user {:?}): outbound queue full or closed",
                    client.identity()
                );
            }
        }

        trace!(
            "Fanned out {} envelope to {} client(s)",
            envelope.kind(),
            self.live.len()
        );
    }

    fn stats(&self) -> HubStats {
        HubStats {
            connected_clients: self.live.len(),
            clients: self
                .live
                .values()
                .map(|client| ClientSummary {
                    id: client.id(),
                    identity: client.identity(),
                })
                .collect(),
        }
    }

    fn shutdown(&mut self) {
        let remaining = self.live.len();
        for (_, mut client) in self.live.drain() {
            client.close();
        }
        info!("Hub coordinator stopped, released {remaining} client(s)");
    }
}
