use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;
use tracing::Level;

use crate::config::Config;
use crate::display_ext::DisplayBoundedExt;
use crate::error::MissingEntity;
use crate::error::ReconnectError;
use crate::handshake::gate::ConsistencyGate;
use crate::handshake::message::ClientHandshake;
use crate::handshake::message::ClientInfo;
use crate::handshake::message::HandshakeAck;
use crate::handshake::message::ReconnectReference;
use crate::txn::read_batch;
use crate::txn::ParsedTransaction;
use crate::types::ClientId;
use crate::types::NodeId;

/// Per-process lifecycle of the coordinator.
///
/// Moves monotonically Init → Starting → Started; only an explicit `stop()`
/// resets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// No clients known.
    Init,
    /// Restarted with previously-connected clients pending reconnection.
    Starting,
    /// Normal operation; new handshakes are acknowledged immediately.
    Started,
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorState::Init => write!(f, "init"),
            CoordinatorState::Starting => write!(f, "starting"),
            CoordinatorState::Started => write!(f, "started"),
        }
    }
}

/// A connected client's transport as the coordinator sees it.
///
/// Both methods enqueue only; they must never block on network io, since the
/// coordinator calls them while holding its state lock.
pub trait ClientChannel: Send + Sync {
    fn send_ack(&self, ack: &HandshakeAck);
    fn close(&self);
}

/// Force-closes the transport of a client that failed to reconnect in time.
/// Such clients never produced a [`ClientChannel`] in this process.
pub trait ChannelCloser: Send + Sync {
    fn force_close(&self, client: ClientId);
}

/// Looks up the entity behind a reconnect reference. A reference that cannot
/// be resolved means client and server state have diverged; the reconnect is
/// aborted.
pub trait EntityResolver: Send + Sync {
    fn resolve(&self, client: ClientId, reference: &ReconnectReference) -> Result<(), MissingEntity>;
}

/// The normal per-object change application path. Resent transactions are
/// replayed through the same sink that handles fresh work. Non-blocking.
pub trait ApplySink: Send + Sync {
    fn apply(&self, txn: ParsedTransaction);

    /// Pushes one synthetic no-op unit of work through the pipeline so a
    /// stage waiting on resends unblocks even if nothing was resent.
    fn enqueue_noop(&self);
}

/// Notified once per transition to Started.
pub trait ReconnectListener: Send + Sync {
    fn on_reconnect_complete(&self);
}

struct CoordinatorInner {
    state: CoordinatorState,

    /// Bumped on every transition that invalidates scheduled work, so a
    /// window tick or gate retry that fires mid-cancel observes it and
    /// stands down.
    generation: u64,

    /// Previously-connected clients that have not reconnected yet.
    unconnected: BTreeSet<ClientId>,

    channels: BTreeMap<ClientId, Arc<dyn ClientChannel>>,
    info: BTreeMap<ClientId, ClientInfo>,
    acked: BTreeSet<ClientId>,

    active_nodes: BTreeSet<NodeId>,
    listeners: Vec<Arc<dyn ReconnectListener>>,

    window: Option<JoinHandle<()>>,
}

/// Admits clients, runs the bounded reconnect window after a restart, and
/// replays resent work, gating admission on the consistency check.
///
/// All state lives behind one lock; acknowledgements are sent while holding
/// it, so a client is never marked active without being acked (or acked
/// without being marked) under concurrent handshakes. Must be created inside
/// a tokio runtime: the reconnect window and gate retries are spawned tasks.
pub struct HandshakeCoordinator {
    config: Arc<Config>,
    server_version: String,
    gate: Arc<dyn ConsistencyGate>,
    resolver: Arc<dyn EntityResolver>,
    sink: Arc<dyn ApplySink>,
    closer: Arc<dyn ChannelCloser>,
    inner: Mutex<CoordinatorInner>,
}

impl HandshakeCoordinator {
    pub fn new(
        config: Arc<Config>,
        server_version: impl ToString,
        gate: Arc<dyn ConsistencyGate>,
        resolver: Arc<dyn EntityResolver>,
        sink: Arc<dyn ApplySink>,
        closer: Arc<dyn ChannelCloser>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            server_version: server_version.to_string(),
            gate,
            resolver,
            sink,
            closer,
            inner: Mutex::new(CoordinatorInner {
                state: CoordinatorState::Init,
                generation: 0,
                unconnected: BTreeSet::new(),
                channels: BTreeMap::new(),
                info: BTreeMap::new(),
                acked: BTreeSet::new(),
                active_nodes: BTreeSet::new(),
                listeners: Vec::new(),
                window: None,
            }),
        })
    }

    pub fn state(&self) -> CoordinatorState {
        self.inner.lock().unwrap().state
    }

    pub fn add_listener(&self, listener: Arc<dyn ReconnectListener>) {
        self.inner.lock().unwrap().listeners.push(listener);
    }

    /// The replica group members handshake acks report as active.
    pub fn set_active_nodes(&self, nodes: BTreeSet<NodeId>) {
        self.inner.lock().unwrap().active_nodes = nodes;
    }

    /// Flat monitoring report: connection identity → the fields the client
    /// reported at handshake time.
    pub fn client_report(&self) -> BTreeMap<ClientId, ClientInfo> {
        self.inner.lock().unwrap().info.clone()
    }

    pub fn connected_clients(&self) -> BTreeSet<ClientId> {
        self.inner.lock().unwrap().channels.keys().copied().collect()
    }

    /// Begins startup with the set of clients known to have been connected
    /// before the restart. Valid only from the initial state.
    ///
    /// An empty set means a fresh server: it goes straight to Started.
    pub fn set_starting(self: &Arc<Self>, existing: BTreeSet<ClientId>) {
        let mut inner = self.inner.lock().unwrap();
        assert_eq!(
            CoordinatorState::Init,
            inner.state,
            "set_starting is only valid in the initial state"
        );

        if existing.is_empty() {
            inner.state = CoordinatorState::Started;
            tracing::info!("no previously connected clients; admitting handshakes immediately");
            drop(inner);
            self.on_started();
            return;
        }

        let waiting: Vec<ClientId> = existing.iter().copied().collect();
        tracing::info!(
            "waiting up to {:?} for {} clients to reconnect: {}",
            self.config.reconnect_window(),
            waiting.len(),
            waiting.display_bounded(10)
        );

        inner.unconnected = existing;
        inner.state = CoordinatorState::Starting;
        let generation = inner.generation;
        inner.window = Some(self.spawn_window(generation));
    }

    /// Handles a client handshake.
    ///
    /// Diagnostic connections are acknowledged immediately regardless of
    /// state. In Started, the client is registered and acked. In Starting,
    /// this is a reconnect: every reconnect reference is resolved (a missing
    /// entity aborts the reconnect and closes the channel), every resent
    /// transaction is replayed through the apply sink in its original order,
    /// and the client leaves the unconnected set — emptying it ends the
    /// window early.
    ///
    /// Panics if called in the initial state.
    #[tracing::instrument(level = "debug", skip_all, fields(client = %handshake.client_id))]
    pub fn notify_client_connect(
        self: &Arc<Self>,
        handshake: ClientHandshake,
        channel: Arc<dyn ClientChannel>,
    ) -> Result<(), ReconnectError> {
        if handshake.diagnostic {
            let inner = self.inner.lock().unwrap();
            channel.send_ack(&self.ack_locked(&inner));
            tracing::debug!("diagnostic connection {} acknowledged", handshake.client_id);
            return Ok(());
        }

        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CoordinatorState::Started => {
                let ack = self.ack_locked(&inner);
                inner.channels.insert(handshake.client_id, channel.clone());
                inner.info.insert(handshake.client_id, handshake.info.clone());
                channel.send_ack(&ack);
                inner.acked.insert(handshake.client_id);
                tracing::debug!("client {} connected", handshake.client_id);
                Ok(())
            }

            CoordinatorState::Starting => {
                for reference in &handshake.reconnect_references {
                    if let Err(e) = self.resolver.resolve(handshake.client_id, reference) {
                        tracing::error!("reconnect of client {} aborted: {}", handshake.client_id, e);
                        channel.close();
                        return Err(e.into());
                    }
                }

                for bytes in &handshake.resent_batches {
                    let parsed = match read_batch(bytes) {
                        Ok(parsed) => parsed,
                        Err(e) => {
                            tracing::error!(
                                "reconnect of client {} aborted, resent batch unreadable: {}",
                                handshake.client_id,
                                e
                            );
                            channel.close();
                            return Err(e.into());
                        }
                    };
                    tracing::debug!(
                        "replaying resent batch {} of client {}: {} transactions",
                        parsed.batch_id,
                        handshake.client_id,
                        parsed.transactions.len()
                    );
                    for txn in parsed.transactions {
                        self.sink.apply(txn);
                    }
                }

                inner.channels.insert(handshake.client_id, channel);
                inner.info.insert(handshake.client_id, handshake.info.clone());

                if inner.unconnected.remove(&handshake.client_id) {
                    tracing::info!(
                        "client {} reconnected, {} still pending",
                        handshake.client_id,
                        inner.unconnected.len()
                    );
                }

                if inner.unconnected.is_empty() {
                    inner.state = CoordinatorState::Started;
                    inner.generation += 1;
                    if let Some(window) = inner.window.take() {
                        window.abort();
                    }
                    tracing::info!("all clients reconnected before the window expired");
                    drop(inner);
                    self.on_started();
                }
                Ok(())
            }

            CoordinatorState::Init => {
                panic!(
                    "client {} handshake while coordinator is in state {}",
                    handshake.client_id, inner.state
                );
            }
        }
    }

    /// Cancels the window timer and resets to the initial state.
    pub fn stop(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.generation += 1;
        if let Some(window) = inner.window.take() {
            window.abort();
        }
        inner.state = CoordinatorState::Init;
        inner.unconnected.clear();
        inner.channels.clear();
        inner.info.clear();
        inner.acked.clear();
        tracing::info!("handshake coordinator stopped");
    }

    fn ack_locked(&self, inner: &CoordinatorInner) -> HandshakeAck {
        HandshakeAck {
            active_nodes: inner.active_nodes.clone(),
            server_version: self.server_version.clone(),
        }
    }

    /// The reconnect window, run as a sequence of capped ticks rather than
    /// one long timer: each tick recomputes the remaining time and reports
    /// progress. A final partial tick sleeps only the remainder and logs
    /// nothing further.
    fn spawn_window(self: &Arc<Self>, generation: u64) -> JoinHandle<()> {
        let this = self.clone();
        let window = self.config.reconnect_window();
        let cap = self.config.reconnect_notice_interval();
        let span = tracing::span!(Level::DEBUG, "reconnect-window");

        tokio::spawn(
            async move {
                let deadline = Instant::now() + window;
                loop {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        break;
                    }
                    tokio::time::sleep(remaining.min(cap)).await;

                    let inner = this.inner.lock().unwrap();
                    if inner.generation != generation || inner.state != CoordinatorState::Starting {
                        return;
                    }
                    let left = deadline.saturating_duration_since(Instant::now());
                    if !left.is_zero() {
                        let waiting: Vec<ClientId> = inner.unconnected.iter().copied().collect();
                        tracing::info!(
                            "still waiting for {} clients to reconnect: {}, {:?} of the window left",
                            waiting.len(),
                            waiting.display_bounded(10),
                            left
                        );
                    }
                }
                this.expire_window(generation);
            }
            .instrument(span),
        )
    }

    /// The window ran out: stragglers are sacrificed, not waited on.
    fn expire_window(self: &Arc<Self>, generation: u64) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.generation != generation || inner.state != CoordinatorState::Starting {
                return;
            }

            let stragglers: Vec<ClientId> = inner.unconnected.iter().copied().collect();
            tracing::warn!(
                "reconnect window expired; force-closing {} clients: {}",
                stragglers.len(),
                stragglers.display_bounded(10)
            );
            for client in &stragglers {
                self.closer.force_close(*client);
            }
            inner.unconnected.clear();
            inner.state = CoordinatorState::Started;
            inner.window = None;
            tracing::warn!(
                "dropped {}; continuing with {} connected clients",
                stragglers.display_bounded(10),
                inner.channels.len()
            );
        }
        self.on_started();
    }

    /// Runs the started-sequence: gate transition (retried until accepted),
    /// acks to every still-active client, listener notification, and one
    /// synthetic no-op through the apply pipeline.
    fn on_started(self: &Arc<Self>) {
        if self.gate.allow_client_admission() {
            self.finish_started();
            return;
        }

        let retry = self.config.gate_retry_interval();
        tracing::warn!(
            "consistency gate refused client admission; retrying every {:?}",
            retry
        );

        let generation = self.inner.lock().unwrap().generation;
        let this = self.clone();
        tokio::spawn(
            async move {
                loop {
                    tokio::time::sleep(retry).await;
                    {
                        let inner = this.inner.lock().unwrap();
                        if inner.generation != generation {
                            return;
                        }
                    }
                    if this.gate.allow_client_admission() {
                        break;
                    }
                    tracing::warn!("consistency gate still refusing client admission; will retry");
                }
                this.finish_started();
            }
            .instrument(tracing::span!(Level::DEBUG, "gate-retry")),
        );
    }

    fn finish_started(&self) {
        let listeners = {
            let mut inner = self.inner.lock().unwrap();
            if inner.state != CoordinatorState::Started {
                return;
            }

            let ack = self.ack_locked(&inner);
            let pending: Vec<ClientId> = inner
                .channels
                .keys()
                .copied()
                .filter(|c| !inner.acked.contains(c))
                .collect();
            for client in &pending {
                if let Some(channel) = inner.channels.get(client) {
                    channel.send_ack(&ack);
                }
                inner.acked.insert(*client);
            }
            tracing::info!("handshake acknowledged {} clients", pending.len());
            inner.listeners.clone()
        };

        for listener in &listeners {
            listener.on_reconnect_complete();
        }
        self.sink.enqueue_noop();
    }
}
