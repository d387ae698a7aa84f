use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::Instrument;
use tracing::Level;

use crate::config::Config;
use crate::display_ext::DisplayBoundedExt;
use crate::error::RequestError;
use crate::voter::address::HostPort;
use crate::voter::heartbeat::HeartbeatWorker;
use crate::voter::heartbeat::WorkerHandle;
use crate::voter::protocol::ConnectionFactory;
use crate::voter::protocol::MemberClient;

/// One voter process's agent: owns the tracked member set and the heartbeat
/// task per member, and periodically re-derives the topology.
pub struct VoterAgent {
    voter_id: String,
    config: Arc<Config>,
    factory: Arc<dyn ConnectionFactory>,

    /// Keyed by member address; exactly one live worker per tracked member.
    workers: Mutex<BTreeMap<HostPort, WorkerHandle>>,
}

/// Handle owning the agent's topology-refresh task; dropping it stops the
/// refresh loop (tracked members keep heartbeating until the agent itself is
/// dropped or reconciled away).
pub struct AgentHandle {
    _shutdown_tx: oneshot::Sender<()>,
    _join: JoinHandle<()>,
}

impl VoterAgent {
    pub fn new(voter_id: impl ToString, config: Arc<Config>, factory: Arc<dyn ConnectionFactory>) -> Arc<Self> {
        Arc::new(Self {
            voter_id: voter_id.to_string(),
            config,
            factory,
            workers: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn voter_id(&self) -> &str {
        &self.voter_id
    }

    fn client_for(&self, target: &HostPort) -> MemberClient {
        MemberClient::new(
            target.clone(),
            self.factory.connect(target),
            self.config.request_timeout(),
        )
    }

    /// Reconciles the tracked set against a freshly derived topology.
    ///
    /// Members already tracked keep their worker; new members get one
    /// spawned; departed members have theirs cancelled and removed. After
    /// this returns, the live worker count equals the topology's
    /// cardinality. Idempotent, and indifferent to whether the member that
    /// answered the topology query lists itself.
    pub fn reconcile(&self, topology: BTreeSet<HostPort>) {
        let mut workers = self.workers.lock().unwrap();

        let mut next = BTreeMap::new();
        for target in topology {
            let handle = match workers.remove(&target) {
                Some(existing) => existing,
                None => {
                    tracing::info!("tracking new stripe member {}", target);
                    HeartbeatWorker::spawn(
                        self.voter_id.clone(),
                        target.clone(),
                        self.client_for(&target),
                        self.config.voter_heartbeat_interval(),
                    )
                }
            };
            next.insert(target, handle);
        }

        // Whatever is left was not in the new topology; dropping the handle
        // cancels its worker.
        let departed = std::mem::replace(&mut *workers, next);
        for (target, _handle) in departed {
            tracing::info!("member {} left the topology; cancelling its heartbeat", target);
        }
    }

    pub fn tracked(&self) -> BTreeSet<HostPort> {
        self.workers.lock().unwrap().keys().cloned().collect()
    }

    /// Whether the member currently answers heartbeats. `None` when the
    /// member is not tracked at all.
    pub fn is_reachable(&self, target: &HostPort) -> Option<bool> {
        let workers = self.workers.lock().unwrap();
        workers
            .get(target)
            .map(|w| w.reachable.load(std::sync::atomic::Ordering::Relaxed))
    }

    /// Queries any currently reachable member for the full member set and
    /// reconciles against it. Returns false when nobody answered.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn refresh_topology(&self) -> bool {
        // Prefer members that were answering heartbeats at last look.
        let mut candidates: Vec<(HostPort, bool)> = {
            let workers = self.workers.lock().unwrap();
            workers
                .iter()
                .map(|(t, w)| (t.clone(), w.reachable.load(std::sync::atomic::Ordering::Relaxed)))
                .collect()
        };
        candidates.sort_by_key(|(_, reachable)| !*reachable);

        for (target, _) in candidates {
            let client = self.client_for(&target);
            match client.topology().await {
                Ok(members) => {
                    let mut parsed = BTreeSet::new();
                    for member in &members {
                        match member.parse::<HostPort>() {
                            Ok(hp) => {
                                parsed.insert(hp);
                            }
                            Err(e) => {
                                tracing::warn!("{} reported a bad member address: {}", target, e)
                            }
                        }
                    }
                    let listing: Vec<HostPort> = parsed.iter().cloned().collect();
                    tracing::debug!(
                        "topology from {}: {} members {}",
                        target,
                        listing.len(),
                        listing.display_bounded(8)
                    );
                    self.reconcile(parsed);
                    return true;
                }
                Err(e) => {
                    tracing::debug!("topology query to {} failed: {}", target, e);
                }
            }
        }

        tracing::warn!("topology refresh failed: no tracked member answered");
        false
    }

    /// Operator escape hatch: force `target` to treat itself as active,
    /// bypassing the heartbeat/vote protocol entirely.
    pub async fn override_vote(&self, target: &HostPort) -> Result<bool, RequestError> {
        self.client_for(target).override_vote(&self.voter_id).await
    }

    /// Best-effort deregistration from every tracked member, for shutdown.
    pub async fn deregister_all(&self) {
        let targets = self.tracked();
        for target in targets {
            match self.client_for(&target).deregister_voter(&self.voter_id).await {
                Ok(true) => tracing::info!("deregistered from {}", target),
                Ok(false) => tracing::warn!("{} did not know this voter", target),
                Err(e) => tracing::warn!("deregistration from {} failed: {}", target, e),
            }
        }
    }

    /// Starts the periodic topology refresh.
    pub fn start(self: &Arc<Self>) -> AgentHandle {
        let this = self.clone();
        let interval = self.config.topology_refresh_interval();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let join = tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        biased;
                        _ = &mut shutdown_rx => {
                            tracing::debug!("topology refresh stopped");
                            return;
                        }
                        _ = tokio::time::sleep(interval) => {}
                    }
                    this.refresh_topology().await;
                }
            }
            .instrument(tracing::span!(Level::DEBUG, "topology-refresh")),
        );

        AgentHandle {
            _shutdown_tx: shutdown_tx,
            _join: join,
        }
    }
}
