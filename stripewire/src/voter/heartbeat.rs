use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::Instrument;
use tracing::Level;

use crate::voter::address::HostPort;
use crate::voter::protocol::MemberClient;
use crate::voter::protocol::VoterResponse;

/// A dedicated worker heartbeating one stripe member.
///
/// Registers the voter once, then heartbeats on the configured interval. A
/// failed or timed-out heartbeat only marks the member unreachable for
/// voting; dropping the member is the topology refresh's decision. A
/// positive heartbeat token is an election term and is answered with a vote.
pub(crate) struct HeartbeatWorker {
    pub(crate) voter_id: String,
    pub(crate) target: HostPort,
    pub(crate) client: MemberClient,
    pub(crate) interval: Duration,
    pub(crate) reachable: Arc<AtomicBool>,
}

/// Handle owning one worker task. Dropping it stops the worker: the oneshot
/// sender closes and the select loop observes it, so cancellation never
/// races a tick already executing.
pub(crate) struct WorkerHandle {
    pub(crate) reachable: Arc<AtomicBool>,
    _shutdown_tx: oneshot::Sender<()>,
    _join: JoinHandle<()>,
}

impl HeartbeatWorker {
    pub(crate) fn spawn(
        voter_id: String,
        target: HostPort,
        client: MemberClient,
        interval: Duration,
    ) -> WorkerHandle {
        let reachable = Arc::new(AtomicBool::new(false));
        let worker = HeartbeatWorker {
            voter_id,
            target: target.clone(),
            client,
            interval,
            reachable: reachable.clone(),
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let span = tracing::span!(Level::DEBUG, "heartbeat", target = %target);
        let join = tokio::spawn(worker.run(shutdown_rx).instrument(span));

        WorkerHandle {
            reachable,
            _shutdown_tx: shutdown_tx,
            _join: join,
        }
    }

    async fn run(self, mut shutdown_rx: oneshot::Receiver<()>) {
        // Register once; keep trying while the member is down.
        loop {
            match self.client.register_voter(&self.voter_id).await {
                Ok(VoterResponse::Token(term)) => {
                    tracing::info!("registered voter with {}, current term {}", self.target, term);
                    break;
                }
                Ok(VoterResponse::Invalid) => {
                    tracing::warn!("{} rejected voter registration; will retry", self.target);
                }
                Err(e) => {
                    tracing::warn!("voter registration with {} failed: {}", self.target, e);
                }
            }
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => return,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        self.reachable.store(true, Ordering::Relaxed);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => {
                    tracing::debug!("heartbeat task for {} cancelled", self.target);
                    return;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }

            match self.client.heartbeat(&self.voter_id).await {
                Ok(VoterResponse::Token(term)) if term > 0 => {
                    self.reachable.store(true, Ordering::Relaxed);
                    tracing::info!("{} is holding an election, term {}; casting vote", self.target, term);
                    match self.client.vote(&self.voter_id, term).await {
                        Ok(VoterResponse::Token(_)) => {
                            tracing::info!("vote for term {} accepted by {}", term, self.target)
                        }
                        Ok(VoterResponse::Invalid) => {
                            tracing::warn!("vote for term {} rejected by {}", term, self.target)
                        }
                        Err(e) => tracing::warn!("vote against {} failed: {}", self.target, e),
                    }
                }
                Ok(VoterResponse::Token(_)) => {
                    self.reachable.store(true, Ordering::Relaxed);
                }
                Ok(VoterResponse::Invalid) => {
                    self.reachable.store(false, Ordering::Relaxed);
                    tracing::warn!("{} no longer recognizes this voter", self.target);
                }
                Err(e) => {
                    self.reachable.store(false, Ordering::Relaxed);
                    tracing::warn!("heartbeat to {} failed: {}", self.target, e);
                }
            }
        }
    }
}
