use std::collections::BTreeSet;
use std::sync::Mutex;

use crate::quorum::Majority;
use crate::quorum::QuorumSet;
use crate::types::NodeId;

/// The quorum/consistency check consulted before the server starts admitting
/// clients after a restart.
///
/// A minority partition must not accept writes, so the coordinator retries
/// this gate until it answers yes; implementations must be non-blocking.
pub trait ConsistencyGate: Send + Sync {
    fn allow_client_admission(&self) -> bool;
}

/// Always allows admission. Single-server deployments have no partition to
/// guard against.
pub struct Permissive;

impl ConsistencyGate for Permissive {
    fn allow_client_admission(&self) -> bool {
        true
    }
}

/// Admits clients only while a majority of the replica group is reachable.
pub struct QuorumGate {
    majority: Majority<NodeId>,
    reachable: Mutex<BTreeSet<NodeId>>,
}

impl QuorumGate {
    pub fn new(members: BTreeSet<NodeId>) -> Self {
        Self {
            majority: Majority::new(members),
            reachable: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn mark_reachable(&self, node: NodeId) {
        self.reachable.lock().unwrap().insert(node);
    }

    pub fn mark_unreachable(&self, node: NodeId) {
        self.reachable.lock().unwrap().remove(&node);
    }
}

impl ConsistencyGate for QuorumGate {
    fn allow_client_admission(&self) -> bool {
        let reachable = self.reachable.lock().unwrap();
        self.majority.is_quorum(reachable.iter())
    }
}

#[cfg(test)]
mod tests {
    use maplit::btreeset;

    use super::*;

    #[test]
    fn test_quorum_gate() {
        let gate = QuorumGate::new(btreeset! {1, 2, 3});
        assert!(!gate.allow_client_admission());

        gate.mark_reachable(1);
        assert!(!gate.allow_client_admission());

        gate.mark_reachable(2);
        assert!(gate.allow_client_admission());

        gate.mark_unreachable(2);
        assert!(!gate.allow_client_admission());
    }
}
