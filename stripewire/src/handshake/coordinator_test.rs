use std::collections::BTreeSet;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use maplit::btreeset;
use pretty_assertions::assert_eq;

use crate::error::MissingEntity;
use crate::error::ReconnectError;
use crate::handshake::ApplySink;
use crate::handshake::ChannelCloser;
use crate::handshake::ClientChannel;
use crate::handshake::ClientHandshake;
use crate::handshake::ClientInfo;
use crate::handshake::ConsistencyGate;
use crate::handshake::CoordinatorState;
use crate::handshake::EntityResolver;
use crate::handshake::HandshakeAck;
use crate::handshake::HandshakeCoordinator;
use crate::handshake::Permissive;
use crate::handshake::ReconnectListener;
use crate::handshake::ReconnectReference;
use crate::txn::ClientTransactionBatch;
use crate::txn::ParsedTransaction;
use crate::txn::TransactionRecord;
use crate::types::BatchId;
use crate::types::ClientId;
use crate::types::SequenceId;
use crate::types::TransactionId;
use crate::types::TransactionKind;
use crate::Config;

#[derive(Default)]
struct MockChannel {
    acks: Mutex<Vec<HandshakeAck>>,
    closed: AtomicUsize,
}

impl MockChannel {
    fn ack_count(&self) -> usize {
        self.acks.lock().unwrap().len()
    }
}

impl ClientChannel for MockChannel {
    fn send_ack(&self, ack: &HandshakeAck) {
        self.acks.lock().unwrap().push(ack.clone());
    }

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Default)]
struct RecordingSink {
    applied: Mutex<Vec<TransactionId>>,
    noops: AtomicUsize,
}

impl ApplySink for RecordingSink {
    fn apply(&self, txn: ParsedTransaction) {
        self.applied.lock().unwrap().push(txn.id);
    }

    fn enqueue_noop(&self) {
        self.noops.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Default)]
struct RecordingCloser {
    closed: Mutex<Vec<ClientId>>,
}

impl ChannelCloser for RecordingCloser {
    fn force_close(&self, client: ClientId) {
        self.closed.lock().unwrap().push(client);
    }
}

struct OkResolver;

impl EntityResolver for OkResolver {
    fn resolve(&self, _client: ClientId, _reference: &ReconnectReference) -> Result<(), MissingEntity> {
        Ok(())
    }
}

struct FailingResolver;

impl EntityResolver for FailingResolver {
    fn resolve(&self, client: ClientId, reference: &ReconnectReference) -> Result<(), MissingEntity> {
        Err(MissingEntity {
            client,
            entity_id: reference.entity_id,
            client_instance: reference.client_instance,
        })
    }
}

#[derive(Default)]
struct CountingListener {
    completions: AtomicUsize,
}

impl ReconnectListener for CountingListener {
    fn on_reconnect_complete(&self) {
        self.completions.fetch_add(1, Ordering::Relaxed);
    }
}

/// Rejects admission a fixed number of times, then allows it.
struct FlakyGate {
    rejections_left: AtomicUsize,
}

impl FlakyGate {
    fn new(rejections: usize) -> Self {
        Self {
            rejections_left: AtomicUsize::new(rejections),
        }
    }
}

impl ConsistencyGate for FlakyGate {
    fn allow_client_admission(&self) -> bool {
        self.rejections_left
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |left| left.checked_sub(1))
            .is_err()
    }
}

struct Fixture {
    coordinator: Arc<HandshakeCoordinator>,
    sink: Arc<RecordingSink>,
    closer: Arc<RecordingCloser>,
    listener: Arc<CountingListener>,
}

fn fixture_full(
    gate: Arc<dyn ConsistencyGate>,
    resolver: Arc<dyn EntityResolver>,
    config: Config,
) -> Fixture {
    let config = Arc::new(config);
    let sink = Arc::new(RecordingSink::default());
    let closer = Arc::new(RecordingCloser::default());
    let listener = Arc::new(CountingListener::default());

    let coordinator = HandshakeCoordinator::new(
        config,
        "5.2.0",
        gate,
        resolver,
        sink.clone(),
        closer.clone(),
    );
    coordinator.add_listener(listener.clone());
    coordinator.set_active_nodes(btreeset! {1, 2});

    Fixture {
        coordinator,
        sink,
        closer,
        listener,
    }
}

fn fixture_with(gate: Arc<dyn ConsistencyGate>, resolver: Arc<dyn EntityResolver>) -> Fixture {
    fixture_full(gate, resolver, Config {
        reconnect_window: 60_000,
        reconnect_notice_interval: 10_000,
        gate_retry_interval: 20,
        ..Default::default()
    })
}

fn fixture() -> Fixture {
    fixture_with(Arc::new(Permissive), Arc::new(OkResolver))
}

/// A window short enough for the paused-clock timer tests to run out.
fn short_window_fixture() -> Fixture {
    fixture_full(Arc::new(Permissive), Arc::new(OkResolver), Config {
        reconnect_window: 100,
        reconnect_notice_interval: 30,
        gate_retry_interval: 20,
        ..Default::default()
    })
}

fn handshake(id: u64) -> ClientHandshake {
    ClientHandshake::new(ClientId(id), ClientInfo::default())
}

fn resent_batch(txn_ids: &[(u64, u64)]) -> Vec<u8> {
    let batch = ClientTransactionBatch::new(BatchId(1));
    for (id, seq) in txn_ids {
        let txn = TransactionRecord::new(
            TransactionId(*id),
            SequenceId(*seq),
            TransactionKind::Normal,
        );
        batch.add_transaction(&txn).write(&txn);
    }
    batch.data()
}

#[tokio::test]
async fn test_fresh_start_admits_immediately() -> anyhow::Result<()> {
    let f = fixture();

    f.coordinator.set_starting(BTreeSet::new());
    assert_eq!(CoordinatorState::Started, f.coordinator.state());
    assert_eq!(1, f.listener.completions.load(Ordering::Relaxed));
    assert_eq!(1, f.sink.noops.load(Ordering::Relaxed));

    let channel = Arc::new(MockChannel::default());
    f.coordinator.notify_client_connect(handshake(5), channel.clone())?;

    assert_eq!(1, channel.ack_count());
    let ack = channel.acks.lock().unwrap()[0].clone();
    assert_eq!(btreeset! {1, 2}, ack.active_nodes);
    assert_eq!("5.2.0", ack.server_version);
    assert_eq!(btreeset! {ClientId(5)}, f.coordinator.connected_clients());
    Ok(())
}

#[tokio::test]
async fn test_reconnect_completeness() -> anyhow::Result<()> {
    let f = fixture();
    f.coordinator.set_starting(btreeset! {ClientId(1), ClientId(2), ClientId(3)});
    assert_eq!(CoordinatorState::Starting, f.coordinator.state());

    let channels: Vec<Arc<MockChannel>> =
        (0..3).map(|_| Arc::new(MockChannel::default())).collect();

    // Arrival order differs from id order; the outcome must not care.
    for (id, channel) in [(2u64, &channels[1]), (3, &channels[2]), (1, &channels[0])] {
        f.coordinator.notify_client_connect(handshake(id), channel.clone())?;
    }

    assert_eq!(CoordinatorState::Started, f.coordinator.state());
    for channel in &channels {
        assert_eq!(1, channel.ack_count());
    }

    // Transitioned exactly once.
    assert_eq!(1, f.listener.completions.load(Ordering::Relaxed));
    assert_eq!(1, f.sink.noops.load(Ordering::Relaxed));
    assert!(f.closer.closed.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_reconnect_replays_resent_work_in_order() -> anyhow::Result<()> {
    let f = fixture();
    f.coordinator.set_starting(btreeset! {ClientId(9)});

    let mut hs = handshake(9);
    hs.reconnect_references = vec![ReconnectReference {
        entity_id: 4,
        client_instance: 1,
        payload: Vec::new(),
    }];
    hs.resent_batches = vec![resent_batch(&[(10, 1), (11, 2)]), resent_batch(&[(12, 3)])];

    let channel = Arc::new(MockChannel::default());
    f.coordinator.notify_client_connect(hs, channel.clone())?;

    assert_eq!(CoordinatorState::Started, f.coordinator.state());
    assert_eq!(
        vec![TransactionId(10), TransactionId(11), TransactionId(12)],
        f.sink.applied.lock().unwrap().clone()
    );
    assert_eq!(1, channel.ack_count());
    assert_eq!(1, f.sink.noops.load(Ordering::Relaxed));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_timeout_drops_stragglers() -> anyhow::Result<()> {
    let f = short_window_fixture();
    f.coordinator.set_starting(btreeset! {ClientId(1), ClientId(2)});

    let channel = Arc::new(MockChannel::default());
    f.coordinator.notify_client_connect(handshake(1), channel.clone())?;
    assert_eq!(CoordinatorState::Starting, f.coordinator.state());

    // Run past the 100ms window; ticks fire at the 30ms notice cap.
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(CoordinatorState::Started, f.coordinator.state());
    assert_eq!(vec![ClientId(2)], f.closer.closed.lock().unwrap().clone());
    assert_eq!(btreeset! {ClientId(1)}, f.coordinator.connected_clients());
    assert_eq!(1, channel.ack_count());
    assert_eq!(1, f.listener.completions.load(Ordering::Relaxed));
    Ok(())
}

#[tokio::test]
async fn test_diagnostic_connection_acked_in_any_state() -> anyhow::Result<()> {
    let f = fixture();

    let channel = Arc::new(MockChannel::default());
    let mut hs = handshake(7);
    hs.diagnostic = true;

    // Init: a replicating client would be an unexpected-state fault, a
    // diagnostic one is simply acknowledged and never tracked.
    f.coordinator.notify_client_connect(hs, channel.clone())?;
    assert_eq!(1, channel.ack_count());
    assert_eq!(CoordinatorState::Init, f.coordinator.state());
    assert!(f.coordinator.connected_clients().is_empty());
    Ok(())
}

#[tokio::test]
#[should_panic(expected = "while coordinator is in state init")]
async fn test_handshake_in_init_panics() {
    let f = fixture();
    let channel = Arc::new(MockChannel::default());
    let _ = f.coordinator.notify_client_connect(handshake(1), channel);
}

#[tokio::test]
#[should_panic(expected = "only valid in the initial state")]
async fn test_set_starting_twice_panics() {
    let f = fixture();
    f.coordinator.set_starting(btreeset! {ClientId(1)});
    f.coordinator.set_starting(btreeset! {ClientId(2)});
}

#[tokio::test]
async fn test_missing_entity_aborts_reconnect() -> anyhow::Result<()> {
    let f = fixture_with(Arc::new(Permissive), Arc::new(FailingResolver));
    f.coordinator.set_starting(btreeset! {ClientId(3)});

    let mut hs = handshake(3);
    hs.reconnect_references = vec![ReconnectReference {
        entity_id: 42,
        client_instance: 7,
        payload: Vec::new(),
    }];

    let channel = Arc::new(MockChannel::default());
    let err = f.coordinator.notify_client_connect(hs, channel.clone()).unwrap_err();

    assert_eq!(
        ReconnectError::MissingEntity(MissingEntity {
            client: ClientId(3),
            entity_id: 42,
            client_instance: 7,
        }),
        err
    );
    assert_eq!(1, channel.closed.load(Ordering::Relaxed));
    assert_eq!(0, channel.ack_count());
    assert_eq!(CoordinatorState::Starting, f.coordinator.state());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_gate_rejection_is_retried_until_accepted() -> anyhow::Result<()> {
    let f = fixture_with(Arc::new(FlakyGate::new(2)), Arc::new(OkResolver));
    f.coordinator.set_starting(btreeset! {ClientId(1)});

    let channel = Arc::new(MockChannel::default());
    f.coordinator.notify_client_connect(handshake(1), channel.clone())?;

    // Transitioned, but admission is still gated: no ack yet.
    assert_eq!(CoordinatorState::Started, f.coordinator.state());
    assert_eq!(0, channel.ack_count());
    assert_eq!(0, f.sink.noops.load(Ordering::Relaxed));

    // Two rejections at 20ms apart, then success.
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(1, channel.ack_count());
    assert_eq!(1, f.listener.completions.load(Ordering::Relaxed));
    assert_eq!(1, f.sink.noops.load(Ordering::Relaxed));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_stop_resets_and_cancels_window() -> anyhow::Result<()> {
    let f = short_window_fixture();
    f.coordinator.set_starting(btreeset! {ClientId(1)});
    assert_eq!(CoordinatorState::Starting, f.coordinator.state());

    f.coordinator.stop();
    assert_eq!(CoordinatorState::Init, f.coordinator.state());

    // The window must not fire after stop.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(f.closer.closed.lock().unwrap().is_empty());

    // The coordinator is reusable after a reset.
    f.coordinator.set_starting(BTreeSet::new());
    assert_eq!(CoordinatorState::Started, f.coordinator.state());
    Ok(())
}

#[tokio::test]
async fn test_client_report() -> anyhow::Result<()> {
    let f = fixture();
    f.coordinator.set_starting(BTreeSet::new());

    let mut hs = handshake(8);
    hs.info = ClientInfo {
        process_id: 700,
        uuid: "u-8".to_string(),
        name: "batch-loader".to_string(),
        version: "5.2.0".to_string(),
        revision: "deadbee".to_string(),
        remote_address: "10.1.2.3:40100".to_string(),
    };
    let expected = hs.info.clone();

    f.coordinator.notify_client_connect(hs, Arc::new(MockChannel::default()))?;

    let report = f.coordinator.client_report();
    assert_eq!(1, report.len());
    assert_eq!(Some(&expected), report.get(&ClientId(8)));
    Ok(())
}
