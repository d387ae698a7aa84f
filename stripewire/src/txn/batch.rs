use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::thread::ThreadId;

use crate::codec::WireBuffer;
use crate::txn::buffer::TransactionBuffer;
use crate::txn::record::TransactionRecord;
use crate::types::BatchId;
use crate::types::SequenceId;
use crate::types::TransactionId;

/// One or more transactions sharing a batch id, sent to the server as a
/// single network write.
///
/// The batch is write-once: after `data()` has been called no further
/// transaction may be added. Transactions are serialized in the order they
/// were added and are replayed server-side in that same order. Outbound
/// bytes are owned exclusively by the batch until `recycle()`.
///
/// All writes go through one owning worker; the first writer thread claims
/// ownership and debug builds assert every later write comes from it.
pub struct ClientTransactionBatch {
    batch_id: BatchId,
    owner: OnceLock<ThreadId>,
    inner: Mutex<BatchInner>,
    holders_done: Condvar,
}

struct BatchInner {
    /// Insertion-ordered; a transaction id appears at most once.
    txns: Vec<TransactionBuffer>,

    /// Buffers detached by `remove_transaction` while a writer was still
    /// outstanding; recycled when their last holder releases.
    detached: Vec<TransactionBuffer>,

    committed: bool,
    recycled: bool,
    contains_sync_write: bool,

    /// Live [`TxnWriter`]s across all transactions in this batch.
    holders: usize,
    recycle_pending: bool,
}

impl ClientTransactionBatch {
    pub fn new(batch_id: BatchId) -> Self {
        Self {
            batch_id,
            owner: OnceLock::new(),
            inner: Mutex::new(BatchInner {
                txns: Vec::new(),
                detached: Vec::new(),
                committed: false,
                recycled: false,
                contains_sync_write: false,
                holders: 0,
                recycle_pending: false,
            }),
            holders_done: Condvar::new(),
        }
    }

    /// Registers a transaction under this batch and returns its writer.
    ///
    /// Panics if the batch was already committed or recycled, or if the
    /// transaction id is already registered.
    pub fn add_transaction(&self, txn: &TransactionRecord) -> TxnWriter<'_> {
        self.assert_owner();

        let mut inner = self.inner.lock().unwrap();
        assert!(!inner.committed, "transaction batch {} already committed", self.batch_id);
        assert!(!inner.recycled, "transaction batch {} already recycled", self.batch_id);
        assert!(
            inner.txns.iter().all(|t| t.id() != txn.id),
            "transaction {} already registered in batch {}",
            txn.id,
            self.batch_id
        );

        let mut buffer = TransactionBuffer::new(txn.id, txn.sequence);
        buffer.acquire_holder();
        inner.txns.push(buffer);
        inner.contains_sync_write |= txn.sync_write;
        inner.holders += 1;

        TxnWriter {
            batch: self,
            id: txn.id,
        }
    }

    /// The batch identity. Blocks until every in-flight writer has
    /// released, so the id is never observed for a batch still being
    /// mutated.
    pub fn batch_id(&self) -> BatchId {
        let mut inner = self.inner.lock().unwrap();
        while inner.holders > 0 {
            inner = self.holders_done.wait(inner).unwrap();
        }
        self.batch_id
    }

    /// Marks the batch committed and returns the outbound bytes: the batch
    /// header followed by every transaction's header and changes in
    /// insertion order.
    ///
    /// Idempotent per outstanding send: each call yields an independently
    /// usable copy.
    pub fn data(&self) -> Vec<u8> {
        let mut inner = self.inner.lock().unwrap();
        assert!(!inner.recycled, "transaction batch {} already recycled", self.batch_id);

        inner.committed = true;
        for buffer in &mut inner.txns {
            buffer.seal();
        }

        let mut out = WireBuffer::with_capacity(
            17 + inner.txns.iter().map(|t| t.bytes().len()).sum::<usize>(),
        );
        out.put_i64(self.batch_id.0 as i64);
        out.put_i32(inner.txns.len() as i32);
        out.put_bool(inner.contains_sync_write);
        for buffer in &inner.txns {
            out.put_raw(buffer.bytes());
        }
        out.into_bytes()
    }

    /// Detaches an acknowledged transaction and recycles its buffer, unless
    /// a writer is still outstanding, in which case recycling happens when
    /// the writer releases.
    ///
    /// Returns true when the batch holds no further transactions. Panics if
    /// the id is unknown.
    pub fn remove_transaction(&self, id: TransactionId) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let pos = inner
            .txns
            .iter()
            .position(|t| t.id() == id)
            .unwrap_or_else(|| panic!("removing unknown transaction {} from batch {}", id, self.batch_id));

        let mut buffer = inner.txns.remove(pos);
        buffer.recycle();
        if buffer.outstanding() > 0 {
            inner.detached.push(buffer);
        }
        inner.txns.is_empty()
    }

    /// Releases all backing storage. A no-op retried by the last holder if
    /// writers are still in flight.
    pub fn recycle(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.holders > 0 {
            inner.recycle_pending = true;
            tracing::debug!(
                "deferring recycle of batch {}: {} writers outstanding",
                self.batch_id,
                inner.holders
            );
            return;
        }
        inner.recycle_now();
    }

    /// The minimum in-flight sequence id across live transactions; what the
    /// server may safely discard below on restart is derived from this.
    pub fn min_sequence(&self) -> Option<SequenceId> {
        let inner = self.inner.lock().unwrap();
        inner.txns.iter().map(|t| t.sequence()).min()
    }

    pub fn transaction_ids(&self) -> Vec<TransactionId> {
        let inner = self.inner.lock().unwrap();
        inner.txns.iter().map(|t| t.id()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().txns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().txns.len()
    }

    /// The new-object flag flip inside change sections is unsynchronized;
    /// it is sound only while a single worker writes the batch.
    fn assert_owner(&self) {
        if cfg!(debug_assertions) {
            let current = std::thread::current().id();
            let owner = *self.owner.get_or_init(|| current);
            assert_eq!(
                owner, current,
                "batch {} written from a thread other than its owning worker",
                self.batch_id
            );
        }
    }
}

impl BatchInner {
    fn recycle_now(&mut self) {
        for buffer in &mut self.txns {
            buffer.recycle();
        }
        self.txns.clear();
        self.detached.clear();
        self.recycled = true;
        self.recycle_pending = false;
    }
}

/// Writer handle for one transaction inside a batch.
///
/// Holding it counts as an outstanding write: the batch defers recycling and
/// `batch_id()` waits until all writers release.
pub struct TxnWriter<'a> {
    batch: &'a ClientTransactionBatch,
    id: TransactionId,
}

impl TxnWriter<'_> {
    /// Serializes the record: the full header on the first write, appended
    /// change sections afterwards.
    pub fn write(&mut self, txn: &TransactionRecord) {
        self.batch.assert_owner();
        assert_eq!(self.id, txn.id, "writer for transaction {} given record of {}", self.id, txn.id);

        let mut inner = self.batch.inner.lock().unwrap();
        let buffer = inner
            .txns
            .iter_mut()
            .find(|t| t.id() == self.id)
            .unwrap_or_else(|| {
                panic!(
                    "transaction {} was removed from batch {} while its writer was live",
                    self.id, self.batch.batch_id
                )
            });
        buffer.write(txn);
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.id
    }
}

impl Drop for TxnWriter<'_> {
    fn drop(&mut self) {
        let mut inner = self.batch.inner.lock().unwrap();

        if let Some(buffer) = inner.txns.iter_mut().find(|t| t.id() == self.id) {
            buffer.release_holder();
        } else if let Some(pos) = inner.detached.iter().position(|t| t.id() == self.id) {
            inner.detached[pos].release_holder();
            if inner.detached[pos].outstanding() == 0 {
                inner.detached.remove(pos);
            }
        }

        inner.holders -= 1;
        if inner.holders == 0 {
            if inner.recycle_pending {
                inner.recycle_now();
            }
            self.batch.holders_done.notify_all();
        }
    }
}
