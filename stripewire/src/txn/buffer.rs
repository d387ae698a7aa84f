use std::collections::BTreeSet;

use crate::codec::Mark;
use crate::codec::WireBuffer;
use crate::txn::record::ManagedObject;
use crate::txn::record::TransactionRecord;
use crate::types::ObjectId;
use crate::types::SequenceId;
use crate::types::TransactionId;

/// Serializes one transaction's header and per-object change sections into a
/// byte stream.
///
/// Header layout, in order: transaction id (8), lock-type tag (1),
/// change-count placeholder (4, patched), sequence id (8), eviction flag (1),
/// lock count + locks, new-root count + (name, object id) pairs, notify
/// count + notifies, a length-prefixed trailer reserved for
/// replication-topology metadata, and an object-count placeholder (4,
/// patched). Change sections follow the header. The two placeholders are
/// back-filled through marks when the buffer is sealed, so encoding stays
/// single-pass.
pub struct TransactionBuffer {
    id: TransactionId,
    sequence: SequenceId,

    buf: WireBuffer,

    header_written: bool,
    sealed: bool,

    change_count_mark: Option<Mark>,
    object_count_mark: Option<Mark>,
    change_count: u32,
    written_objects: BTreeSet<ObjectId>,

    /// Writers currently holding this buffer. Recycling is deferred while
    /// nonzero.
    outstanding: u32,
    recycle_pending: bool,
}

impl TransactionBuffer {
    pub(crate) fn new(id: TransactionId, sequence: SequenceId) -> Self {
        assert!(!id.is_null(), "transaction id must not be null");
        assert!(!sequence.is_null(), "sequence id of transaction {} must not be null", id);

        Self {
            id,
            sequence,
            buf: WireBuffer::new(),
            header_written: false,
            sealed: false,
            change_count_mark: None,
            object_count_mark: None,
            change_count: 0,
            written_objects: BTreeSet::new(),
            outstanding: 0,
            recycle_pending: false,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn sequence(&self) -> SequenceId {
        self.sequence
    }

    /// Serializes the header on the first call, then appends a change
    /// section per object in the record.
    pub(crate) fn write(&mut self, txn: &TransactionRecord) {
        assert_eq!(self.id, txn.id, "record {} routed to buffer of transaction {}", txn.id, self.id);
        assert!(!self.sealed, "transaction {} already committed", self.id);

        if !self.header_written {
            self.write_header(txn);
            self.header_written = true;
        }

        for change in &txn.changes {
            self.write_change(change.as_ref());
        }
    }

    fn write_header(&mut self, txn: &TransactionRecord) {
        self.buf.put_u64(self.id.0);
        self.buf.put_u8(txn.kind.wire_tag());
        self.change_count_mark = Some(self.buf.reserve_u32());
        self.buf.put_u64(self.sequence.0);
        self.buf.put_bool(txn.eviction);

        self.buf.put_u32(txn.locks.len() as u32);
        for lock in &txn.locks {
            lock.encode(&mut self.buf);
        }

        self.buf.put_u32(txn.new_roots.len() as u32);
        for (name, oid) in &txn.new_roots {
            self.buf.put_str(name);
            self.buf.put_u64(oid.0);
        }

        self.buf.put_u32(txn.notifies.len() as u32);
        for notify in &txn.notifies {
            notify.encode(&mut self.buf);
        }

        // Extensible trailer; empty until replication-topology metadata
        // starts travelling with transactions.
        self.buf.put_bytes(&[]);

        self.object_count_mark = Some(self.buf.reserve_u32());
    }

    /// Appends one object's change section: object id, new-object flag, then
    /// a length-prefixed payload holding either a full dehydration or a
    /// delta.
    fn write_change(&mut self, object: &dyn ManagedObject) {
        let oid = object.object_id();
        let inserted = self.written_objects.insert(oid);
        assert!(
            inserted,
            "duplicate change writer for object {} in transaction {}",
            oid, self.id
        );

        self.buf.put_u64(oid.0);

        let is_new = object.is_new();
        self.buf.put_bool(is_new);

        let len_mark = self.buf.reserve_u32();
        let start = self.buf.len();
        if is_new {
            object.dehydrate(&mut self.buf);
            object.mark_dehydrated();
        } else {
            object.write_delta(&mut self.buf);
        }
        let payload_len = self.buf.len() - start;
        self.buf.patch_u32(len_mark, payload_len as u32);

        self.change_count += 1;
    }

    /// Back-fills the header counts. Idempotent; called when the owning
    /// batch commits.
    pub(crate) fn seal(&mut self) {
        if self.sealed {
            return;
        }
        assert!(self.header_written, "transaction {} committed without any write", self.id);

        let change_count_mark = self.change_count_mark.take().expect("header mark retained");
        let object_count_mark = self.object_count_mark.take().expect("header mark retained");
        self.buf.patch_u32(change_count_mark, self.change_count);
        self.buf.patch_u32(object_count_mark, self.written_objects.len() as u32);
        self.sealed = true;
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        self.buf.as_slice()
    }

    pub(crate) fn acquire_holder(&mut self) {
        self.outstanding += 1;
    }

    pub(crate) fn release_holder(&mut self) {
        assert!(self.outstanding > 0, "holder released twice on transaction {}", self.id);
        self.outstanding -= 1;
        if self.outstanding == 0 && self.recycle_pending {
            self.free();
        }
    }

    pub(crate) fn outstanding(&self) -> u32 {
        self.outstanding
    }

    /// Releases the backing storage, or records the request for the last
    /// holder to honor if a write is still outstanding.
    pub(crate) fn recycle(&mut self) {
        if self.outstanding > 0 {
            self.recycle_pending = true;
            return;
        }
        self.free();
    }

    fn free(&mut self) {
        tracing::trace!("recycling buffer of transaction {}", self.id);
        self.buf.release();
        self.recycle_pending = false;
    }
}
