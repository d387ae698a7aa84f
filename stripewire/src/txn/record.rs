use std::sync::Arc;

use crate::codec::WireBuffer;
use crate::types::LockId;
use crate::types::Notify;
use crate::types::ObjectId;
use crate::types::SequenceId;
use crate::types::TransactionId;
use crate::types::TransactionKind;

/// A replicated object as seen by the batch writer: an identity, a
/// new-object flag, and the ability to serialize itself either fully or as a
/// delta.
///
/// How mutations were intercepted is outside this crate; by the time an
/// object reaches the writer its change set is already computed.
pub trait ManagedObject: Send + Sync {
    fn object_id(&self) -> ObjectId;

    /// True until the object's first full serialization has been captured
    /// into a batch.
    fn is_new(&self) -> bool;

    /// Clears the new-object flag. The batch writer calls this at most once
    /// per object, from the batch's owning thread.
    fn mark_dehydrated(&self);

    /// Serializes the object's complete state.
    fn dehydrate(&self, out: &mut WireBuffer);

    /// Serializes the object's pending mutations.
    fn write_delta(&self, out: &mut WireBuffer);
}

/// One client transaction, ready to be captured into a batch.
#[derive(Clone)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub sequence: SequenceId,
    pub kind: TransactionKind,

    /// The server must not acknowledge the batch before this transaction is
    /// durable.
    pub sync_write: bool,

    /// Set when the transaction was produced by cache eviction rather than
    /// application code.
    pub eviction: bool,

    pub locks: Vec<LockId>,
    pub new_roots: Vec<(String, ObjectId)>,
    pub notifies: Vec<Notify>,

    pub changes: Vec<Arc<dyn ManagedObject>>,
}

impl TransactionRecord {
    pub fn new(id: TransactionId, sequence: SequenceId, kind: TransactionKind) -> Self {
        Self {
            id,
            sequence,
            kind,
            sync_write: false,
            eviction: false,
            locks: Vec::new(),
            new_roots: Vec::new(),
            notifies: Vec::new(),
            changes: Vec::new(),
        }
    }
}
