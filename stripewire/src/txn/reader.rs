//! The read side of the batch wire format.
//!
//! Consumes counts, lock ids, new roots, notifies, then per-object change
//! sections, in exactly the order the write side emits them. Used by the
//! handshake replay path and by anything that needs to inspect an outbound
//! batch.

use crate::codec::CodecError;
use crate::codec::WireReader;
use crate::types::BatchId;
use crate::types::LockId;
use crate::types::Notify;
use crate::types::ObjectId;
use crate::types::SequenceId;
use crate::types::TransactionId;
use crate::types::TransactionKind;

/// One object's mutations within a parsed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedChange {
    pub object_id: ObjectId,
    /// Set when the payload is a full dehydration rather than a delta.
    pub new_object: bool,
    pub data: Vec<u8>,
}

/// One transaction decoded from a batch, ready for the apply path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTransaction {
    pub id: TransactionId,
    pub sequence: SequenceId,
    pub kind: TransactionKind,
    pub eviction: bool,
    pub locks: Vec<LockId>,
    pub new_roots: Vec<(String, ObjectId)>,
    pub notifies: Vec<Notify>,
    pub trailer: Vec<u8>,
    pub changes: Vec<ParsedChange>,
}

/// A fully decoded batch, transactions in the order they were added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBatch {
    pub batch_id: BatchId,
    pub contains_sync_write: bool,
    pub transactions: Vec<ParsedTransaction>,
}

pub fn read_batch(bytes: &[u8]) -> Result<ParsedBatch, CodecError> {
    let mut r = WireReader::new(bytes);

    let raw_id = r.get_i64()?;
    if raw_id < 0 {
        return Err(CodecError::ReservedValue { what: "batch id" });
    }
    let batch_id = BatchId(raw_id as u64);

    let count = r.get_i32()?;
    if count < 0 {
        return Err(CodecError::ReservedValue {
            what: "transaction count",
        });
    }
    let contains_sync_write = r.get_bool()?;

    let mut transactions = Vec::with_capacity(count as usize);
    for _ in 0..count {
        transactions.push(read_transaction(&mut r)?);
    }
    r.expect_end()?;

    Ok(ParsedBatch {
        batch_id,
        contains_sync_write,
        transactions,
    })
}

fn read_transaction(r: &mut WireReader<'_>) -> Result<ParsedTransaction, CodecError> {
    let raw_id = r.get_u64()?;
    if raw_id == 0 {
        return Err(CodecError::ReservedValue {
            what: "transaction id",
        });
    }
    let id = TransactionId(raw_id);

    let kind_tag = r.get_u8()?;
    let kind = TransactionKind::from_wire_tag(kind_tag).ok_or(CodecError::InvalidTag {
        what: "transaction kind",
        tag: kind_tag,
    })?;

    let change_count = r.get_u32()?;

    let raw_sequence = r.get_u64()?;
    if raw_sequence == 0 {
        return Err(CodecError::ReservedValue { what: "sequence id" });
    }
    let sequence = SequenceId(raw_sequence);

    let eviction = r.get_bool()?;

    let lock_count = r.get_u32()?;
    let mut locks = Vec::with_capacity(lock_count as usize);
    for _ in 0..lock_count {
        locks.push(LockId::decode(r)?);
    }

    let root_count = r.get_u32()?;
    let mut new_roots = Vec::with_capacity(root_count as usize);
    for _ in 0..root_count {
        let name = r.get_string()?;
        new_roots.push((name, ObjectId(r.get_u64()?)));
    }

    let notify_count = r.get_u32()?;
    let mut notifies = Vec::with_capacity(notify_count as usize);
    for _ in 0..notify_count {
        notifies.push(Notify::decode(r)?);
    }

    let trailer = r.get_bytes()?;

    let object_count = r.get_u32()?;
    if object_count != change_count {
        return Err(CodecError::CountMismatch {
            what: "transaction changes",
            expected: change_count,
            got: object_count,
        });
    }

    let mut changes = Vec::with_capacity(object_count as usize);
    for _ in 0..object_count {
        let object_id = ObjectId(r.get_u64()?);
        let new_object = r.get_bool()?;
        let data = r.get_bytes()?;
        changes.push(ParsedChange {
            object_id,
            new_object,
            data,
        });
    }

    Ok(ParsedTransaction {
        id,
        sequence,
        kind,
        eviction,
        locks,
        new_roots,
        notifies,
        trailer,
        changes,
    })
}
