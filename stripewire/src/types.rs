//! Identifier types shared by the batch, handshake and voter subsystems.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::codec::CodecError;
use crate::codec::WireBuffer;
use crate::codec::WireReader;

/// A replica server's ID.
pub type NodeId = u64;

/// Identity of one committed client transaction.
///
/// Monotonically increasing per client; defines the total order of a client's
/// committed transactions. The zero value is reserved and must never be
/// serialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

impl TransactionId {
    pub const NULL: Self = Self(0);

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a transaction in a client's send stream.
///
/// Used to detect gaps and duplicates on resend, and to compute the minimum
/// in-flight sequence of a batch. Zero is reserved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceId(pub u64);

impl SequenceId {
    pub const NULL: Self = Self(0);

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identity of a replicated object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a batch of transactions sent to the server as one unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BatchId(pub u64);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one connected client channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lock discipline of a whole transaction; the one byte tag following the
/// transaction id on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Mutations made under ordinary exclusive locks.
    Normal,
    /// Mutations made under concurrent (non-exclusive) locking.
    Concurrent,
}

impl TransactionKind {
    pub(crate) fn wire_tag(&self) -> u8 {
        match self {
            TransactionKind::Normal => 0,
            TransactionKind::Concurrent => 1,
        }
    }

    pub(crate) fn from_wire_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(TransactionKind::Normal),
            1 => Some(TransactionKind::Concurrent),
            _ => None,
        }
    }
}

/// A mutual-exclusion domain acquired by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LockId {
    /// A lock derived from an object identity.
    Auto(u64),
    /// An application-named lock.
    Named(String),
}

impl LockId {
    pub(crate) fn encode(&self, out: &mut WireBuffer) {
        match self {
            LockId::Auto(id) => {
                out.put_u8(0);
                out.put_u64(*id);
            }
            LockId::Named(name) => {
                out.put_u8(1);
                out.put_str(name);
            }
        }
    }

    pub(crate) fn decode(r: &mut WireReader<'_>) -> Result<Self, CodecError> {
        let tag = r.get_u8()?;
        match tag {
            0 => Ok(LockId::Auto(r.get_u64()?)),
            1 => Ok(LockId::Named(r.get_string()?)),
            _ => Err(CodecError::InvalidTag { what: "lock id", tag }),
        }
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockId::Auto(id) => write!(f, "@{}", id),
            LockId::Named(name) => write!(f, "{}", name),
        }
    }
}

/// A pending `notify()` recorded by a transaction, delivered to waiters on
/// the same lock when the transaction is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notify {
    pub lock: LockId,
    pub thread_id: u64,
    pub all: bool,
}

impl Notify {
    pub(crate) fn encode(&self, out: &mut WireBuffer) {
        self.lock.encode(out);
        out.put_u64(self.thread_id);
        out.put_bool(self.all);
    }

    pub(crate) fn decode(r: &mut WireReader<'_>) -> Result<Self, CodecError> {
        Ok(Notify {
            lock: LockId::decode(r)?,
            thread_id: r.get_u64()?,
            all: r.get_bool()?,
        })
    }
}
