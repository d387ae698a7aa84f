//! Error types exposed by this crate.
//!
//! Programmer errors — mutating a committed batch, duplicate change writers,
//! serializing a reserved id — are invariant violations and panic at the
//! point of misuse; nothing here models them. The types below cover the
//! conditions a correct deployment still runs into: request timing failures,
//! replies that parse but mean "rejected", and reconnect replay against
//! state that no longer exists.

use crate::codec::CodecError;
use crate::types::ClientId;

/// A request against a stripe member did not complete in time.
///
/// Raised both when the local request clock expires and when the member
/// itself answers with the timeout sentinel. Distinct from an invalid
/// (negative) response, which is a well-defined protocol outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("request {op} to {target} timed out")]
pub struct RequestTimeout {
    pub target: String,
    pub op: &'static str,
}

/// A member replied with something that is neither a token, a boolean
/// literal, nor the timeout sentinel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed response to {op} from {target}: {reason}")]
pub struct MalformedResponse {
    pub target: String,
    pub op: &'static str,
    pub reason: String,
}

/// The member could not be reached at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("member {target} unreachable: {reason}")]
pub struct MemberUnreachable {
    pub target: String,
    pub reason: String,
}

/// Error invoking an operation against a stripe member.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error(transparent)]
    Timeout(#[from] RequestTimeout),

    #[error(transparent)]
    Malformed(#[from] MalformedResponse),

    #[error(transparent)]
    Unreachable(#[from] MemberUnreachable),
}

impl RequestError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RequestError::Timeout(_))
    }
}

/// A reconnecting client referenced an entity that no longer exists.
///
/// Fatal to that reconnect attempt: client and server state have diverged
/// irrecoverably.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("entity {entity_id}/{client_instance} referenced by reconnecting client {client} does not exist")]
pub struct MissingEntity {
    pub client: ClientId,
    pub entity_id: u64,
    pub client_instance: u64,
}

/// Error replaying a client's reconnect handshake.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconnectError {
    #[error(transparent)]
    MissingEntity(#[from] MissingEntity),

    /// A resent batch failed to parse.
    #[error(transparent)]
    Codec(#[from] CodecError),
}
