use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::codec::CodecError;
use crate::codec::WireBuffer;
use crate::codec::WireReader;
use crate::types::ClientId;
use crate::types::NodeId;

/// Monitoring data a client reports about itself at handshake time.
///
/// Attached to the connection for observability; surfaced through the
/// coordinator's flat per-client report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub process_id: u32,
    pub uuid: String,
    pub name: String,
    pub version: String,
    pub revision: String,
    pub remote_address: String,
}

impl ClientInfo {
    pub(crate) fn encode(&self, out: &mut WireBuffer) {
        out.put_u32(self.process_id);
        out.put_str(&self.uuid);
        out.put_str(&self.name);
        out.put_str(&self.version);
        out.put_str(&self.revision);
        out.put_str(&self.remote_address);
    }

    pub(crate) fn decode(r: &mut WireReader<'_>) -> Result<Self, CodecError> {
        Ok(ClientInfo {
            process_id: r.get_u32()?,
            uuid: r.get_string()?,
            name: r.get_string()?,
            version: r.get_string()?,
            revision: r.get_string()?,
            remote_address: r.get_string()?,
        })
    }
}

/// An entity reference a reconnecting client still holds, replayed before
/// any resent transaction so the server can re-establish the fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectReference {
    pub entity_id: u64,
    pub client_instance: u64,
    /// Entity-specific reconnect payload, opaque to the coordinator.
    pub payload: Vec<u8>,
}

impl ReconnectReference {
    pub(crate) fn encode(&self, out: &mut WireBuffer) {
        out.put_u64(self.entity_id);
        out.put_u64(self.client_instance);
        out.put_bytes(&self.payload);
    }

    pub(crate) fn decode(r: &mut WireReader<'_>) -> Result<Self, CodecError> {
        Ok(ReconnectReference {
            entity_id: r.get_u64()?,
            client_instance: r.get_u64()?,
            payload: r.get_bytes()?,
        })
    }
}

/// The message a client sends to be admitted (or re-admitted) to the
/// cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHandshake {
    pub client_id: ClientId,
    pub info: ClientInfo,

    /// A monitoring-only connection: acknowledged immediately, never part of
    /// reconnection bookkeeping.
    pub diagnostic: bool,

    pub reconnect_references: Vec<ReconnectReference>,

    /// Unacknowledged batches, encoded, in send order.
    pub resent_batches: Vec<Vec<u8>>,
}

impl ClientHandshake {
    pub fn new(client_id: ClientId, info: ClientInfo) -> Self {
        Self {
            client_id,
            info,
            diagnostic: false,
            reconnect_references: Vec::new(),
            resent_batches: Vec::new(),
        }
    }

    pub fn encode(&self, out: &mut WireBuffer) {
        out.put_u64(self.client_id.0);
        self.info.encode(out);
        out.put_bool(self.diagnostic);

        out.put_u32(self.reconnect_references.len() as u32);
        for reference in &self.reconnect_references {
            reference.encode(out);
        }

        out.put_u32(self.resent_batches.len() as u32);
        for batch in &self.resent_batches {
            out.put_bytes(batch);
        }
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self, CodecError> {
        let client_id = ClientId(r.get_u64()?);
        let info = ClientInfo::decode(r)?;
        let diagnostic = r.get_bool()?;

        let reference_count = r.get_u32()?;
        let mut reconnect_references = Vec::with_capacity(reference_count as usize);
        for _ in 0..reference_count {
            reconnect_references.push(ReconnectReference::decode(r)?);
        }

        let batch_count = r.get_u32()?;
        let mut resent_batches = Vec::with_capacity(batch_count as usize);
        for _ in 0..batch_count {
            resent_batches.push(r.get_bytes()?);
        }

        Ok(ClientHandshake {
            client_id,
            info,
            diagnostic,
            reconnect_references,
            resent_batches,
        })
    }
}

/// Sent once per successful handshake or reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeAck {
    pub active_nodes: BTreeSet<NodeId>,
    pub server_version: String,
}

impl HandshakeAck {
    pub fn encode(&self, out: &mut WireBuffer) {
        out.put_u32(self.active_nodes.len() as u32);
        for node in &self.active_nodes {
            out.put_u64(*node);
        }
        out.put_str(&self.server_version);
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self, CodecError> {
        let node_count = r.get_u32()?;
        let mut active_nodes = BTreeSet::new();
        for _ in 0..node_count {
            active_nodes.insert(r.get_u64()?);
        }
        Ok(HandshakeAck {
            active_nodes,
            server_version: r.get_string()?,
        })
    }
}
