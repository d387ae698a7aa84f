//! Replication batching, client reconnection and quorum failover core for
//! striped object clusters.
//!
//! Three subsystems keep a shared-object cluster consistent through crashes
//! and partitions:
//!
//! - [`txn`]: client transactions are captured into ordered, replayable
//!   records and serialized into compact binary batches ([`codec`] holds the
//!   shared wire primitives).
//! - [`handshake`]: the server admits clients and, after a restart, gives
//!   previously-connected clients a bounded window to reconnect and resubmit
//!   in-flight work before being forcibly dropped.
//! - [`voter`]: external voter processes heartbeat every stripe member and
//!   cast votes so that at most one replica is promoted to active, with a
//!   manual override escape hatch.
//!
//! Timers, coordinators and agents are all explicitly constructed instances;
//! there is no process-wide shared state, so several of each can coexist in
//! one test process.

pub mod codec;
pub mod config;
pub mod error;
pub mod handshake;
pub mod quorum;
pub mod txn;
pub mod types;
pub mod voter;

mod display_ext;

pub use crate::config::Config;
pub use crate::config::ConfigError;
pub use crate::error::MissingEntity;
pub use crate::error::ReconnectError;
pub use crate::error::RequestError;
pub use crate::handshake::ClientHandshake;
pub use crate::handshake::HandshakeAck;
pub use crate::handshake::HandshakeCoordinator;
pub use crate::txn::ClientTransactionBatch;
pub use crate::txn::TransactionRecord;
pub use crate::types::BatchId;
pub use crate::types::ClientId;
pub use crate::types::NodeId;
pub use crate::types::ObjectId;
pub use crate::types::SequenceId;
pub use crate::types::TransactionId;
pub use crate::voter::VoterAgent;
