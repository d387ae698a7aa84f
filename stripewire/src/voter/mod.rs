//! The external failover voter.
//!
//! Voters run outside the server group. Each agent re-derives the stripe
//! member set on a fixed interval, keeps one heartbeat task per member, and
//! answers election terms with votes so a partitioned minority cannot win
//! active status. A manual override call is the escape hatch for the
//! situations the protocol cannot resolve.

mod address;
mod agent;
mod connection;
mod heartbeat;
mod options;
mod protocol;


pub use address::AddressError;
pub use address::HostPort;
pub use agent::AgentHandle;
pub use agent::VoterAgent;
pub use connection::TcpConnectionFactory;
pub use options::read_targets;
pub use options::OptionsError;
pub use options::VoterMode;
pub use options::VoterOptions;
pub use protocol::ConnectionFactory;
pub use protocol::MemberClient;
pub use protocol::MemberConnection;
pub use protocol::VoterResponse;
pub use protocol::TIMEOUT_SENTINEL;
