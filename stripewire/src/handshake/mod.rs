//! Server-side client handshake and reconnection.
//!
//! After a restart the server knows which clients were connected before it
//! went down; the coordinator gives them a bounded window to reconnect and
//! resubmit in-flight work, replays what they resend through the normal
//! apply path, and only then lets the consistency gate admit new clients.

mod coordinator;
mod gate;
mod message;

#[cfg(test)] mod coordinator_test;

pub use coordinator::ApplySink;
pub use coordinator::ChannelCloser;
pub use coordinator::ClientChannel;
pub use coordinator::CoordinatorState;
pub use coordinator::EntityResolver;
pub use coordinator::HandshakeCoordinator;
pub use coordinator::ReconnectListener;
pub use gate::ConsistencyGate;
pub use gate::Permissive;
pub use gate::QuorumGate;
pub use message::ClientHandshake;
pub use message::ClientInfo;
pub use message::HandshakeAck;
pub use message::ReconnectReference;
