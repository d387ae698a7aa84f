//! The string-keyed diagnostic protocol voters speak with stripe members.
//!
//! Every request is an operation name plus one argument string; every result
//! is a parsable signed token, a boolean literal, or the distinguished
//! timeout sentinel. A negative token is a well-defined "invalid/rejected"
//! outcome; only the sentinel (or an expired local request clock) is a
//! timeout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::MalformedResponse;
use crate::error::MemberUnreachable;
use crate::error::RequestError;
use crate::error::RequestTimeout;
use crate::voter::address::HostPort;

/// The result string a member sends when it could not answer in time.
pub const TIMEOUT_SENTINEL: &str = "request timeout";

pub(crate) const OP_REGISTER: &str = "registerVoter";
pub(crate) const OP_HEARTBEAT: &str = "heartbeat";
pub(crate) const OP_VOTE: &str = "vote";
pub(crate) const OP_OVERRIDE: &str = "overrideVote";
pub(crate) const OP_DEREGISTER: &str = "deregisterVoter";
pub(crate) const OP_TOPOLOGY: &str = "getTopology";

/// Transport seam: one request/response exchange against one member.
#[async_trait]
pub trait MemberConnection: Send + Sync {
    async fn invoke(&self, op: &'static str, arg: &str) -> Result<String, MemberUnreachable>;
}

/// Creates connections to members as topology changes surface new addresses.
pub trait ConnectionFactory: Send + Sync {
    fn connect(&self, target: &HostPort) -> Arc<dyn MemberConnection>;
}

/// Outcome of a token-valued voter operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoterResponse {
    Token(i64),
    /// The member answered with a negative token: the request was rejected,
    /// not lost.
    Invalid,
}

/// Typed client for the voter operations against one member.
pub struct MemberClient {
    target: HostPort,
    conn: Arc<dyn MemberConnection>,
    request_timeout: Duration,
}

impl MemberClient {
    pub fn new(target: HostPort, conn: Arc<dyn MemberConnection>, request_timeout: Duration) -> Self {
        Self {
            target,
            conn,
            request_timeout,
        }
    }

    pub fn target(&self) -> &HostPort {
        &self.target
    }

    async fn call(&self, op: &'static str, arg: &str) -> Result<String, RequestError> {
        let fut = self.conn.invoke(op, arg);
        let raw = match tokio::time::timeout(self.request_timeout, fut).await {
            Err(_) => {
                return Err(RequestTimeout {
                    target: self.target.to_string(),
                    op,
                }
                .into())
            }
            Ok(Err(unreachable)) => return Err(unreachable.into()),
            Ok(Ok(raw)) => raw,
        };

        if raw == TIMEOUT_SENTINEL {
            return Err(RequestTimeout {
                target: self.target.to_string(),
                op,
            }
            .into());
        }
        Ok(raw)
    }

    fn token(&self, op: &'static str, raw: &str) -> Result<VoterResponse, RequestError> {
        let value = raw.trim().parse::<i64>().map_err(|_| MalformedResponse {
            target: self.target.to_string(),
            op,
            reason: format!("expected a token, got '{}'", raw),
        })?;
        if value < 0 {
            Ok(VoterResponse::Invalid)
        } else {
            Ok(VoterResponse::Token(value))
        }
    }

    fn boolean(&self, op: &'static str, raw: &str) -> Result<bool, RequestError> {
        match raw.trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(MalformedResponse {
                target: self.target.to_string(),
                op,
                reason: format!("expected a boolean literal, got '{}'", other),
            }
            .into()),
        }
    }

    pub async fn register_voter(&self, voter_id: &str) -> Result<VoterResponse, RequestError> {
        let raw = self.call(OP_REGISTER, voter_id).await?;
        self.token(OP_REGISTER, &raw)
    }

    pub async fn heartbeat(&self, voter_id: &str) -> Result<VoterResponse, RequestError> {
        let raw = self.call(OP_HEARTBEAT, voter_id).await?;
        self.token(OP_HEARTBEAT, &raw)
    }

    pub async fn vote(&self, voter_id: &str, term: i64) -> Result<VoterResponse, RequestError> {
        let arg = format!("{}:{}", voter_id, term);
        let raw = self.call(OP_VOTE, &arg).await?;
        self.token(OP_VOTE, &raw)
    }

    pub async fn override_vote(&self, voter_id: &str) -> Result<bool, RequestError> {
        let raw = self.call(OP_OVERRIDE, voter_id).await?;
        self.boolean(OP_OVERRIDE, &raw)
    }

    pub async fn deregister_voter(&self, voter_id: &str) -> Result<bool, RequestError> {
        let raw = self.call(OP_DEREGISTER, voter_id).await?;
        self.boolean(OP_DEREGISTER, &raw)
    }

    /// Asks the member for the full stripe member set, as comma-separated
    /// host:port entries.
    pub async fn topology(&self) -> Result<Vec<String>, RequestError> {
        let raw = self.call(OP_TOPOLOGY, "").await?;
        Ok(raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect())
    }
}
