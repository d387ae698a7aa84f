use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::net::TcpStream;

use crate::error::MemberUnreachable;
use crate::voter::address::HostPort;
use crate::voter::protocol::ConnectionFactory;
use crate::voter::protocol::MemberConnection;

/// Line-oriented diagnostic transport: one `op arg\n` request per exchange,
/// one result line back. Connections are per-request; the diagnostic port is
/// low-traffic and this keeps the voter free of connection-state tracking.
pub struct TcpMemberConnection {
    target: HostPort,
}

impl TcpMemberConnection {
    fn unreachable(&self, e: std::io::Error) -> MemberUnreachable {
        MemberUnreachable {
            target: self.target.to_string(),
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl MemberConnection for TcpMemberConnection {
    async fn invoke(&self, op: &'static str, arg: &str) -> Result<String, MemberUnreachable> {
        let stream = TcpStream::connect((self.target.host.as_str(), self.target.port))
            .await
            .map_err(|e| self.unreachable(e))?;

        let mut stream = BufReader::new(stream);
        let request = format!("{} {}\n", op, arg);
        stream
            .get_mut()
            .write_all(request.as_bytes())
            .await
            .map_err(|e| self.unreachable(e))?;

        let mut line = String::new();
        stream.read_line(&mut line).await.map_err(|e| self.unreachable(e))?;
        Ok(line.trim_end().to_string())
    }
}

/// Factory producing [`TcpMemberConnection`]s.
pub struct TcpConnectionFactory;

impl ConnectionFactory for TcpConnectionFactory {
    fn connect(&self, target: &HostPort) -> Arc<dyn MemberConnection> {
        Arc::new(TcpMemberConnection {
            target: target.clone(),
        })
    }
}
