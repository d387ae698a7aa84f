use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

/// A malformed `host:port` entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("invalid member address '{addr}': expected host:port")]
    MissingPort { addr: String },

    #[error("invalid member address '{addr}': bad port '{port}'")]
    InvalidPort { addr: String, port: String },
}

/// A stripe member address. Address equality, not task identity, decides
/// topology membership.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl HostPort {
    pub fn new(host: impl ToString, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }
}

impl FromStr for HostPort {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s.rsplit_once(':').ok_or_else(|| AddressError::MissingPort {
            addr: s.to_string(),
        })?;
        if host.is_empty() {
            return Err(AddressError::MissingPort { addr: s.to_string() });
        }
        let port = port.parse::<u16>().map_err(|_| AddressError::InvalidPort {
            addr: s.to_string(),
            port: port.to_string(),
        })?;
        Ok(HostPort::new(host, port))
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::AddressError;
    use super::HostPort;

    #[test]
    fn test_parse() {
        assert_eq!(Ok(HostPort::new("localhost", 9410)), "localhost:9410".parse());
        assert_eq!(Ok(HostPort::new("10.0.0.3", 1)), "10.0.0.3:1".parse());

        assert_eq!(
            Err(AddressError::MissingPort {
                addr: "localhost".to_string()
            }),
            "localhost".parse::<HostPort>()
        );
        assert_eq!(
            Err(AddressError::MissingPort {
                addr: ":9410".to_string()
            }),
            ":9410".parse::<HostPort>()
        );
        assert_eq!(
            Err(AddressError::InvalidPort {
                addr: "localhost:yes".to_string(),
                port: "yes".to_string()
            }),
            "localhost:yes".parse::<HostPort>()
        );
    }

    #[test]
    fn test_display_roundtrip() {
        let hp = HostPort::new("stripe-2", 9410);
        assert_eq!("stripe-2:9410", hp.to_string());
        assert_eq!(Ok(hp), "stripe-2:9410".parse());
    }
}
