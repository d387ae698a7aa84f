//! Runtime configuration for the replication core and the voter.

use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use serde::Serialize;

use crate::config::error::ConfigError;

/// Tunables for the handshake coordinator and the voter agent.
///
/// Intervals are in milliseconds. Every field can be supplied from the
/// environment; defaults suit a LAN deployment where a restarted server
/// should tolerate a couple of minutes of client reconnection.
#[derive(Clone, Debug, Serialize, Deserialize, Parser)]
pub struct Config {
    /// The application specific name of this stripe.
    #[arg(long, env = "STRIPE_NAME", default_value = "main-stripe")]
    pub stripe_name: String,

    /// How long previously-connected clients may take to reconnect after a
    /// server restart before being forcibly dropped, in milliseconds.
    #[arg(long, env = "STRIPE_RECONNECT_WINDOW", default_value = "120000")]
    pub reconnect_window: u64,

    /// Cap on the interval between "still waiting" reconnect progress
    /// notifications, in milliseconds.
    #[arg(long, env = "STRIPE_RECONNECT_NOTICE_INTERVAL", default_value = "15000")]
    pub reconnect_notice_interval: u64,

    /// Backoff between consistency-gate transition attempts when the gate
    /// rejects client admission, in milliseconds.
    #[arg(long, env = "STRIPE_GATE_RETRY_INTERVAL", default_value = "5000")]
    pub gate_retry_interval: u64,

    /// Interval at which the voter heartbeats each tracked member, in
    /// milliseconds.
    #[arg(long, env = "STRIPE_VOTER_HEARTBEAT_INTERVAL", default_value = "1000")]
    pub voter_heartbeat_interval: u64,

    /// Interval at which the voter re-derives the stripe member set, in
    /// milliseconds.
    #[arg(long, env = "STRIPE_TOPOLOGY_REFRESH_INTERVAL", default_value = "30000")]
    pub topology_refresh_interval: u64,

    /// Bound on any single request against a stripe member, in milliseconds.
    #[arg(long, env = "STRIPE_REQUEST_TIMEOUT", default_value = "3000")]
    pub request_timeout: u64,
}

impl Default for Config {
    fn default() -> Self {
        <Self as Parser>::parse_from(Vec::<&'static str>::new())
    }
}

impl Config {
    pub fn build(args: &[&str]) -> Result<Config, ConfigError> {
        let config = <Self as Parser>::parse_from(args);
        config.validate()
    }

    /// Validate the state of this config.
    pub fn validate(self) -> Result<Config, ConfigError> {
        if self.reconnect_window == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "reconnect-window",
            });
        }

        if self.reconnect_notice_interval == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "reconnect-notice-interval",
            });
        }

        if self.reconnect_notice_interval > self.reconnect_window {
            return Err(ConfigError::ReconnectNoticeTooLarge {
                notice: self.reconnect_notice_interval,
                window: self.reconnect_window,
            });
        }

        if self.voter_heartbeat_interval == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "voter-heartbeat-interval",
            });
        }

        if self.request_timeout == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "request-timeout",
            });
        }

        if self.topology_refresh_interval < self.voter_heartbeat_interval {
            return Err(ConfigError::RefreshBelowHeartbeat {
                refresh: self.topology_refresh_interval,
                heartbeat: self.voter_heartbeat_interval,
            });
        }

        Ok(self)
    }

    pub fn reconnect_window(&self) -> Duration {
        Duration::from_millis(self.reconnect_window)
    }

    pub fn reconnect_notice_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_notice_interval)
    }

    pub fn gate_retry_interval(&self) -> Duration {
        Duration::from_millis(self.gate_retry_interval)
    }

    pub fn voter_heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.voter_heartbeat_interval)
    }

    pub fn topology_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.topology_refresh_interval)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout)
    }
}
