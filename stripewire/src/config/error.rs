/// Error variants related to configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("reconnect-notice-interval ({notice} ms) must not exceed reconnect-window ({window} ms)")]
    ReconnectNoticeTooLarge { notice: u64, window: u64 },

    #[error("{field} must be greater than 0")]
    ZeroDuration { field: &'static str },

    #[error("topology-refresh-interval ({refresh} ms) must not be below voter-heartbeat-interval ({heartbeat} ms)")]
    RefreshBelowHeartbeat { refresh: u64, heartbeat: u64 },
}
