use core::time::Duration;

use crate::config::error::ConfigError;
use crate::Config;

#[test]
fn test_config_defaults() {
    let cfg = Config::default();

    assert_eq!("main-stripe", cfg.stripe_name);
    assert_eq!(120_000, cfg.reconnect_window);
    assert_eq!(15_000, cfg.reconnect_notice_interval);
    assert_eq!(5_000, cfg.gate_retry_interval);
    assert_eq!(1_000, cfg.voter_heartbeat_interval);
    assert_eq!(30_000, cfg.topology_refresh_interval);
    assert_eq!(3_000, cfg.request_timeout);

    assert!(cfg.validate().is_ok());
}

#[test]
fn test_invalid_reconnect_notice_produces_expected_error() {
    let config = Config {
        reconnect_window: 1_000,
        reconnect_notice_interval: 5_000,
        ..Default::default()
    };

    let err = config.validate().unwrap_err();
    assert_eq!(
        ConfigError::ReconnectNoticeTooLarge {
            notice: 5_000,
            window: 1_000
        },
        err
    );
}

#[test]
fn test_zero_intervals_rejected() {
    let config = Config {
        reconnect_window: 0,
        ..Default::default()
    };
    assert_eq!(
        ConfigError::ZeroDuration {
            field: "reconnect-window"
        },
        config.validate().unwrap_err()
    );

    let config = Config {
        request_timeout: 0,
        ..Default::default()
    };
    assert_eq!(
        ConfigError::ZeroDuration {
            field: "request-timeout"
        },
        config.validate().unwrap_err()
    );
}

#[test]
fn test_refresh_below_heartbeat_rejected() {
    let config = Config {
        voter_heartbeat_interval: 10_000,
        topology_refresh_interval: 5_000,
        ..Default::default()
    };
    assert_eq!(
        ConfigError::RefreshBelowHeartbeat {
            refresh: 5_000,
            heartbeat: 10_000
        },
        config.validate().unwrap_err()
    );
}

#[test]
fn test_build() -> anyhow::Result<()> {
    let config = Config::build(&[
        "stripewire",
        "--stripe-name=edge",
        "--reconnect-window=60000",
        "--reconnect-notice-interval=5000",
        "--gate-retry-interval=2000",
        "--voter-heartbeat-interval=500",
        "--topology-refresh-interval=10000",
        "--request-timeout=400",
    ])?;

    assert_eq!("edge", config.stripe_name);
    assert_eq!(60_000, config.reconnect_window);
    assert_eq!(5_000, config.reconnect_notice_interval);
    assert_eq!(2_000, config.gate_retry_interval);
    assert_eq!(500, config.voter_heartbeat_interval);
    assert_eq!(10_000, config.topology_refresh_interval);
    assert_eq!(400, config.request_timeout);

    assert_eq!(Duration::from_millis(60_000), config.reconnect_window());
    assert_eq!(Duration::from_millis(400), config.request_timeout());
    Ok(())
}
