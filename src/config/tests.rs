use std::env;
use std::fs;

use serial_test::serial;
use tempfile::TempDir;

use super::settings::{PartialBrokerSettings, PartialSettings, Settings};
use super::{load_config, load_config_from};

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.broker.host, "localhost");
    assert_eq!(settings.broker.port, 1883);
    assert_eq!(settings.tracker.publish_timeout_ms, 10_000);
    assert_eq!(settings.tracker.subscribe_timeout_ms, 15_000);
    assert_eq!(settings.load.on_start_delay_ms, 5_000);
    assert_eq!(settings.load.qos, 0);
    assert_eq!(settings.load.payload, r#"{"id":"0"}"#);
    assert!(!settings.tls.enabled);
    assert_eq!(settings.log.level, "info");
}

#[test]
fn test_partial_merge_keeps_defaults() {
    let partial = PartialSettings {
        broker: Some(PartialBrokerSettings {
            port: Some(8883),
            ..PartialBrokerSettings::default()
        }),
        ..PartialSettings::default()
    };
    let settings = partial.merge(Settings::default());
    assert_eq!(settings.broker.port, 8883);
    assert_eq!(settings.broker.host, "localhost");
    assert_eq!(settings.load.users, 10);
}

#[test]
#[serial]
fn load_config_from_file_overrides_defaults() {
    // load_config resolves config/default.toml relative to the working directory
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    fs::create_dir_all("config").expect("create config dir");
    let toml = r#"
        [broker]
        host = "broker.local"
        port = 8883

        [tracker]
        publish_timeout_ms = 2500

        [load]
        users = 250
        topic = "sensors/{thing}"
    "#;
    fs::write("config/default.toml", toml).expect("write config file");

    let cfg = load_config();
    env::set_current_dir(orig).expect("restore cwd");

    let cfg = cfg.expect("load_config failed");
    assert_eq!(cfg.broker.host, "broker.local");
    assert_eq!(cfg.broker.port, 8883);
    assert_eq!(cfg.tracker.publish_timeout_ms, 2500);
    assert_eq!(cfg.tracker.subscribe_timeout_ms, 15_000);
    assert_eq!(cfg.load.users, 250);
    assert_eq!(cfg.load.topic, "sensors/{thing}");
}

#[test]
#[serial]
fn load_config_reads_environment() {
    temp_env::with_vars(
        [
            ("MQTTLOAD_BROKER__HOST", Some("10.0.0.7")),
            ("MQTTLOAD_BROKER__PORT", Some("1884")),
            ("MQTTLOAD_LOAD__HATCH_RATE", Some("2.5")),
            ("MQTTLOAD_TLS__ENABLED", Some("true")),
        ],
        || {
            let cfg = load_config().expect("load_config failed");
            assert_eq!(cfg.broker.host, "10.0.0.7");
            assert_eq!(cfg.broker.port, 1884);
            assert_eq!(cfg.load.hatch_rate, 2.5);
            assert!(cfg.tls.enabled);
        },
    );
}

#[test]
#[serial]
fn load_config_from_missing_explicit_file_fails() {
    assert!(load_config_from(Some("/nonexistent/loadgen")).is_err());
}
