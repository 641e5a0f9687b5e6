use std::env;
use std::fs;

use serial_test::serial;
use tempfile::TempDir;

use super::load_config;
use super::settings::Settings;
use crate::utils::error::SettingsError;

fn with_publisher_url(url: Option<&str>) -> Settings {
    let mut settings = Settings::default();
    settings.publisher.hub_url = url.map(str::to_string);
    settings
}

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, 8080);
    assert_eq!(settings.server.hub_name, "ObservationDeckHub");
    assert_eq!(settings.publisher.hub_url, None);
    assert_eq!(settings.publisher.reconnect_delay_ms, 5000);
    assert_eq!(settings.publisher.session_retry_attempts, 3);
    assert_eq!(settings.publisher.drain_retry_delay_ms, 1000);
    assert_eq!(settings.log.level, "info");
}

#[test]
fn test_hub_endpoint_missing_is_fatal() {
    let settings = with_publisher_url(None);
    assert!(matches!(
        settings.hub_endpoint(),
        Err(SettingsError::MissingEndpoint)
    ));
}

#[test]
fn test_hub_endpoint_malformed_is_fatal() {
    let settings = with_publisher_url(Some("not a url"));
    assert!(matches!(
        settings.hub_endpoint(),
        Err(SettingsError::InvalidEndpoint { .. })
    ));
}

#[test]
fn test_hub_endpoint_rejects_http_scheme() {
    let settings = with_publisher_url(Some("http://localhost:8080/hub"));
    match settings.hub_endpoint() {
        Err(SettingsError::InvalidEndpoint { reason, .. }) => {
            assert!(reason.contains("http"));
        }
        other => panic!("expected InvalidEndpoint, got {other:?}"),
    }
}

#[test]
fn test_hub_endpoint_accepts_ws_url() {
    let settings = with_publisher_url(Some("ws://127.0.0.1:8080"));
    let url = settings.hub_endpoint().expect("valid endpoint");
    assert_eq!(url.host_str(), Some("127.0.0.1"));
    assert_eq!(url.port(), Some(8080));
}

#[test]
#[serial]
fn load_config_from_file_overrides_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    fs::create_dir_all("config").expect("create config dir");
    let toml = r#"
        [server]
        host = "0.0.0.0"
        port = 9000

        [publisher]
        hub_url = "ws://deck.internal:9000"
        reconnect_delay_ms = 250
    "#;
    fs::write("config/default.toml", toml).expect("write config file");

    let cfg = load_config();
    env::set_current_dir(orig).expect("restore cwd");

    let cfg = cfg.expect("load_config failed");
    assert_eq!(cfg.server.host, "0.0.0.0");
    assert_eq!(cfg.server.port, 9000);
    assert_eq!(cfg.server.hub_name, "ObservationDeckHub");
    assert_eq!(
        cfg.publisher.hub_url.as_deref(),
        Some("ws://deck.internal:9000")
    );
    assert_eq!(cfg.publisher.reconnect_delay_ms, 250);
    assert_eq!(cfg.publisher.invoke_timeout_ms, 10_000);
}

#[test]
#[serial]
fn load_config_reads_prefixed_environment() {
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    let cfg = temp_env::with_vars(
        [
            ("DESKHUB_PUBLISHER__HUB_URL", Some("ws://10.0.0.5:7000")),
            ("DESKHUB_LOG__LEVEL", Some("debug")),
            ("DESKHUB_PUBLISHER__DRAIN_RETRY_DELAY_MS", Some("250")),
        ],
        load_config,
    );
    env::set_current_dir(orig).expect("restore cwd");

    let cfg = cfg.expect("load_config failed");
    assert_eq!(cfg.publisher.hub_url.as_deref(), Some("ws://10.0.0.5:7000"));
    assert_eq!(cfg.log.level, "debug");
    assert_eq!(cfg.publisher.drain_retry_delay_ms, 250);
    assert!(cfg.hub_endpoint().is_ok());
}

#[test]
#[serial]
fn load_config_treats_blank_hub_url_as_missing() {
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    let cfg = temp_env::with_var("DESKHUB_PUBLISHER__HUB_URL", Some("  "), load_config);
    env::set_current_dir(orig).expect("restore cwd");

    let cfg = cfg.expect("load_config failed");
    assert!(matches!(
        cfg.hub_endpoint(),
        Err(SettingsError::MissingEndpoint)
    ));
}
