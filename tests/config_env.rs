// tests/config_env.rs
//
// Config file discovery and environment overrides. Env is process-global,
// so these run serially.

use std::path::PathBuf;

use eu_compliance_monitor::config::{AppConfig, ENV_CONFIG_PATH};
use serial_test::serial;

const VARS: &[&str] = &[
    ENV_CONFIG_PATH,
    "SMTP_HOST",
    "SMTP_PORT",
    "SMTP_USER",
    "SMTP_PASS",
    "NOTIFY_EMAIL_FROM",
    "DEEPSEEK_API_KEY",
    "MONITOR_DATA_DIR",
    "CHECK_INTERVAL_HOURS",
    "ALERT_THRESHOLD",
    "ALERT_WINDOW_DAYS",
];

fn clear_env() {
    for v in VARS {
        std::env::remove_var(v);
    }
}

#[test]
#[serial]
fn file_from_env_path_then_env_overrides_win() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("monitor.toml");
    std::fs::write(
        &path,
        r#"
[monitoring]
alert_threshold = 5
window_days = 14

[email]
smtp_server = "smtp.example.org"
username = "file-user@example.org"

[deepseek]
model = "deepseek-chat"
temperature = 9.0
"#,
    )
    .unwrap();

    std::env::set_var(ENV_CONFIG_PATH, &path);
    std::env::set_var("ALERT_THRESHOLD", "4");
    std::env::set_var("SMTP_PASS", "s3cret");
    std::env::set_var("MONITOR_DATA_DIR", "/tmp/monitor-data");

    let cfg = AppConfig::load_default().unwrap();
    clear_env();

    assert_eq!(cfg.monitoring.alert_threshold, 4, "env beats file");
    assert_eq!(cfg.monitoring.window_days, 14, "file beats default");
    assert_eq!(cfg.monitoring.check_interval_hours, 24);
    assert_eq!(cfg.email.smtp_server, "smtp.example.org");
    assert!(cfg.email.is_configured());
    assert_eq!(cfg.storage.data_dir, PathBuf::from("/tmp/monitor-data"));
    assert_eq!(cfg.deepseek.model, "deepseek-chat");
    assert!((cfg.deepseek.temperature - 0.3).abs() < f32::EPSILON, "out-of-range temperature reset");
}

#[test]
#[serial]
fn explicit_json_path_is_loaded() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("monitor.json");
    std::fs::write(&path, r#"{"monitoring":{"check_interval_hours":6}}"#).unwrap();

    let cfg = AppConfig::load(Some(&path)).unwrap();
    assert_eq!(cfg.monitoring.interval(), std::time::Duration::from_secs(6 * 3600));
}

#[test]
#[serial]
fn missing_env_path_is_an_error() {
    clear_env();
    std::env::set_var(ENV_CONFIG_PATH, "/definitely/not/here.toml");
    let res = AppConfig::load_default();
    clear_env();
    assert!(res.is_err());
}

#[test]
#[serial]
fn non_numeric_override_is_rejected() {
    clear_env();
    std::env::set_var("SMTP_PORT", "five-eight-seven");
    let mut cfg = AppConfig::default();
    let res = cfg.apply_env_overrides();
    clear_env();
    assert!(res.unwrap_err().to_string().contains("SMTP_PORT"));
}

#[test]
#[serial]
fn api_key_env_indirection() {
    clear_env();
    let cfg = AppConfig::default();
    assert!(cfg.deepseek.resolved_api_key().is_none());

    std::env::set_var("DEEPSEEK_API_KEY", "sk-test");
    let key = cfg.deepseek.resolved_api_key();
    clear_env();
    assert_eq!(key.as_deref(), Some("sk-test"));
}
