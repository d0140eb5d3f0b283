use photoscreen::config::{AppConfig, ConfigError};
use photoscreen::persist::PersistMode;
use serial_test::serial;

const VARS: &[&str] = &["JWT_SECRET", "PHOTOSCREEN_DATA_DIR", "PHOTOSCREEN_PERSIST", "PHOTOSCREEN_IDS", "PHOTOSCREEN_BIND"];

fn clear_env() {
    for v in VARS {
        std::env::remove_var(v);
    }
}

#[test]
#[serial]
fn reads_process_environment() {
    clear_env();
    let tmp = tempfile::tempdir().unwrap();
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
    std::env::set_var("PHOTOSCREEN_DATA_DIR", tmp.path());
    std::env::set_var("PHOTOSCREEN_PERSIST", "awaited");

    let cfg = AppConfig::from_env().unwrap();
    assert_eq!(cfg.data_dir, tmp.path());
    assert_eq!(cfg.store.persist, PersistMode::Awaited);
    clear_env();
}

#[test]
#[serial]
fn missing_secret_is_reported() {
    clear_env();
    assert_eq!(AppConfig::from_env().unwrap_err(), ConfigError::Missing("JWT_SECRET"));
}
