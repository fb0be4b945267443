use std::{env, fs};

use rolesync_operator::config::loader::load_config;
use rolesync_operator::reconcile::{ImmutableFieldPolicy, RequeuePolicy};

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    // Create a temporary TOML configuration file
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("rolesync.toml");

    let toml_content = r#"
[logging]
level = "debug"

[reconcile]
call_timeout_ms = 2500
requeue_after_secs = 0
immutable_field_policy = "recreate"

[controller]
workers = 4
base_backoff_ms = 100
max_backoff_ms = 5000
max_retries = 8

[seed]
path = "seed.json"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.reconcile.call_timeout_ms, 2500);
    assert_eq!(
        cfg.reconcile.immutable_field_policy,
        ImmutableFieldPolicy::Recreate
    );
    assert_eq!(cfg.reconcile.settings().requeue, RequeuePolicy::Never);
    assert_eq!(cfg.controller.workers, 4);
    assert_eq!(cfg.controller.max_retries, 8);
    assert_eq!(cfg.seed.path.as_deref(), Some("seed.json"));

    // 2) Env override should win over file
    unsafe {
        env::set_var("ROLESYNC__CONTROLLER__WORKERS", "9");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.controller.workers, 9);
    // cleanup env var
    unsafe {
        env::remove_var("ROLESYNC__CONTROLLER__WORKERS");
    }

    // 3) Invalid config is rejected
    let bad = dir.path().join("bad.toml");
    fs::write(
        &bad,
        r#"
[controller]
base_backoff_ms = 9000
max_backoff_ms = 1000
"#,
    )
    .expect("write bad toml");
    let err = load_config(bad.to_str()).expect_err("backoff bounds should be validated");
    assert!(err.contains("base_backoff_ms"));
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("absent.toml");

    let cfg = load_config(path.to_str()).expect("defaults are valid");
    assert_eq!(cfg.logging.level, "info");
    assert_eq!(cfg.reconcile.call_timeout_ms, 10_000);
    assert_eq!(
        cfg.reconcile.immutable_field_policy,
        ImmutableFieldPolicy::Reject
    );
    assert_eq!(cfg.controller.max_retries, 0);
    assert!(cfg.seed.path.is_none());
}
