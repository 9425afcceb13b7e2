use super::types::*;
use super::EngineConfig;
use std::path::Path;
use std::time::Duration;

#[test]
fn test_missing_file_uses_defaults() {
    let cfg = EngineConfig::load(Path::new("does-not-exist.toml")).unwrap();
    assert!(cfg.router.sort_query);
    assert_eq!(cfg.body_filter.idle_timeout().unwrap(), Duration::from_secs(300));
}

#[test]
fn test_load_toml_config() {
    let toml = r#"
        [router]
        ignore_host_case = false

        [body_filter]
        idle_timeout = "30s"

        [log]
        level = "debug"
    "#;
    let tmp = std::env::temp_dir().join("redirect_engine_test_config.toml");
    std::fs::write(&tmp, toml).unwrap();
    let cfg = EngineConfig::load(&tmp).unwrap();
    assert!(!cfg.router.ignore_host_case);
    assert!(cfg.router.sort_query);
    assert_eq!(cfg.body_filter.idle_timeout().unwrap(), Duration::from_secs(30));
    assert_eq!(cfg.log.level, "debug");
    std::fs::remove_file(&tmp).ok();
}

#[test]
fn test_load_json_config() {
    let json = r#"{
        "router": { "sort_query": false },
        "log": { "json": true }
    }"#;
    let tmp = std::env::temp_dir().join("redirect_engine_test_config.json");
    std::fs::write(&tmp, json).unwrap();
    let cfg = EngineConfig::load(&tmp).unwrap();
    assert!(!cfg.router.sort_query);
    assert!(cfg.router.ignore_host_case);
    assert!(cfg.log.json);
    std::fs::remove_file(&tmp).ok();
}

#[test]
fn test_unsupported_extension_fails() {
    let tmp = std::env::temp_dir().join("redirect_engine_test_config.yaml");
    std::fs::write(&tmp, "router: {}").unwrap();
    assert!(EngineConfig::load(&tmp).is_err());
    std::fs::remove_file(&tmp).ok();
}

#[test]
fn test_validate_bad_idle_timeout_fails() {
    let cfg = EngineConfig {
        router: RouterConfig::default(),
        body_filter: BodyFilterSettings {
            idle_timeout: "soon".into(),
        },
        log: LogConfig::default(),
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_validate_bad_log_level_fails() {
    let cfg = EngineConfig {
        router: RouterConfig::default(),
        body_filter: BodyFilterSettings::default(),
        log: LogConfig {
            level: "loud".into(),
            json: false,
        },
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_validate_default_passes() {
    assert!(EngineConfig::default().validate().is_ok());
}

#[test]
fn test_overrides_replace_file_values() {
    let env: std::collections::HashMap<&str, &str> = [
        ("REDIRECT_ENGINE_SORT_QUERY", "0"),
        ("REDIRECT_ENGINE_IDLE_TIMEOUT", "90s"),
        ("REDIRECT_ENGINE_LOG_JSON", "true"),
    ]
    .into_iter()
    .collect();

    let mut cfg = EngineConfig::default();
    cfg.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
    assert!(!cfg.router.sort_query);
    assert!(cfg.router.ignore_host_case);
    assert_eq!(cfg.body_filter.idle_timeout().unwrap(), Duration::from_secs(90));
    assert!(cfg.log.json);
    assert_eq!(cfg.log.level, "info");
    assert!(cfg.validate().is_ok());
}
