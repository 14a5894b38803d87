use super::*;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_empty_document_uses_defaults() {
    let config: ShellConfig = serde_yaml::from_str("{}").unwrap();
    assert_eq!(config, ShellConfig::default());
    assert_eq!(config.daemon.args, vec!["-no-browser".to_string()]);
    assert_eq!(config.daemon.gui_address, "http://127.0.0.1:0");
    assert_eq!(config.daemon.restart_limit, None);
    assert!(config.status.enabled);
    assert_eq!(config.status.poll_interval(), Duration::from_secs(10));
    config.validate().unwrap();
}

#[test]
fn test_partial_sections_fill_in_defaults() {
    let yaml = r#"
daemon:
  binary: /opt/syncthing/syncthing
  restart_limit: 5
  env:
    STTRACE: model
status:
  poll_interval_secs: 3
"#;
    let config: ShellConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(
        config.daemon.binary.as_deref(),
        Some(Path::new("/opt/syncthing/syncthing"))
    );
    assert_eq!(config.daemon.args, vec!["-no-browser".to_string()]);
    assert_eq!(config.daemon.restart_limit, Some(5));
    assert_eq!(config.status.poll_interval_secs, 3);
    assert_eq!(config.status.timeout_secs, 15);
    assert!(config.status.enabled);
}

#[test]
fn test_load_reads_and_validates_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    fs::write(&path, "status:\n  enabled: false\n").unwrap();

    let config = ShellConfig::load(&path).unwrap();
    assert!(!config.status.enabled);
}

#[test]
fn test_load_reports_path_on_bad_yaml() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    fs::write(&path, "daemon: [not, a, map").unwrap();

    let err = ShellConfig::load(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file as YAML"));
    assert!(err.to_string().contains("config.yaml"));
}

#[test]
fn test_load_or_default_without_file() {
    let dir = tempdir().unwrap();
    let config = ShellConfig::load_or_default(&dir.path().join("missing.yaml")).unwrap();
    assert_eq!(config, ShellConfig::default());
}

#[test]
fn test_explicit_missing_path_is_an_error() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing.yaml");
    let err = ShellConfig::load_from(Some(&missing)).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn test_validate_rejects_reserved_env() {
    let mut config = ShellConfig::default();
    config
        .daemon
        .env
        .insert("STGUIAPIKEY".to_string(), "x".to_string());
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("STGUIAPIKEY"));
}

#[test]
fn test_validate_rejects_zero_intervals() {
    let mut config = ShellConfig::default();
    config.status.poll_interval_secs = 0;
    assert!(config.validate().is_err());

    let mut config = ShellConfig::default();
    config.status.timeout_secs = 0;
    assert!(config.validate().is_err());

    let mut config = ShellConfig::default();
    config.daemon.gui_address = "  ".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_supervisor_config_carries_daemon_section() {
    let mut config = ShellConfig::default();
    config.daemon.gui_address = "http://127.0.0.1:8384".to_string();
    config.daemon.restart_limit = Some(2);
    config
        .daemon
        .env
        .insert("STTRACE".to_string(), "db".to_string());

    let supervisor = config.supervisor_config();
    assert_eq!(supervisor.gui_address, "http://127.0.0.1:8384");
    assert_eq!(supervisor.restart_limit, Some(2));
    assert_eq!(
        supervisor.extra_env,
        vec![("STTRACE".to_string(), "db".to_string())]
    );
}

#[test]
fn test_binary_resolution_order() {
    let cli = Path::new("/cli/syncthing");
    let configured = Path::new("/config/syncthing");
    let on_path = || Some(PathBuf::from("/usr/bin/syncthing"));

    assert_eq!(
        resolve_daemon_binary_with(Some(cli), Some(configured), on_path, None).unwrap(),
        cli
    );
    assert_eq!(
        resolve_daemon_binary_with(None, Some(configured), on_path, None).unwrap(),
        configured
    );
    assert_eq!(
        resolve_daemon_binary_with(None, None, on_path, None).unwrap(),
        Path::new("/usr/bin/syncthing")
    );
}

#[test]
fn test_binary_falls_back_to_home_bin() {
    let dir = tempdir().unwrap();
    let fallback = dir.path().join("syncthing");

    let err = resolve_daemon_binary_with(None, None, || None, Some(fallback.clone())).unwrap_err();
    assert!(err.to_string().contains("--daemon"));

    fs::write(&fallback, "").unwrap();
    assert_eq!(
        resolve_daemon_binary_with(None, None, || None, Some(fallback.clone())).unwrap(),
        fallback
    );
}

#[test]
fn test_to_yaml_reflects_overrides() {
    let mut config = ShellConfig::default();
    config.status.poll_interval_secs = 42;
    config.daemon.restart_limit = Some(3);

    let yaml = config.to_yaml().unwrap();

    assert!(yaml.contains("poll_interval_secs: 42"));
    assert!(yaml.contains("restart_limit: 3"));
    assert!(yaml.contains("no-browser"));
    let reparsed: ShellConfig = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(reparsed, config);
}
