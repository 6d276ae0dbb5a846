use envstarter_app::config::{Config, PolicyKind};
use envstarter_desktop::DesktopKind;
use envstarter_launcher::LaunchPolicy;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_config_full_yaml() {
    let config_yaml = r#"
max_containers: 4
poll_interval_ms: 500
grace_period_ms: 1000
stop_timeout_ms: 3000
launch:
  policy: batched
  batch_size: 2
  batch_pause_ms: 0
environments_file: /tmp/envs.json
desktop: hyprland
browser: firefox
"#;

    let config = Config::from_yaml(config_yaml).unwrap();
    assert_eq!(config.max_containers, 4);
    assert_eq!(config.desktop, DesktopKind::Hyprland);
    assert_eq!(config.launch.policy, PolicyKind::Batched);
    assert_eq!(config.launch.policy(), LaunchPolicy::Batched { size: 2 });
    assert_eq!(config.launch.batch_pause(), Duration::ZERO);
    // Unset fields keep their defaults.
    assert_eq!(config.launch.stagger_delay_ms, 2000);
    assert_eq!(config.kill_wait_ms, 2000);

    let supervisor = config.supervisor_settings();
    assert_eq!(supervisor.grace_period, Duration::from_secs(1));
    assert_eq!(supervisor.browser.as_deref(), Some("firefox"));

    let registry = config.registry_settings();
    assert_eq!(registry.max_containers, 4);
    assert_eq!(registry.container.poll_interval, Duration::from_millis(500));
    assert_eq!(registry.container.stop_timeout, Duration::from_secs(3));
    assert_eq!(registry.container.item_spacing, Duration::from_millis(500));
}

#[test]
fn test_config_defaults() {
    let config = Config::default();
    assert_eq!(config.max_containers, 10);
    assert_eq!(config.launch.policy(), LaunchPolicy::Concurrent);
    assert_eq!(config.desktop, DesktopKind::None);
    assert_eq!(config.event_channel_size, 256);
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_validation_rejects_zero_limits() {
    let config = Config::from_yaml("max_containers: 0").unwrap();
    assert!(config.validate().is_err());

    let config = Config::from_yaml("launch:\n  batch_size: 0").unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn test_config_rejects_unknown_policy() {
    assert!(Config::from_yaml("launch:\n  policy: random").is_err());
}

#[test]
fn test_config_load_explicit_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "max_containers: 3\nlaunch:\n  policy: sequential\n").unwrap();

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.max_containers, 3);
    assert_eq!(config.launch.policy(), LaunchPolicy::Sequential);

    let missing = dir.path().join("missing.yaml");
    let err = Config::from_file(&missing).unwrap_err();
    assert!(err.to_string().contains("missing.yaml"));
}

#[test]
fn test_config_round_trips_through_yaml() {
    let mut config = Config::default();
    config.browser = Some("chromium".to_string());
    config.launch.policy = PolicyKind::Staggered;

    let yaml = serde_yaml::to_string(&config).unwrap();
    assert_eq!(Config::from_yaml(&yaml).unwrap(), config);
}
