use anyhow::{bail, Context, Result};
use envstarter_containers::{ContainerSettings, RegistrySettings, DEFAULT_MAX_CONTAINERS};
use envstarter_core::DEFAULT_EVENT_CHANNEL_SIZE;
use envstarter_desktop::DesktopKind;
use envstarter_launcher::LaunchPolicy;
use envstarter_storage::{data_dir, JsonEnvironmentStore};
use envstarter_supervisor::SupervisorSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for `launch.stagger_delay_ms` (one hour).
pub const MAX_STAGGER_DELAY_MS: u64 = 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    #[default]
    Concurrent,
    Sequential,
    Batched,
    Staggered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    pub policy: PolicyKind,
    pub batch_size: usize,
    pub stagger_delay_ms: u64,
    pub batch_pause_ms: u64,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::Concurrent,
            batch_size: 3,
            stagger_delay_ms: 2000,
            batch_pause_ms: 2000,
        }
    }
}

impl LaunchConfig {
    pub fn policy(&self) -> LaunchPolicy {
        match self.policy {
            PolicyKind::Concurrent => LaunchPolicy::Concurrent,
            PolicyKind::Sequential => LaunchPolicy::Sequential,
            PolicyKind::Batched => LaunchPolicy::Batched {
                size: self.batch_size,
            },
            PolicyKind::Staggered => LaunchPolicy::Staggered {
                delay: Duration::from_millis(self.stagger_delay_ms),
            },
        }
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("launch.batch_size must be at least 1");
        }
        if self.stagger_delay_ms > MAX_STAGGER_DELAY_MS {
            bail!(
                "launch.stagger_delay_ms must be at most {} (got {})",
                MAX_STAGGER_DELAY_MS,
                self.stagger_delay_ms
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub max_containers: usize,
    pub poll_interval_ms: u64,
    pub grace_period_ms: u64,
    pub kill_wait_ms: u64,
    pub stop_timeout_ms: u64,
    pub item_spacing_ms: u64,
    pub launch: LaunchConfig,
    pub environments_file: Option<PathBuf>,
    pub desktop: DesktopKind,
    pub browser: Option<String>,
    pub event_channel_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_containers: DEFAULT_MAX_CONTAINERS,
            poll_interval_ms: 2000,
            grace_period_ms: 5000,
            kill_wait_ms: 2000,
            stop_timeout_ms: 15000,
            item_spacing_ms: 500,
            launch: LaunchConfig::default(),
            environments_file: None,
            desktop: DesktopKind::None,
            browser: None,
            event_channel_size: DEFAULT_EVENT_CHANNEL_SIZE,
        }
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        Ok(data_dir()?.join("config.yaml"))
    }

    /// Load from `path`, or from the default location when it exists.
    ///
    /// Environment overrides are applied and the result validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Self::default_path()?;
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("ENVSTARTER_MAX_CONTAINERS") {
            self.max_containers = value
                .trim()
                .parse()
                .with_context(|| format!("Invalid ENVSTARTER_MAX_CONTAINERS: {}", value))?;
        }
        if let Some(value) = lookup("ENVSTARTER_BROWSER") {
            if !value.trim().is_empty() {
                self.browser = Some(value);
            }
        }
        if let Some(value) = lookup("ENVSTARTER_ENVIRONMENTS") {
            if !value.trim().is_empty() {
                self.environments_file = Some(PathBuf::from(value));
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_containers == 0 {
            bail!("max_containers must be at least 1");
        }
        self.launch.validate()?;
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than 0");
        }
        if self.event_channel_size == 0 {
            bail!("event_channel_size must be at least 1");
        }
        Ok(())
    }

    /// The configured environments file, else the store's default location.
    pub fn environment_store(&self) -> Result<JsonEnvironmentStore> {
        match &self.environments_file {
            Some(path) => Ok(JsonEnvironmentStore::new(path.clone())),
            None => Ok(JsonEnvironmentStore::default_location()?),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            grace_period: Duration::from_millis(self.grace_period_ms),
            kill_wait: Duration::from_millis(self.kill_wait_ms),
            browser: self.browser.clone(),
        }
    }

    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            max_containers: self.max_containers,
            container: ContainerSettings {
                poll_interval: self.poll_interval(),
                item_spacing: Duration::from_millis(self.item_spacing_ms),
                stop_timeout: Duration::from_millis(self.stop_timeout_ms),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(Config::from_yaml("").unwrap(), Config::default());
        assert_eq!(Config::from_yaml("  \n").unwrap(), Config::default());
    }

    #[test]
    fn test_policy_mapping() {
        let mut launch = LaunchConfig {
            policy: PolicyKind::Batched,
            batch_size: 4,
            ..LaunchConfig::default()
        };
        assert_eq!(launch.policy(), LaunchPolicy::Batched { size: 4 });

        launch.policy = PolicyKind::Staggered;
        launch.stagger_delay_ms = 250;
        assert_eq!(
            launch.policy(),
            LaunchPolicy::Staggered {
                delay: Duration::from_millis(250)
            }
        );
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env_overrides(|key| match key {
                "ENVSTARTER_MAX_CONTAINERS" => Some(" 4 ".to_string()),
                "ENVSTARTER_BROWSER" => Some("firefox".to_string()),
                "ENVSTARTER_ENVIRONMENTS" => Some("/tmp/envs.json".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.max_containers, 4);
        assert_eq!(config.browser.as_deref(), Some("firefox"));
        assert_eq!(
            config.environment_store().unwrap().path(),
            Path::new("/tmp/envs.json")
        );

        let mut config = Config::default();
        let err = config
            .apply_env_overrides(|key| {
                (key == "ENVSTARTER_MAX_CONTAINERS").then(|| "many".to_string())
            })
            .unwrap_err();
        assert!(err.to_string().contains("ENVSTARTER_MAX_CONTAINERS"));
    }

    #[test]
    fn test_unset_environments_file_uses_store_default() {
        let Ok(expected) = JsonEnvironmentStore::default_location() else {
            return;
        };
        let store = Config::default().environment_store().unwrap();
        assert_eq!(store.path(), expected.path());
        assert!(store.path().ends_with(".envstarter/environments.json"));
    }

    #[test]
    fn test_stagger_delay_is_bounded() {
        let mut launch = LaunchConfig {
            stagger_delay_ms: MAX_STAGGER_DELAY_MS,
            ..LaunchConfig::default()
        };
        assert!(launch.validate().is_ok());

        launch.stagger_delay_ms = u64::MAX;
        let err = launch.validate().unwrap_err();
        assert!(err.to_string().contains("stagger_delay_ms"));
    }
}
