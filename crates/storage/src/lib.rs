//! Read access to stored environment definitions.

use envstarter_core::Environment;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Environment not found: {0}")]
    NotFound(String),
    #[error("Cannot determine home directory")]
    NoHomeDir,
    #[error("Invalid environments file {path}: {message}")]
    Invalid { path: PathBuf, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub fn data_dir() -> Result<PathBuf, StorageError> {
    dirs::home_dir()
        .map(|home| home.join(".envstarter"))
        .ok_or(StorageError::NoHomeDir)
}

#[derive(Serialize)]
struct EnvironmentFile<'a> {
    environments: &'a [Environment],
    last_updated: String,
}

/// `environments.json` in the `{"environments": [...]}` layout.
///
/// A bare top-level array is read too. Entries that fail to parse are skipped.
#[derive(Debug, Clone)]
pub struct JsonEnvironmentStore {
    path: PathBuf,
}

impl JsonEnvironmentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.envstarter/environments.json`
    pub fn default_location() -> Result<Self, StorageError> {
        Ok(Self::new(data_dir()?.join("environments.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Vec<Environment>, StorageError> {
        if !self.path.exists() {
            info!("No environments file at {}", self.path.display());
            return Ok(Vec::new());
        }

        let content = tokio::fs::read_to_string(&self.path).await?;
        let value: serde_json::Value = serde_json::from_str(&content)?;
        let entries = match value {
            serde_json::Value::Array(entries) => entries,
            serde_json::Value::Object(mut map) => match map.remove("environments") {
                Some(serde_json::Value::Array(entries)) => entries,
                None => Vec::new(),
                Some(_) => {
                    return Err(StorageError::Invalid {
                        path: self.path.clone(),
                        message: "\"environments\" must be an array".to_string(),
                    })
                }
            },
            _ => {
                return Err(StorageError::Invalid {
                    path: self.path.clone(),
                    message: "expected an object or an array".to_string(),
                })
            }
        };

        let mut environments = Vec::with_capacity(entries.len());
        for (position, entry) in entries.into_iter().enumerate() {
            match serde_json::from_value::<Environment>(entry) {
                Ok(env) => environments.push(env),
                Err(e) => warn!(
                    "Skipping environment #{} in {}: {}",
                    position + 1,
                    self.path.display(),
                    e
                ),
            }
        }
        debug!(
            "Loaded {} environments from {}",
            environments.len(),
            self.path.display()
        );
        Ok(environments)
    }

    /// Look up by id, then by case-insensitive name.
    pub async fn find(&self, key: &str) -> Result<Environment, StorageError> {
        let environments = self.load().await?;
        let wanted = key.trim();
        environments
            .iter()
            .find(|env| env.id == wanted)
            .or_else(|| {
                environments
                    .iter()
                    .find(|env| env.name.eq_ignore_ascii_case(wanted))
            })
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    /// Write atomically through a temporary file.
    pub async fn save(&self, environments: &[Environment]) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = EnvironmentFile {
            environments,
            last_updated: chrono::Utc::now().to_rfc3339(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let tmp_file = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_file, json).await?;
        tokio::fs::rename(&tmp_file, &self.path).await?;
        Ok(())
    }
}
