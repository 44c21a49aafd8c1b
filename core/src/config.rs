//! Layered configuration: defaults, then a JSON file, then `TASKFLOW_*`
//! environment variables (`__` separates nested keys).

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Json, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskflowError};
use crate::storage::firestore::{DEFAULT_FIRESTORE_ENDPOINT, DEFAULT_IDENTITY_ENDPOINT};
use crate::storage::kv::default_data_dir;

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const ENV_PREFIX: &str = "TASKFLOW_";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    /// Defaults to `~/.taskflow`.
    pub data_dir: Option<PathBuf>,
    pub log_level: String,
    pub remote_timeout_secs: u64,
    /// Without it every service runs local-only.
    pub remote: Option<RemoteConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RemoteConfig {
    pub project_id: String,
    pub api_key: String,
    #[serde(default = "default_firestore_endpoint")]
    pub firestore_endpoint: String,
    #[serde(default = "default_identity_endpoint")]
    pub identity_endpoint: String,
}

fn default_firestore_endpoint() -> String {
    DEFAULT_FIRESTORE_ENDPOINT.to_string()
}

fn default_identity_endpoint() -> String {
    DEFAULT_IDENTITY_ENDPOINT.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            log_level: "warn".to_string(),
            remote_timeout_secs: 10,
            remote: None,
        }
    }
}

impl Config {
    /// Loads from `path`, or from `config.json` in the default data
    /// directory when no path is given. A missing file is skipped.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => p.to_path_buf(),
            None => default_data_dir(None)?.join(CONFIG_FILE_NAME),
        };
        let config: Config = Self::figment(&file)
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| TaskflowError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults and file only; the environment is not consulted.
    pub fn from_file(path: &Path) -> Result<Self> {
        let config: Config = Self::figment(path)
            .extract()
            .map_err(|e| TaskflowError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn figment(file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::default())).merge(Json::file(file))
    }

    pub fn validate(&self) -> Result<()> {
        if self.remote_timeout_secs == 0 {
            return Err(TaskflowError::Config(
                "remote_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if let Some(remote) = &self.remote {
            if remote.project_id.trim().is_empty() || remote.api_key.trim().is_empty() {
                return Err(TaskflowError::Config(
                    "remote.project_id and remote.api_key are required".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        default_data_dir(self.data_dir.clone())
    }
}
