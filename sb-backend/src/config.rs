use std::{env, fmt};

use runtime::{ParsePriorityError, Priority};
use serde::Deserialize;

pub const ENV_ENGINE_THREAD_NAME: &str = "SB_ENGINE_THREAD_NAME";
pub const ENV_JOB_PRIORITY: &str = "SB_JOB_PRIORITY";
pub const ENV_ENGINE_FLAGS: &str = "SB_ENGINE_FLAGS";

const DEFAULT_ENGINE_THREAD_NAME: &str = "sb-engine";

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub engine_thread_name: String,
    /// Priority of the enable, disable and drain jobs.
    pub job_priority: Priority,
    pub engine_flags: Vec<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            engine_thread_name: DEFAULT_ENGINE_THREAD_NAME.to_string(),
            job_priority: Priority::Default,
            engine_flags: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidJson(serde_json::Error),
    InvalidPriority(ParsePriorityError),
    InvalidThreadName(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidJson(err) => write!(f, "invalid backend config: {err}"),
            ConfigError::InvalidPriority(err) => write!(f, "{ENV_JOB_PRIORITY}: {err}"),
            ConfigError::InvalidThreadName(name) => {
                write!(f, "invalid engine thread name {name:?}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidJson(err) => Some(err),
            ConfigError::InvalidPriority(err) => Some(err),
            ConfigError::InvalidThreadName(_) => None,
        }
    }
}

impl BackendConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(ConfigError::InvalidJson)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(name) = lookup(ENV_ENGINE_THREAD_NAME) {
            config.engine_thread_name = name;
        }
        if let Some(priority) = lookup(ENV_JOB_PRIORITY) {
            config.job_priority = priority.parse().map_err(ConfigError::InvalidPriority)?;
        }
        if let Some(flags) = lookup(ENV_ENGINE_FLAGS) {
            config.engine_flags = flags.split_whitespace().map(str::to_string).collect();
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = &self.engine_thread_name;
        if name.trim().is_empty() || name.contains('\0') {
            return Err(ConfigError::InvalidThreadName(name.clone()));
        }
        Ok(())
    }
}
