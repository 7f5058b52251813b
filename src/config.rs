// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::error::{LockError, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "mglock.toml";
const ENV_PREFIX: &str = "MGLOCK";
const DEFAULT_STEP_TIMEOUT_MS: u64 = 2000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MglockConfig {
    #[serde(default)]
    pub runner: RunnerConfig,

    #[serde(default)]
    pub replay: ReplayConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// How long a step may run before the runner declares it stuck.
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,

    /// How often the runner samples a worker while waiting for it.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            step_timeout_ms: DEFAULT_STEP_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl RunnerConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayConfig {
    #[serde(default = "default_record_events")]
    pub record_events: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            record_events: default_record_events(),
        }
    }
}

fn default_step_timeout_ms() -> u64 {
    DEFAULT_STEP_TIMEOUT_MS
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_record_events() -> bool {
    true
}

impl MglockConfig {
    /// Loads the configuration: built-in defaults, then the TOML file at `path` (or
    /// `mglock.toml` in the working directory when it exists), then `MGLOCK_*`
    /// environment variables such as `MGLOCK_RUNNER__STEP_TIMEOUT_MS`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).format(FileFormat::Toml).required(true),
            None => File::with_name(CONFIG_FILE_NAME)
                .format(FileFormat::Toml)
                .required(false),
        };

        let config = Config::builder()
            .set_default("runner.step_timeout_ms", DEFAULT_STEP_TIMEOUT_MS)
            .and_then(|builder| {
                builder.set_default("runner.poll_interval_ms", DEFAULT_POLL_INTERVAL_MS)
            })
            .and_then(|builder| builder.set_default("replay.record_events", true))
            .map_err(|e| LockError::ConfigError(format!("Failed to set defaults: {e}")))?
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| LockError::ConfigError(format!("Failed to load configuration: {e}")))?;

        let loaded: MglockConfig = config
            .try_deserialize()
            .map_err(|e| LockError::ConfigError(format!("Invalid configuration: {e}")))?;

        log::debug!("Loaded config: {loaded:?}");
        Ok(loaded)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| LockError::ConfigError(format!("Failed to serialize config: {e}")))?;

        fs::write(path, contents)?;
        log::debug!("Saved config to {path:?}");
        Ok(())
    }
}
