/*!
config.rs - runtime configuration handed to the dispatch engine.

Sources, highest precedence first:
  1. CLI flags
  2. Environment (ASX_SERVER, ASX_TYPE, ASX_BRIDGE)
  3. Config file (--config, YAML or JSON)

`Config` is read-only once dispatch starts.
*/

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const ENV_SERVER: &str = "ASX_SERVER";
pub const ENV_TYPE: &str = "ASX_TYPE";
pub const ENV_BRIDGE: &str = "ASX_BRIDGE";

/// Username/password pair. Only ever built when both halves are present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub principal: String,
    pub secret: String,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub command: Option<String>,
    pub server: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub protocol: Option<String>,
    pub server_type: Option<String>,
    pub verbose: bool,
    pub json: bool,
    pub connect_timeout: Option<Duration>,
    /// Command line of the naming bridge process.
    pub bridge: Option<String>,
}

impl Config {
    /// Credentials are attached only when username and password are both set.
    /// A half-filled pair is treated as no credentials at all.
    pub fn credentials(&self) -> Option<Credentials> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) => Some(Credentials {
                principal: user.to_string(),
                secret: pass.to_string(),
            }),
            _ => None,
        }
    }

    /// True when exactly one of username/password was supplied.
    pub fn has_partial_credentials(&self) -> bool {
        self.username.is_some() != self.password.is_some()
    }

    /// Fill unset fields from the environment. `lookup` is injectable for tests.
    pub fn fill_from_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if self.server.is_none() {
            self.server = get(ENV_SERVER);
        }
        if self.server_type.is_none() {
            self.server_type = get(ENV_TYPE);
        }
        if self.bridge.is_none() {
            self.bridge = get(ENV_BRIDGE);
        }
    }

    /// Fill unset fields from a parsed config file.
    pub fn fill_from_file(&mut self, file: ConfigFile) {
        fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
            if slot.is_none() {
                *slot = value;
            }
        }
        fill(&mut self.server, file.server);
        fill(&mut self.server_type, file.server_type);
        fill(&mut self.username, file.username);
        fill(&mut self.password, file.password);
        fill(&mut self.protocol, file.protocol);
        fill(&mut self.bridge, file.bridge);
        fill(
            &mut self.connect_timeout,
            file.connect_timeout.map(Duration::from_secs),
        );
    }
}

/// On-disk configuration (YAML or JSON).
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub server: Option<String>,
    #[serde(rename = "type")]
    pub server_type: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub protocol: Option<String>,
    /// Seconds.
    pub connect_timeout: Option<u64>,
    pub bridge: Option<String>,
}

/// Load a config file. `.yaml`/`.yml` are parsed as YAML, anything else as JSON.
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let lower = path.to_string_lossy().to_ascii_lowercase();

    let value: serde_json::Value = if lower.ends_with(".yaml") || lower.ends_with(".yml") {
        let yaml_v: serde_yaml::Value =
            serde_yaml::from_str(&raw).context("failed to parse YAML config file")?;
        serde_json::to_value(yaml_v).context("failed to convert YAML to JSON")?
    } else {
        serde_json::from_str(&raw).context("failed to parse JSON config file")?
    };

    if !value.is_object() {
        anyhow::bail!("config file root must be an object");
    }
    serde_json::from_value(value).context("invalid config file contents")
}
