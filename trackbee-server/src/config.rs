use std::{
    collections::HashMap,
    path::Path,
};

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
#[error("config error")]
pub enum ConfigError {
    Io(#[from] std::io::Error),
    Parse(#[from] serde_json::Error),
}

/// Server configuration, one JSON file.
///
/// ```json
/// {
///     "listeners": [
///         { "protocol": "gt06", "transport": "tcp", "port": 5023 },
///         { "protocol": "vektor", "transport": "udp", "port": 5027,
///           "options": { "include_adc": true } },
///         { "protocol": "osmand", "transport": "http", "port": 5055 }
///     ],
///     "devices": { "123456789012345": 1 },
///     "accept_unknown": false
/// }
/// ```
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub listeners: Vec<ListenerConfig>,

    /// Known devices: unique identifier to device id.
    #[serde(default)]
    pub devices: HashMap<String, u64>,

    /// Auto-register devices the resolver has never seen instead of
    /// dropping their messages.
    #[serde(default)]
    pub accept_unknown: bool,

    /// Capacity of the position queue towards persistence.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    1024
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListenerConfig {
    pub protocol: String,
    pub transport: Transport,
    pub port: u16,

    /// Protocol-specific options, passed to the module at construction.
    #[serde(default)]
    pub options: serde_json::Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
    Udp,
    Http,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}
