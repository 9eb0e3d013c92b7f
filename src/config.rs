use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path};

use crate::{Error, InternalResult};

/// Top-level configuration for a pubsub registry and the connectors bound to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PubSubConfig {
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    #[serde(default = "default_true")]
    pub report_missing_listeners: bool,

    #[serde(default)]
    pub connector: ConnectorOptions,
}

/// What `publish` does when a listener fails mid-batch.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailurePolicy {
    /// The first failing listener aborts the remaining listeners of the batch.
    #[default]
    AbortBatch,
    /// Every listener runs; the first failure is returned once the batch is done.
    Isolate,
}

/// Per-connector options.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectorOptions {
    /// Keep the wrapped component reachable through `wrapped_instance()`.
    #[serde(default)]
    pub with_ref: bool,

    /// Pass the owner props as trailing argument to props-dependent transformers.
    #[serde(default = "default_true")]
    pub own_props: bool,

    /// Replay every static mapping entry with its initial values on mount.
    #[serde(default)]
    pub force_initial_values: bool,
}

impl Default for ConnectorOptions {
    fn default() -> Self {
        Self {
            with_ref: false,
            own_props: default_true(),
            force_initial_values: false,
        }
    }
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            report_missing_listeners: default_true(),
            connector: ConnectorOptions::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> InternalResult<T> {
    let file = File::open(path)
        .map_err(|e| Error::Config(format!("Failed to open config file: {}", e)))?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)
        .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;
    Ok(config)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> InternalResult<T> {
    let config = serde_json::from_str(s)
        .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}

impl PubSubConfig {
    // JSONファイルから設定を読み込む
    pub fn from_file<P: AsRef<Path>>(path: P) -> InternalResult<Self> {
        from_file(path)
    }

    pub fn from_json_str(s: &str) -> InternalResult<Self> {
        from_str(s)
    }
}
