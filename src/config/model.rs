// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

/// Raw configuration as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// jobs = 8
/// local_sinks = 2
///
/// [action.compile_a]
/// cmd = "cc -c a.c -o a.o"
/// cache = true
/// inputs = ["a.c"]
/// outputs = ["a.o"]
///
/// [action.link]
/// cmd = "cc a.o -o app"
/// after = ["compile_a"]
/// weight = 2.0
/// ```
///
/// All sections are optional and have reasonable defaults; validation
/// requires at least one action.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    /// Global scheduling config from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// All actions from `[action.<name>]`, keyed by action name.
    #[serde(default)]
    pub action: BTreeMap<String, ActionConfig>,
}

/// Validated configuration.
///
/// Only obtainable through `ConfigFile::try_from(RawConfigFile)`, which runs
/// the checks in `config::validate`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub action: BTreeMap<String, ActionConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        action: BTreeMap<String, ActionConfig>,
    ) -> Self {
        Self { config, action }
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Maximum number of concurrently running compile actions.
    ///
    /// `None` means "use the available parallelism of this machine".
    #[serde(default)]
    pub jobs: Option<usize>,

    /// Optional cap on the summed weight of concurrently running actions.
    #[serde(default)]
    pub max_weight: Option<f64>,

    /// How many sink actions to peel off for local execution when
    /// partitioning; `0` disables partitioning.
    #[serde(default)]
    pub local_sinks: usize,

    /// Stop dispatching new actions after the first failure.
    #[serde(default)]
    pub stop_on_error: bool,

    /// Whether per-action `cache = true` is honoured at all.
    #[serde(default = "default_cache")]
    pub cache: bool,

    /// Seconds without any state change before a stall report is emitted.
    #[serde(default = "default_stall_threshold_secs")]
    pub stall_threshold_secs: u64,

    /// Seconds without any state change (and nothing running) before the
    /// run is force-failed. `0` disables this.
    #[serde(default)]
    pub stall_abort_secs: u64,
}

fn default_cache() -> bool {
    true
}

fn default_stall_threshold_secs() -> u64 {
    30
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            jobs: None,
            max_weight: None,
            local_sinks: 0,
            stop_on_error: false,
            cache: default_cache(),
            stall_threshold_secs: default_stall_threshold_secs(),
            stall_abort_secs: 0,
        }
    }
}

/// `[action.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionConfig {
    /// The command to execute; omit for phony grouping actions.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Names of actions that must finish before this one runs.
    #[serde(default)]
    pub after: Vec<String>,

    /// Relative resource cost (default `1.0`).
    #[serde(default = "default_weight")]
    pub weight: f64,

    /// Check the artifact cache before compiling.
    #[serde(default)]
    pub cache: bool,

    /// Files whose contents feed the artifact fingerprint.
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Files that must exist for an artifact-cache hit.
    #[serde(default)]
    pub outputs: Vec<String>,

    #[serde(default)]
    pub description: Option<String>,
}

fn default_weight() -> f64 {
    1.0
}

impl ActionConfig {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: Some(cmd.into()),
            after: Vec::new(),
            weight: default_weight(),
            cache: false,
            inputs: Vec::new(),
            outputs: Vec::new(),
            description: None,
        }
    }
}
