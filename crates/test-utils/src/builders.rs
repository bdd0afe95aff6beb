use std::collections::{BTreeMap, HashMap};

use actiongraph::config::{ActionConfig, ConfigFile, ConfigSection, RawConfigFile};
use actiongraph::graph::{Action, ActionGraph};

/// Builds an `ActionGraph` by name, in insertion order.
///
/// ```ignore
/// let graph = GraphBuilder::new()
///     .action("a", &[])
///     .action("b", &["a"])
///     .build();
/// ```
#[derive(Default)]
pub struct GraphBuilder {
    actions: Vec<Action>,
    index_of: HashMap<String, usize>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an action that depends on `after` (which must already exist).
    pub fn action(self, name: &str, after: &[&str]) -> Self {
        self.add(name, after, |a| a)
    }

    pub fn weighted(self, name: &str, after: &[&str], weight: f64) -> Self {
        self.add(name, after, |a| a.with_weight(weight))
    }

    /// Add an action that starts in the artifact-check phase.
    pub fn cached(self, name: &str, after: &[&str]) -> Self {
        self.add(name, after, |a| a.with_artifact_check(true))
    }

    pub fn add(mut self, name: &str, after: &[&str], edit: impl FnOnce(Action) -> Action) -> Self {
        let index = self.actions.len();
        let prerequisites: Vec<usize> = after
            .iter()
            .map(|dep| {
                *self
                    .index_of
                    .get(*dep)
                    .unwrap_or_else(|| panic!("'{dep}' must be added before '{name}'"))
            })
            .collect();

        let action = edit(Action::new(index, name).with_prerequisites(prerequisites));
        self.index_of.insert(name.to_string(), index);
        self.actions.push(action);
        self
    }

    pub fn build(self) -> ActionGraph {
        ActionGraph::new(self.actions).expect("builder produced an invalid graph")
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                action: BTreeMap::new(),
            },
        }
    }

    pub fn with_action(mut self, name: &str, action: ActionConfig) -> Self {
        self.config.action.insert(name.to_string(), action);
        self
    }

    pub fn with_local_sinks(mut self, k: usize) -> Self {
        self.config.config.local_sinks = k;
        self
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.config.config.cache = enabled;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ActionConfig`.
pub struct ActionConfigBuilder {
    action: ActionConfig,
}

impl ActionConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            action: ActionConfig::new(cmd),
        }
    }

    pub fn phony() -> Self {
        Self {
            action: ActionConfig {
                cmd: None,
                ..ActionConfig::new("")
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.action.after.push(dep.to_string());
        self
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.action.weight = weight;
        self
    }

    pub fn cache(mut self, inputs: &[&str], outputs: &[&str]) -> Self {
        self.action.cache = true;
        self.action.inputs = inputs.iter().map(|s| s.to_string()).collect();
        self.action.outputs = outputs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn build(self) -> ActionConfig {
        self.action
    }
}
