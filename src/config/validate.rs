// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{ActionGraphError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ActionGraphError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.action))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_actions(cfg)?;
    validate_global_config(cfg)?;
    validate_action_fields(cfg)?;
    validate_prerequisites(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_actions(cfg: &RawConfigFile) -> Result<()> {
    if cfg.action.is_empty() {
        return Err(ActionGraphError::ConfigError(
            "config must contain at least one [action.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.jobs == Some(0) {
        return Err(ActionGraphError::ConfigError(
            "[config].jobs must be >= 1 (got 0)".to_string(),
        ));
    }

    if let Some(max_weight) = cfg.config.max_weight {
        if !max_weight.is_finite() || max_weight <= 0.0 {
            return Err(ActionGraphError::ConfigError(format!(
                "[config].max_weight must be a positive number (got {max_weight})"
            )));
        }
    }

    if cfg.config.stall_threshold_secs == 0 {
        return Err(ActionGraphError::ConfigError(
            "[config].stall_threshold_secs must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_action_fields(cfg: &RawConfigFile) -> Result<()> {
    for (name, action) in cfg.action.iter() {
        if !action.weight.is_finite() || action.weight <= 0.0 {
            return Err(ActionGraphError::ConfigError(format!(
                "action '{}' must have a positive weight (got {})",
                name, action.weight
            )));
        }
        if action.cache && action.outputs.is_empty() {
            return Err(ActionGraphError::ConfigError(format!(
                "action '{}' sets `cache = true` but declares no `outputs`",
                name
            )));
        }
    }
    Ok(())
}

fn validate_prerequisites(cfg: &RawConfigFile) -> Result<()> {
    for (name, action) in cfg.action.iter() {
        for dep in action.after.iter() {
            if !cfg.action.contains_key(dep) {
                return Err(ActionGraphError::ConfigError(format!(
                    "action '{}' has unknown prerequisite '{}' in `after`",
                    name, dep
                )));
            }
            if dep == name {
                return Err(ActionGraphError::ConfigError(format!(
                    "action '{}' cannot depend on itself in `after`",
                    name
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: prerequisite -> action.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.action.keys() {
        graph.add_node(name.as_str());
    }

    for (name, action) in cfg.action.iter() {
        for dep in action.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(ActionGraphError::DagCycle(format!(
                "cycle detected in action graph involving action '{}'",
                node
            )))
        }
    }
}
