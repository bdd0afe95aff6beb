// src/graph/arena.rs

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

use crate::config::model::ConfigFile;
use crate::errors::{ActionGraphError, Result};
use crate::graph::action::Action;

/// Arena of actions addressed by dense integer index.
///
/// Each action knows its prerequisites; dependents are derived on demand.
/// Construction checks that indices are dense and every prerequisite is in
/// range. Acyclicity is a precondition of the graph builder: config files
/// are checked in `config::validate`, and the engine turns a cyclic graph
/// into a starved run that fails instead of hanging.
#[derive(Debug, Clone, Default)]
pub struct ActionGraph {
    actions: Vec<Action>,
}

impl ActionGraph {
    pub fn new(actions: Vec<Action>) -> Result<Self> {
        for (position, action) in actions.iter().enumerate() {
            if action.index != position {
                return Err(ActionGraphError::NonDenseIndex {
                    position,
                    index: action.index,
                });
            }
            for &prerequisite in &action.prerequisites {
                if prerequisite >= actions.len() || prerequisite == position {
                    return Err(ActionGraphError::UnknownPrerequisite {
                        action: position,
                        prerequisite,
                    });
                }
            }
        }

        Ok(Self { actions })
    }

    /// Build the graph from a validated [`ConfigFile`].
    ///
    /// Actions are indexed in the (sorted) order of their names.
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        let index_of: HashMap<&str, usize> = cfg
            .action
            .keys()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        let mut actions = Vec::with_capacity(cfg.action.len());

        for (index, (name, ac)) in cfg.action.iter().enumerate() {
            let mut prerequisites = Vec::with_capacity(ac.after.len());
            for dep in &ac.after {
                let dep_index = index_of.get(dep.as_str()).copied().ok_or_else(|| {
                    ActionGraphError::ConfigError(format!(
                        "action '{name}' has unknown prerequisite '{dep}'"
                    ))
                })?;
                prerequisites.push(dep_index);
            }

            let mut action = Action::new(index, name.clone())
                .with_prerequisites(prerequisites)
                .with_weight(ac.weight)
                .with_artifact_check(ac.cache && cfg.config.cache);
            if let Some(ref cmd) = ac.cmd {
                action = action.with_command(cmd.clone());
            }
            if let Some(ref description) = ac.description {
                action = action.with_description(description.clone());
            }
            action.inputs = ac.inputs.iter().map(Into::into).collect();
            action.outputs = ac.outputs.iter().map(Into::into).collect();

            actions.push(action);
        }

        Self::new(actions)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn get(&self, index: usize) -> Option<&Action> {
        self.actions.get(index)
    }

    /// Look up an action by name (linear; intended for tests and tooling).
    pub fn find(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// For every action, the number of actions listing it as a prerequisite.
    pub fn dependent_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.actions.len()];
        for action in &self.actions {
            for &prerequisite in &action.prerequisites {
                counts[prerequisite] += 1;
            }
        }
        counts
    }

    /// Extract the given actions into a new, densely re-indexed graph.
    ///
    /// Prerequisites outside the subset are dropped: the caller guarantees
    /// they have already completed (e.g. in an earlier partition phase).
    /// Actions keep their relative order.
    pub fn subset(&self, indices: &[usize]) -> ActionGraph {
        let mut sorted: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|&i| i < self.actions.len())
            .collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut remap: Vec<Option<usize>> = vec![None; self.actions.len()];
        for (new_index, &old_index) in sorted.iter().enumerate() {
            remap[old_index] = Some(new_index);
        }

        let actions = sorted
            .iter()
            .enumerate()
            .map(|(new_index, &old_index)| {
                let mut action = self.actions[old_index].clone();
                action.index = new_index;
                action.prerequisites = action
                    .prerequisites
                    .iter()
                    .filter_map(|&p| remap[p])
                    .collect();
                action
            })
            .collect();

        ActionGraph { actions }
    }

    /// Indices in a dependency-respecting order.
    ///
    /// Fails with [`ActionGraphError::DagCycle`] if the graph has a cycle.
    pub fn topological_order(&self) -> Result<Vec<usize>> {
        // Edge direction: prerequisite -> dependent.
        let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(self.len(), 0);
        let nodes: Vec<_> = (0..self.len()).map(|i| graph.add_node(i)).collect();

        for action in &self.actions {
            for &prerequisite in &action.prerequisites {
                graph.add_edge(nodes[prerequisite], nodes[action.index], ());
            }
        }

        match toposort(&graph, None) {
            Ok(order) => Ok(order.into_iter().map(|n| graph[n]).collect()),
            Err(cycle) => {
                let index = graph[cycle.node_id()];
                Err(ActionGraphError::DagCycle(format!(
                    "cycle detected in action graph involving action '{}'",
                    self.actions[index].name
                )))
            }
        }
    }
}
