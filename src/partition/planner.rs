// src/partition/planner.rs

use tracing::debug;

use crate::graph::ActionGraph;

/// Split of one action graph into a locally-run and a remotely-run subset.
///
/// Indices refer to the graph the plan was computed for; both lists are in
/// ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    /// Sink layers peeled off for local execution.
    pub local: Vec<usize>,
    /// Everything else, handed to the distributed backend first.
    pub remote: Vec<usize>,
}

/// Peel up to `max_local` sink actions off the graph for local execution.
///
/// Repeatedly takes the current frontier of unselected actions that nothing
/// unselected depends on, in index order, and simulates their removal by
/// decrementing their prerequisites' dependent counts. Stops when the
/// frontier is empty or the local set has reached `max_local`.
///
/// Every local action only has local dependents, so running the remote set
/// to completion first and the local set afterwards respects all
/// dependencies.
pub fn plan_partition(graph: &ActionGraph, max_local: usize) -> Partition {
    let mut dependents = graph.dependent_counts();
    let mut selected = vec![false; graph.len()];
    let mut local = Vec::new();
    let mut layers = 0usize;

    'layers: while local.len() < max_local {
        let frontier: Vec<usize> = (0..graph.len())
            .filter(|&i| !selected[i] && dependents[i] == 0)
            .collect();
        if frontier.is_empty() {
            break;
        }
        layers += 1;

        for index in frontier {
            if local.len() >= max_local {
                break 'layers;
            }
            selected[index] = true;
            local.push(index);
            for &prerequisite in &graph.actions()[index].prerequisites {
                dependents[prerequisite] = dependents[prerequisite].saturating_sub(1);
            }
        }
    }

    local.sort_unstable();
    let remote: Vec<usize> = (0..graph.len()).filter(|&i| !selected[i]).collect();

    debug!(
        local = local.len(),
        remote = remote.len(),
        layers,
        max_local,
        "partition planned"
    );

    Partition { local, remote }
}
