//! Ordering of toolchain installs.
//!
//! Toolchains may require each other (a build tool installed from an archive
//! that needs another archive-installed runtime). The order is a topological
//! sort of those edges; among toolchains that are ready at the same time,
//! declaration order wins so the plan is stable.

use std::collections::{BTreeSet, HashMap};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::manifest::{ManifestError, ToolchainDef};

/// Returns the toolchains in install order.
pub fn order_toolchains(toolchains: &[ToolchainDef]) -> Result<Vec<&ToolchainDef>, ManifestError> {
  let mut graph: DiGraph<usize, ()> = DiGraph::new();
  let nodes: Vec<NodeIndex> = (0..toolchains.len()).map(|i| graph.add_node(i)).collect();
  let by_name: HashMap<&str, NodeIndex> = toolchains
    .iter()
    .zip(&nodes)
    .map(|(t, idx)| (t.name.as_str(), *idx))
    .collect();

  for (toolchain, &dependent) in toolchains.iter().zip(&nodes) {
    for requirement in &toolchain.requires {
      // Requirements on packages are satisfied by earlier phases.
      if let Some(&dependency) = by_name.get(requirement.as_str()) {
        graph.add_edge(dependency, dependent, ());
      }
    }
  }

  toposort(&graph, None)
    .map_err(|cycle| ManifestError::DependencyCycle(toolchains[graph[cycle.node_id()]].name.clone()))?;

  let mut in_degree: HashMap<NodeIndex, usize> = nodes
    .iter()
    .map(|&idx| (idx, graph.neighbors_directed(idx, Direction::Incoming).count()))
    .collect();
  let mut ready: BTreeSet<usize> = nodes
    .iter()
    .filter(|idx| in_degree[*idx] == 0)
    .map(|&idx| graph[idx])
    .collect();
  let mut ordered = Vec::with_capacity(toolchains.len());

  while let Some(next) = ready.pop_first() {
    ordered.push(&toolchains[next]);
    for dependent in graph.neighbors_directed(nodes[next], Direction::Outgoing) {
      if let Some(degree) = in_degree.get_mut(&dependent) {
        *degree -= 1;
        if *degree == 0 {
          ready.insert(graph[dependent]);
        }
      }
    }
  }

  Ok(ordered)
}
