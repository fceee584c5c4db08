//! Transitive reachability over `uses_by_def`, from a seed set of
//! changed [`ModuleNode`]s to every node that (transitively) uses one
//! of them (§4.4).
//!
//! Expats are skipped as traversal sources: nothing is defined there,
//! so an expat cannot itself be the cause of recompilation.

use crate::{
    fs::FileId,
    module_graph::{ModuleGraph, NodeHandle},
};
use std::collections::HashSet;

/// One step of a recorded trace path, kept only when diagnostics are
/// enabled (Open Question resolution, §9: path bookkeeping is either
/// fully on or fully off, never partially maintained).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracePath {
    pub nodes: Vec<NodeHandle>,
}

pub struct Tracer {
    diagnostics: bool,
    paths: Vec<TracePath>,
}

impl Tracer {
    pub fn new(diagnostics: bool) -> Self {
        Self { diagnostics, paths: Vec::new() }
    }

    pub fn paths(&self) -> &[TracePath] {
        &self.paths
    }

    /// Computes the transitive closure of users of `seeds`, marking
    /// every newly visited node `traced` so later traces in the same
    /// session do not repeat it.
    pub fn trace(&mut self, graph: &mut ModuleGraph, seeds: impl IntoIterator<Item = NodeHandle>) -> HashSet<NodeHandle> {
        let mut visited = HashSet::new();
        let mut stack: Vec<(NodeHandle, Vec<NodeHandle>)> =
            seeds.into_iter().map(|h| (h, vec![h])).collect();

        while let Some((handle, path)) = stack.pop() {
            let Some(node) = graph.node(handle) else { continue };
            if node.is_expat() {
                continue;
            }
            if graph.is_traced(handle) || visited.contains(&handle) {
                continue;
            }
            let def_key = node.key.clone();
            visited.insert(handle);
            graph.mark_traced(handle);

            if self.diagnostics {
                self.record_path(graph, &path);
            }

            for user in graph.uses_of(&def_key).collect::<Vec<_>>() {
                if visited.contains(&user) || graph.is_traced(user) {
                    continue;
                }
                let mut next_path = path.clone();
                next_path.push(user);
                stack.push((user, next_path));
            }
        }

        visited
    }

    fn record_path(&mut self, graph: &ModuleGraph, path: &[NodeHandle]) {
        if let (Some(first), Some(last)) = (path.first(), path.last()) {
            if first != last {
                let first_file = graph.node(*first).and_then(|n| n.source_file);
                let last_file = graph.node(*last).and_then(|n| n.source_file);
                if first_file.is_some() && first_file == last_file {
                    return;
                }
            }
        }
        self.paths.push(TracePath { nodes: path.to_vec() });
    }
}

/// Projects a set of visited node handles to the owning files that
/// must also recompile.
pub fn owning_files(graph: &ModuleGraph, visited: &HashSet<NodeHandle>) -> HashSet<FileId> {
    visited.iter().filter_map(|h| graph.node(*h).and_then(|n| n.source_file)).collect()
}
