//! Merges one [`PerFileGraph`] into a [`ModuleGraph`], computing the
//! set of nodes whose presence/fingerprint/owner changed (§4.3).
//!
//! One [`Integrator`] invocation corresponds to one file's artifact;
//! it is not re-entrant across files.

use crate::{
    dep_key::DependencyKey,
    error::Result,
    fs::FileId,
    module_graph::{ModuleGraph, ModuleNode, NodeHandle},
    per_file_graph::PerFileGraph,
};
use std::collections::HashSet;

/// Runs the merge algorithm of §4.3 for file `file`'s freshly parsed
/// artifact, returning the handles of every node whose
/// presence/fingerprint/owner changed this invocation.
#[tracing::instrument(skip(graph, per_file))]
pub fn integrate(graph: &mut ModuleGraph, file: FileId, per_file: &PerFileGraph) -> Result<Vec<NodeHandle>> {
    let mut changed = Vec::new();

    let mut disappeared: HashSet<DependencyKey> = graph.keys_for_file(Some(file)).into_iter().collect();

    // sequence_number -> (key, handle) for provides nodes created/found this pass,
    // so arcs can be resolved by sequence number regardless of match precedence.
    let mut handles_by_sequence: Vec<Option<NodeHandle>> = vec![None; per_file.nodes.len()];

    for (seq, source_node) in per_file.nodes.iter().enumerate() {
        if !source_node.is_provides {
            continue;
        }
        let key = source_node.key.clone();

        let handle = if let Some(existing) = graph.find_handle(Some(file), &key) {
            // here: already attributed to this file.
            disappeared.remove(&key);
            let existing_node = graph.node(existing).unwrap();
            if existing_node.fingerprint != source_node.fingerprint {
                graph.replace(existing, Some(file), source_node.fingerprint.clone())?;
                changed.push(existing);
            }
            existing
        } else if let Some(expat) = graph.find_expat(&key) {
            // expat: relocate to this file, genuine discovery of provenance.
            graph.replace(expat, Some(file), source_node.fingerprint.clone())?;
            changed.push(expat);
            expat
        } else {
            // none: brand new node.
            let node = ModuleNode { key: key.clone(), fingerprint: source_node.fingerprint.clone(), source_file: Some(file) };
            graph.insert(node)?;
            let handle = graph.find_handle(Some(file), &key).unwrap();
            changed.push(handle);
            handle
        };
        handles_by_sequence[seq] = Some(handle);
    }

    for (seq, source_node) in per_file.nodes.iter().enumerate() {
        let Some(def_handle) = handles_by_sequence[seq] else { continue };
        for &dep_seq in &source_node.depends_on {
            let Some(dep_node) = per_file.nodes.get(dep_seq as usize) else { continue };
            if dep_node.key.is_external_depend() {
                if let Some(filename) = dep_node.key.external_depend_filename() {
                    graph.insert_external_dependency(filename);
                }
            } else if !graph.has_node_for_key(&dep_node.key) {
                // expat: referenced by a use arc before any file has
                // been observed to provide it. `find_expat`/`replace`
                // picks this placeholder up once a file genuinely
                // provides the key (§3).
                graph.insert(ModuleNode { key: dep_node.key.clone(), fingerprint: None, source_file: None })?;
            }
            let is_new = graph.record_use(&dep_node.key, def_handle);
            if dep_node.key.is_external_depend() && is_new {
                changed.push(def_handle);
            }
        }
    }

    for key in disappeared {
        if let Some(handle) = graph.find_handle(Some(file), &key) {
            graph.remove(handle);
            changed.push(handle);
        }
    }

    let changed: HashSet<NodeHandle> = changed.into_iter().collect();
    for &handle in &changed {
        graph.clear_traced(handle);
    }

    Ok(changed.into_iter().collect())
}
