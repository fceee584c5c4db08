//! The module-wide dependency graph: an in-memory union of every
//! per-file graph integrated so far, plus the two-key index
//! ([`ModuleGraph`]) that lets callers look a node up by file or by key
//! (§4.2).
//!
//! Nodes live in an arena and are addressed by a stable [`NodeHandle`]
//! rather than passed around by value, so `uses_by_def` can record
//! arcs between nodes without the aliasing headaches of cyclic owned
//! structures.

use crate::{
    dep_key::DependencyKey,
    error::{Error, Result},
    fs::FileId,
};
use std::collections::{HashMap, HashSet};

/// Stable address of a [`ModuleNode`] inside a [`ModuleGraph`]'s arena.
/// Never reused: `remove` tombstones the slot rather than recycling it,
/// so a handle taken before a removal can safely be detected as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeHandle(u32);

/// The union-graph counterpart of a provides node (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleNode {
    pub key: DependencyKey,
    pub fingerprint: Option<String>,
    /// `None` means "expat": referenced by some use arc but not
    /// (yet) provided by any observed file.
    pub source_file: Option<FileId>,
}

impl ModuleNode {
    pub fn is_expat(&self) -> bool {
        self.source_file.is_none()
    }

    fn validate(&self) -> Result<()> {
        if self.source_file.is_none() && self.fingerprint.is_some() {
            return Err(Error::GraphInvariantViolation(
                "expat node must not carry a fingerprint".into(),
            ));
        }
        Ok(())
    }
}

enum Slot {
    Occupied(ModuleNode),
    Tombstone,
}

#[derive(Default)]
struct Arena {
    slots: Vec<Slot>,
}

impl Arena {
    fn insert(&mut self, node: ModuleNode) -> NodeHandle {
        let handle = NodeHandle(self.slots.len() as u32);
        self.slots.push(Slot::Occupied(node));
        handle
    }

    fn get(&self, handle: NodeHandle) -> Option<&ModuleNode> {
        match self.slots.get(handle.0 as usize) {
            Some(Slot::Occupied(node)) => Some(node),
            _ => None,
        }
    }

    fn get_mut(&mut self, handle: NodeHandle) -> Option<&mut ModuleNode> {
        match self.slots.get_mut(handle.0 as usize) {
            Some(Slot::Occupied(node)) => Some(node),
            _ => None,
        }
    }

    fn remove(&mut self, handle: NodeHandle) -> Option<ModuleNode> {
        match self.slots.get_mut(handle.0 as usize) {
            Some(slot @ Slot::Occupied(_)) => match std::mem::replace(slot, Slot::Tombstone) {
                Slot::Occupied(node) => Some(node),
                Slot::Tombstone => unreachable!(),
            },
            _ => None,
        }
    }
}

/// The two-dimensional index over every [`ModuleNode`] observed so far,
/// plus the use-arc multimap and the external-dependency/traced sets
/// (§3/§4.2).
#[derive(Default)]
pub struct ModuleGraph {
    arena: Arena,
    by_key_then_file: HashMap<DependencyKey, HashMap<Option<FileId>, NodeHandle>>,
    by_file_then_key: HashMap<Option<FileId>, HashMap<DependencyKey, NodeHandle>>,
    uses_by_def: HashMap<DependencyKey, HashSet<NodeHandle>>,
    external_dependencies: HashSet<String>,
    traced: HashSet<NodeHandle>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, file: Option<FileId>, key: &DependencyKey) -> Option<&ModuleNode> {
        let handle = *self.by_file_then_key.get(&file)?.get(key)?;
        self.arena.get(handle)
    }

    pub fn find_handle(&self, file: Option<FileId>, key: &DependencyKey) -> Option<NodeHandle> {
        self.by_file_then_key.get(&file)?.get(key).copied()
    }

    pub fn find_by_file(&self, file: Option<FileId>) -> Option<HashMap<DependencyKey, &ModuleNode>> {
        let keys = self.by_file_then_key.get(&file)?;
        Some(keys.iter().filter_map(|(k, h)| self.arena.get(*h).map(|n| (k.clone(), n))).collect())
    }

    pub fn find_by_key(&self, key: &DependencyKey) -> Option<HashMap<Option<FileId>, &ModuleNode>> {
        let files = self.by_key_then_file.get(key)?;
        Some(files.iter().filter_map(|(f, h)| self.arena.get(*h).map(|n| (*f, n))).collect())
    }

    /// The sole node with `key`, if it is currently an expat.
    pub fn find_expat(&self, key: &DependencyKey) -> Option<NodeHandle> {
        let handle = self.find_handle(None, key)?;
        self.arena.get(handle).filter(|n| n.is_expat()).map(|_| handle)
    }

    /// Whether any node, file-owned or expat, currently exists for `key`.
    pub fn has_node_for_key(&self, key: &DependencyKey) -> bool {
        self.by_key_then_file.get(key).map(|files| !files.is_empty()).unwrap_or(false)
    }

    /// Inserts a node, returning any prior occupant at the same
    /// `(file, key)` position (expected `None`, per §4.2).
    pub fn insert(&mut self, node: ModuleNode) -> Result<Option<ModuleNode>> {
        node.validate()?;
        let file = node.source_file;
        let key = node.key.clone();
        let handle = self.arena.insert(node);
        let prior = self.by_file_then_key.entry(file).or_default().insert(key.clone(), handle);
        self.by_key_then_file.entry(key).or_default().insert(file, handle);
        Ok(prior.and_then(|h| self.arena.get(h).cloned()))
    }

    /// Records a def→use arc. Returns `true` if the arc is new.
    pub fn record_use(&mut self, def_key: &DependencyKey, use_node: NodeHandle) -> bool {
        self.uses_by_def.entry(def_key.clone()).or_default().insert(use_node)
    }

    /// Relocates an existing node to a different owning file and/or
    /// updates its fingerprint, returning the updated node.
    pub fn replace(
        &mut self,
        handle: NodeHandle,
        new_file: Option<FileId>,
        new_fingerprint: Option<String>,
    ) -> Result<ModuleNode> {
        let key = self
            .arena
            .get(handle)
            .ok_or_else(|| Error::GraphInvariantViolation("replace on unknown node handle".into()))?
            .key
            .clone();
        let old_file = self.arena.get(handle).unwrap().source_file;

        if let Some(by_file) = self.by_file_then_key.get_mut(&old_file) {
            by_file.remove(&key);
        }
        if let Some(by_key) = self.by_key_then_file.get_mut(&key) {
            by_key.remove(&old_file);
        }

        {
            let node = self.arena.get_mut(handle).unwrap();
            node.source_file = new_file;
            node.fingerprint = new_fingerprint;
            node.validate()?;
        }

        self.by_file_then_key.entry(new_file).or_default().insert(key.clone(), handle);
        self.by_key_then_file.entry(key).or_default().insert(new_file, handle);

        Ok(self.arena.get(handle).unwrap().clone())
    }

    /// Removes a node from both indexes and from `uses_by_def`.
    pub fn remove(&mut self, handle: NodeHandle) -> Option<ModuleNode> {
        let node = self.arena.remove(handle)?;
        if let Some(by_file) = self.by_file_then_key.get_mut(&node.source_file) {
            by_file.remove(&node.key);
        }
        if let Some(by_key) = self.by_key_then_file.get_mut(&node.key) {
            by_key.remove(&node.source_file);
        }
        for uses in self.uses_by_def.values_mut() {
            uses.remove(&handle);
        }
        self.traced.remove(&handle);
        Some(node)
    }

    pub fn node(&self, handle: NodeHandle) -> Option<&ModuleNode> {
        self.arena.get(handle)
    }

    pub fn uses_of(&self, def_key: &DependencyKey) -> impl Iterator<Item = NodeHandle> + '_ {
        self.uses_by_def.get(def_key).into_iter().flatten().copied()
    }

    pub fn insert_external_dependency(&mut self, filename: impl Into<String>) {
        self.external_dependencies.insert(filename.into());
    }

    pub fn external_dependencies(&self) -> &HashSet<String> {
        &self.external_dependencies
    }

    pub fn is_traced(&self, handle: NodeHandle) -> bool {
        self.traced.contains(&handle)
    }

    pub fn mark_traced(&mut self, handle: NodeHandle) {
        self.traced.insert(handle);
    }

    pub fn clear_traced(&mut self, handle: NodeHandle) {
        self.traced.remove(&handle);
    }

    pub fn keys_for_file(&self, file: Option<FileId>) -> Vec<DependencyKey> {
        self.by_file_then_key.get(&file).map(|m| m.keys().cloned().collect()).unwrap_or_default()
    }

    /// Debug-mode invariant check (§4.2): the two indexes agree, every
    /// use-node is present in both indexes, and no use-node is expat.
    pub fn verify(&self) -> Result<()> {
        for (key, files) in &self.by_key_then_file {
            for (file, handle) in files {
                let by_file_handle = self
                    .by_file_then_key
                    .get(file)
                    .and_then(|m| m.get(key))
                    .copied();
                if by_file_handle != Some(*handle) {
                    return Err(Error::GraphInvariantViolation(format!(
                        "index disagreement for key {key:?} file {file:?}"
                    )));
                }
            }
        }
        for (file, keys) in &self.by_file_then_key {
            for (key, handle) in keys {
                let by_key_handle = self
                    .by_key_then_file
                    .get(key)
                    .and_then(|m| m.get(file))
                    .copied();
                if by_key_handle != Some(*handle) {
                    return Err(Error::GraphInvariantViolation(format!(
                        "index disagreement for file {file:?} key {key:?}"
                    )));
                }
            }
        }
        for uses in self.uses_by_def.values() {
            for handle in uses {
                let node = self
                    .arena
                    .get(*handle)
                    .ok_or_else(|| Error::GraphInvariantViolation("use arc points at removed node".into()))?;
                let present = self
                    .by_file_then_key
                    .get(&node.source_file)
                    .map(|m| m.get(&node.key) == Some(handle))
                    .unwrap_or(false);
                if !present {
                    return Err(Error::GraphInvariantViolation("use node missing from index".into()));
                }
                if node.is_expat() {
                    return Err(Error::GraphInvariantViolation("expat node used as a use-arc target".into()));
                }
            }
        }
        Ok(())
    }
}
