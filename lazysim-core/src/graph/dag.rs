//! Graph Arena
//!
//! The [`Graph`] owns every node and the name index. All structural edits go
//! through it so both ends of an edge are updated together, and each edit
//! validates its inputs before touching any adjacency list.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use super::node::{Adjacency, Node, NodeId};
use crate::error::{Error, Result};
use crate::executor::{Executor, LocalExecutor};
use crate::store::Store;

/// Identifies a parent either by node or by its position in the parent list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentRef {
    Node(NodeId),
    Index(usize),
}

impl From<NodeId> for ParentRef {
    fn from(id: NodeId) -> Self {
        Self::Node(id)
    }
}

impl From<usize> for ParentRef {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// A named directed acyclic graph of nodes.
///
/// Besides the structure, the graph carries what its operations share: the
/// master seed and sub-stream counter for randomness, the executor that
/// realizes computations, and an optional default store for new operations.
pub struct Graph {
    name: String,
    seed: u64,

    /// Next sub-stream index handed to a stochastic operation.
    substreams: AtomicU64,

    /// Node storage in registration order.
    pub(crate) nodes: IndexMap<NodeId, Node>,

    /// Name index: name -> node.
    names: IndexMap<String, NodeId>,

    pub(crate) executor: Arc<dyn Executor>,
    pub(crate) default_store: Option<Arc<dyn Store>>,

    /// Counter used to name nodes created from raw values.
    implicit: u64,
}

impl Graph {
    /// Create an empty graph with seed 0 and a synchronous local executor.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seed: 0,
            substreams: AtomicU64::new(0),
            nodes: IndexMap::new(),
            names: IndexMap::new(),
            executor: Arc::new(LocalExecutor::new()),
            default_store: None,
            implicit: 0,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    /// Store used by operations that are not given one explicitly.
    pub fn with_default_store(mut self, store: Arc<dyn Store>) -> Self {
        self.default_store = Some(store);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    pub fn default_store(&self) -> Option<&Arc<dyn Store>> {
        self.default_store.as_ref()
    }

    /// Claim the next sub-stream index.
    pub fn new_substream_index(&self) -> u64 {
        self.substreams.fetch_add(1, Ordering::Relaxed)
    }

    // -------------------------------------------------------------------------
    // Lookup
    // -------------------------------------------------------------------------

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(&id).ok_or(Error::NodeNotFound(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(&id).ok_or(Error::NodeNotFound(id))
    }

    /// Look up a node by name.
    pub fn get(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    /// Look up a node by name, failing if it is absent.
    pub fn id_of(&self, name: &str) -> Result<NodeId> {
        self.get(name).ok_or_else(|| Error::UnknownName(name.to_string()))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in registration order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    // -------------------------------------------------------------------------
    // Registration
    // -------------------------------------------------------------------------

    /// Register a node.
    ///
    /// Adding a node that is already registered is a no-op. If another node
    /// holds the same name, that node is renamed by appending `_old` until the
    /// name is free, and keeps all of its edges.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id();
        if self.nodes.contains_key(&id) {
            return id;
        }

        let name = node.name().to_string();
        if let Some(occupant) = self.names.get(&name).copied() {
            let mut displaced = name.clone();
            while self.names.contains_key(&displaced) {
                displaced.push_str("_old");
            }
            tracing::warn!(
                graph = %self.name,
                "node with name {} exists, renaming old to {}",
                name,
                displaced
            );
            if let Some(old) = self.nodes.get_mut(&occupant) {
                old.set_name(displaced.clone());
            }
            self.names.insert(displaced, occupant);
        }

        self.names.insert(name, id);
        self.nodes.insert(id, node);
        id
    }

    /// Detach a node from its neighbours and unregister it.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node> {
        self.remove(id, false, false)?;
        let node = self.nodes.shift_remove(&id).ok_or(Error::NodeNotFound(id))?;
        if self.names.get(node.name()) == Some(&id) {
            self.names.shift_remove(node.name());
        }
        Ok(node)
    }

    /// Give a node a new name.
    pub fn rename(&mut self, id: NodeId, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        match self.names.get(&name) {
            Some(other) if *other == id => return Ok(()),
            Some(_) => return Err(Error::NameTaken(name)),
            None => {}
        }
        let node = self.node_mut(id)?;
        let old = node.name().to_string();
        node.set_name(name.clone());
        self.names.shift_remove(&old);
        self.names.insert(name, id);
        Ok(())
    }

    /// Produce a fresh name for a node created on behalf of `owner`.
    pub(crate) fn implicit_name(&mut self, owner: &str) -> String {
        loop {
            self.implicit += 1;
            let candidate = format!("_{}_{:06x}", owner, self.implicit);
            if !self.names.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Edges
    // -------------------------------------------------------------------------

    /// Append `parent` to the parents of `child`.
    pub fn add_parent(&mut self, child: NodeId, parent: NodeId) -> Result<()> {
        self.add_parent_at(child, parent, None, None)
    }

    /// Add each of `parents` to `child`, in order. Either all links are made
    /// or none.
    pub fn add_parents(&mut self, child: NodeId, parents: &[NodeId]) -> Result<()> {
        let snapshot = self.snapshot();
        for &parent in parents {
            if let Err(err) = self.add_parent(child, parent) {
                self.restore(snapshot);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Link `parent` as a parent of `child`.
    ///
    /// `index` positions the parent within `child`'s parents and
    /// `child_index` positions the child within `parent`'s children; both
    /// default to the end. Existing links are left as they are. Fails with
    /// [`Error::Cycle`] if `parent` is `child` or one of its descendants.
    pub fn add_parent_at(
        &mut self,
        child: NodeId,
        parent: NodeId,
        index: Option<usize>,
        child_index: Option<usize>,
    ) -> Result<()> {
        self.node(parent)?;
        let child_node = self.node(child)?;
        if parent == child || self.descendants(child)?.contains(&parent) {
            return Err(Error::Cycle { parent, child });
        }

        let parent_slot = if child_node.parents.contains(&parent) {
            None
        } else {
            Some(checked_slot(index, child_node.parents.len())?)
        };
        let parent_node = self.node(parent)?;
        let child_slot = if parent_node.children.contains(&child) {
            None
        } else {
            Some(checked_slot(child_index, parent_node.children.len())?)
        };

        if let Some(slot) = parent_slot {
            self.node_mut(child)?.parents.insert(slot, parent);
        }
        if let Some(slot) = child_slot {
            self.node_mut(parent)?.children.insert(slot, child);
        }
        Ok(())
    }

    /// Unlink a parent of `child`. Returns the position it occupied.
    pub fn remove_parent(&mut self, child: NodeId, parent: impl Into<ParentRef>) -> Result<usize> {
        let parents = &self.node(child)?.parents;
        let index = match parent.into() {
            ParentRef::Node(id) => parents
                .iter()
                .position(|p| *p == id)
                .ok_or(Error::ParentNotFound { child, parent: id })?,
            ParentRef::Index(index) if index < parents.len() => index,
            ParentRef::Index(index) => {
                return Err(Error::IndexOutOfBounds {
                    index,
                    len: parents.len(),
                })
            }
        };

        let removed = self.node_mut(child)?.parents.remove(index);
        if let Some(parent_node) = self.nodes.get_mut(&removed) {
            parent_node.children.retain(|c| *c != child);
        }
        Ok(index)
    }

    /// Remove the edges between a node and its parents and/or children.
    pub fn remove(&mut self, id: NodeId, keep_parents: bool, keep_children: bool) -> Result<()> {
        let node = self.node(id)?;
        let children: Adjacency = node.children.clone();
        if !keep_parents {
            while !self.node(id)?.parents.is_empty() {
                self.remove_parent(id, 0)?;
            }
        }
        if !keep_children {
            for child in children {
                self.remove_parent(child, id)?;
            }
        }
        Ok(())
    }

    /// Put `replacement` in the place of `old`.
    ///
    /// Parents of `old` become parents of `replacement`; children of `old`
    /// take `replacement` at the same parent position and are then reset
    /// together with their descendants. `old` keeps its identity and stays
    /// registered. On failure the structure is left as it was.
    pub fn change_to(
        &mut self,
        old: NodeId,
        replacement: NodeId,
        transfer_parents: bool,
        transfer_children: bool,
    ) -> Result<NodeId> {
        self.node(replacement)?;
        let snapshot = self.snapshot();

        let rewired = self.rewire(old, replacement, transfer_parents, transfer_children);
        let children = match rewired {
            Ok(children) => children,
            Err(err) => {
                self.restore(snapshot);
                return Err(err);
            }
        };

        for child in children {
            self.reset(child, true)?;
        }
        Ok(replacement)
    }

    fn rewire(
        &mut self,
        old: NodeId,
        replacement: NodeId,
        transfer_parents: bool,
        transfer_children: bool,
    ) -> Result<Vec<NodeId>> {
        if transfer_parents {
            let parents: Adjacency = self.node(old)?.parents.clone();
            for &parent in &parents {
                self.remove_parent(old, parent)?;
            }
            self.add_parents(replacement, &parents)?;
        }

        let mut moved = Vec::new();
        if transfer_children {
            let children: Adjacency = self.node(old)?.children.clone();
            for child in children {
                let index = self.remove_parent(child, old)?;
                self.add_parent_at(child, replacement, Some(index), None)?;
                moved.push(child);
            }
        }
        Ok(moved)
    }

    fn snapshot(&self) -> Vec<(NodeId, Adjacency, Adjacency)> {
        self.nodes
            .values()
            .map(|node| (node.id(), node.parents.clone(), node.children.clone()))
            .collect()
    }

    fn restore(&mut self, snapshot: Vec<(NodeId, Adjacency, Adjacency)>) {
        for (id, parents, children) in snapshot {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.parents = parents;
                node.children = children;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Traversal
    // -------------------------------------------------------------------------

    /// Every node reachable through parent edges, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Result<Vec<NodeId>> {
        self.reachable(id, parents_of)
    }

    /// Every node reachable through child edges, nearest first.
    pub fn descendants(&self, id: NodeId) -> Result<Vec<NodeId>> {
        self.reachable(id, children_of)
    }

    /// The node itself, its ancestors and its descendants.
    pub fn component(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let mut component = vec![id];
        component.extend(self.ancestors(id)?);
        component.extend(self.descendants(id)?);
        Ok(component)
    }

    fn reachable(&self, start: NodeId, next: fn(&Node) -> &[NodeId]) -> Result<Vec<NodeId>> {
        let mut seen = IndexSet::new();
        let mut queue: VecDeque<NodeId> = next(self.node(start)?).iter().copied().collect();
        while let Some(id) = queue.pop_front() {
            if id == start || !seen.insert(id) {
                continue;
            }
            if let Some(node) = self.nodes.get(&id) {
                queue.extend(next(node).iter().copied());
            }
        }
        Ok(seen.into_iter().collect())
    }
}

fn parents_of(node: &Node) -> &[NodeId] {
    &node.parents
}

fn children_of(node: &Node) -> &[NodeId] {
    &node.children
}

fn checked_slot(index: Option<usize>, len: usize) -> Result<usize> {
    match index {
        None => Ok(len),
        Some(index) if index <= len => Ok(index),
        Some(index) => Err(Error::IndexOutOfBounds { index, len }),
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.name)
            .field("seed", &self.seed)
            .field("nodes", &self.names.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
