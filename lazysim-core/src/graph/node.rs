//! Graph Nodes
//!
//! This module defines the node type that lives in the dependency graph.
//! A node is structural by default; attaching an [`Operation`] turns it
//! into a data-generating step.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use crate::operation::Operation;

/// Unique identifier for a node in the dependency graph.
///
/// Identifiers are opaque and stable: renaming, rewiring or resetting a node
/// never changes its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ordered adjacency list. Most nodes have only a handful of neighbours.
pub type Adjacency = SmallVec<[NodeId; 4]>;

/// A node in the dependency graph.
#[derive(Debug)]
pub struct Node {
    /// Unique identifier for this node.
    id: NodeId,

    /// Name, unique within the owning graph.
    name: String,

    /// Nodes this node reads from, in argument order.
    pub(crate) parents: Adjacency,

    /// Nodes that read from this node.
    pub(crate) children: Adjacency,

    /// Data-generating behaviour, if any.
    pub(crate) operation: Option<Operation>,
}

impl Node {
    /// Create a structural node with no operation attached.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(),
            name: name.into(),
            parents: Adjacency::new(),
            children: Adjacency::new(),
            operation: None,
        }
    }

    /// Create a node that generates data through `operation`.
    pub fn with_operation(name: impl Into<String>, operation: Operation) -> Self {
        Self {
            operation: Some(operation),
            ..Self::new(name)
        }
    }

    /// Get the node's ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    /// Parents in argument order.
    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Children followed by parents.
    pub fn neighbours(&self) -> Vec<NodeId> {
        self.children.iter().chain(self.parents.iter()).copied().collect()
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn operation(&self) -> Option<&Operation> {
        self.operation.as_ref()
    }

    pub(crate) fn operation_mut(&mut self) -> Option<&mut Operation> {
        self.operation.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_unique() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn new_node_is_root_and_leaf() {
        let node = Node::new("a");
        assert_eq!(node.name(), "a");
        assert!(node.is_root());
        assert!(node.is_leaf());
        assert!(node.operation().is_none());
    }

    #[test]
    fn neighbours_list_children_first() {
        let mut node = Node::new("a");
        let parent = NodeId::new();
        let child = NodeId::new();
        node.parents.push(parent);
        node.children.push(child);

        assert_eq!(node.neighbours(), vec![child, parent]);
        assert!(!node.is_root());
        assert!(!node.is_leaf());
    }
}
