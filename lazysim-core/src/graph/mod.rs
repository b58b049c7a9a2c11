//! Dependency Graph
//!
//! This module implements the directed acyclic graph that connects the
//! steps of a generative model: priors feed simulators, simulators feed
//! summaries, summaries feed discrepancies.
//!
//! # Overview
//!
//! - Nodes are addressed by stable [`NodeId`]s and live in an arena owned by
//!   the [`Graph`]. Adjacency is stored as ordered id lists on both ends of
//!   every edge, so there are no owning references between nodes.
//! - Names are unique within a graph. Registering a node under a taken name
//!   renames the previous occupant instead of overwriting it.
//! - Every edge insertion is checked against the existing descendants, so the
//!   graph stays acyclic. Traversals still keep a visited set so that they
//!   terminate even if that invariant were broken.
//!
//! The lazy data-generation methods (`acquire`, `generate`, `get_slice`,
//! `reset`) are implemented on [`Graph`] in the `operation` module because
//! they recurse through parents.

mod dag;
mod node;

pub use dag::{Graph, ParentRef};
pub use node::{Adjacency, Node, NodeId};
