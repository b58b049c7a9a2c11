//! LazySim Core
//!
//! This crate provides the engine behind likelihood-free inference models:
//! a dependency graph of simulation steps that produces samples lazily and
//! never computes the same sample twice.
//!
//! It implements:
//!
//! - A directed acyclic graph of named nodes with structural surgery
//!   (rewiring, replacement, removal)
//! - Demand-driven, batched data generation backed by an append-only cache
//!   per node
//! - Versioned operation identities, so a reset invalidates every stale chunk
//! - Reproducible random sub-streams and observed-value propagation
//! - Pluggable executors and backing stores
//!
//! # Architecture
//!
//! - `graph`: node arena, edges and traversals
//! - `operation`: operations, task descriptions, output cache and the
//!   lazy-slice engine (`acquire`, `generate`, `get_slice`, `reset`)
//! - `ops`: constant, simulator, summary, discrepancy and threshold kinds
//! - `executor`: synchronous and tokio-backed executors
//! - `store`: backing stores for persisted chunks
//! - `config`: engine configuration
//!
//! # Example
//!
//! ```rust
//! use lazysim_core::ops::{Constant, Discrepancy, Simulator, Threshold};
//! use lazysim_core::Graph;
//!
//! # fn main() -> lazysim_core::Result<()> {
//! let mut graph = Graph::new("model").with_seed(1);
//! let mu = graph.add_operation("mu", &[], Constant::new(0.0))?;
//! let sim = graph.add_operation(
//!     "sim",
//!     &[mu],
//!     Simulator::batched(|data, _n, _rng| data[0].map(|v| v + 1.0)),
//! )?;
//! let d = graph.add_operation(
//!     "d",
//!     &[sim],
//!     Discrepancy::sequential(|rows, observed| (rows[0].values()[0] - observed[0].values()[0]).abs()),
//! )?;
//! let accepted = graph.add_operation("accepted", &[d], Threshold::new(0.5))?;
//!
//! let out = graph.acquire(accepted, 10, 0, Some(4))?;
//! // Simulated and observed data agree, so every sample is accepted.
//! assert_eq!(graph.compute(&out)?.values(), &[1.0; 10]);
//! # Ok(())
//! # }
//! ```

pub mod array;
pub mod config;
pub mod error;
pub mod executor;
pub mod graph;
pub mod operation;
pub mod ops;
pub mod store;

pub use array::Array;
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use executor::{wait_first, Executor, LocalExecutor, SpawningExecutor};
pub use graph::{Graph, Node, NodeId};
pub use operation::{Deferred, OperationId, OperationSpec, TaskKey, WithValues};
pub use store::{MemoryStore, Store};
