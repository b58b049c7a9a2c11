//! Engine Configuration
//!
//! Settings a graph is created from, usually read from JSON:
//!
//! ```json
//! { "name": "model", "seed": 42, "store": "cache", "eager": true }
//! ```
//!
//! Every field is optional. `store` names the default backing store for new
//! operations (see [`prepare_store`]).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::executor::{Executor, LocalExecutor};
use crate::graph::Graph;
use crate::store::prepare_store;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Graph name, the first part of every operation identity.
    pub name: String,
    /// Master seed for random sub-streams.
    pub seed: u64,
    /// Default store identifier.
    pub store: Option<String>,
    /// Run tasks as soon as they are created rather than when read.
    pub eager: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            seed: 0,
            store: None,
            eager: true,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Graph {
    /// Create an empty graph from configuration.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let executor: Arc<dyn Executor> = if config.eager {
            Arc::new(LocalExecutor::new())
        } else {
            Arc::new(LocalExecutor::lazy())
        };
        let mut graph = Graph::new(config.name.as_str())
            .with_seed(config.seed)
            .with_executor(executor);
        if let Some(store) = prepare_store(config.store.as_deref())? {
            graph = graph.with_default_store(store);
        }
        tracing::debug!(graph = %config.name, seed = config.seed, store = ?config.store, "graph configured");
        Ok(graph)
    }
}
