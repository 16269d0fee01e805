//! A named graph: a store plus the properties it was built from

use std::sync::Arc;
use tracing::debug;

use trellis_core::{ChainExecutor, Context, CoreError, Data, OperationChain, Schema, Store, StoreProperties};
use trellis_monitoring::ChainTimer;

/// A graph backed by a store
pub struct Graph {
    store: Arc<dyn Store>,
    properties: StoreProperties,
}

impl Graph {
    /// Wrap a store
    pub fn new(store: Arc<dyn Store>, properties: StoreProperties) -> Self {
        Self { store, properties }
    }

    /// Graph id of the underlying store
    pub fn graph_id(&self) -> &str {
        self.store.graph_id()
    }

    /// Schema of the underlying store
    pub fn schema(&self) -> &Schema {
        self.store.schema()
    }

    /// Store properties after parent overrides
    pub fn properties(&self) -> &StoreProperties {
        &self.properties
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Execute a chain, recording its duration and outcome
    pub fn execute(&self, chain: OperationChain, context: &mut Context) -> Result<Data, CoreError> {
        let timer = ChainTimer::start(self.graph_id(), chain.len());
        let result = ChainExecutor::new(self.store.as_ref()).execute(chain, context);
        let elapsed = timer.finish(result.is_ok());
        debug!(
            graph_id = %self.graph_id(),
            job_id = %context.job_id(),
            elapsed_ms = elapsed.as_millis() as u64,
            success = result.is_ok(),
            "Chain finished"
        );
        result
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("graph_id", &self.graph_id())
            .field("store_type", &self.properties.store_type)
            .finish()
    }
}
