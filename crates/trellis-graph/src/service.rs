//! Request layer: run chains against named graphs
//!
//! Synchronous execution returns the result as-is. Chunked execution runs
//! the chain on a blocking worker and streams one JSON line per result item
//! through a bounded channel. The result is released when the stream ends,
//! when an item fails to render, or when the consumer drops the receiver.

use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error};

use trellis_core::{CacheService, Context, CoreError, Data, OperationChain, User};
use trellis_monitoring::{GraphMetrics, LogExt};

use crate::config::ServiceConfig;
use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;
use crate::registry::GraphRegistry;

/// Executes operation chains against registered graphs
pub struct OperationService {
    registry: Arc<GraphRegistry>,
    cache_service: Option<Arc<dyn CacheService>>,
    chunk_channel_size: usize,
}

impl OperationService {
    /// Create a service over a registry
    pub fn new(registry: Arc<GraphRegistry>, config: &ServiceConfig) -> Self {
        Self {
            registry,
            cache_service: None,
            chunk_channel_size: config.chunk_channel_size.max(1),
        }
    }

    /// Share a cache service with every execution
    pub fn with_cache_service(mut self, cache_service: Arc<dyn CacheService>) -> Self {
        self.cache_service = Some(cache_service);
        self
    }

    /// The graph registry
    pub fn registry(&self) -> &Arc<GraphRegistry> {
        &self.registry
    }

    fn context(&self, user: User) -> Context {
        let context = Context::new(user);
        match &self.cache_service {
            Some(cache_service) => context.with_cache_service(Arc::clone(cache_service)),
            None => context,
        }
    }

    /// Execute a chain and return its result
    pub fn execute(&self, graph_name: &str, chain: OperationChain, user: User) -> GraphResult<Data> {
        let graph = self.registry.get(graph_name)?;
        let mut context = self.context(user);
        graph
            .execute(chain, &mut context)
            .map_err(GraphError::from)
            .log_err("Operation chain failed")
    }

    /// Execute a chain and render every result item as JSON
    pub fn execute_json(
        &self,
        graph_name: &str,
        chain: OperationChain,
        user: User,
    ) -> GraphResult<Vec<serde_json::Value>> {
        let items = self.execute(graph_name, chain, user)?.into_json_items();
        Ok(items.collect::<Result<Vec<_>, CoreError>>()?)
    }

    /// Execute a chain on a blocking worker, streaming JSON lines
    ///
    /// Must be called from within a tokio runtime. A chain failure arrives
    /// as a single `Err` item.
    pub fn execute_chunked(
        &self,
        graph_name: &str,
        chain: OperationChain,
        user: User,
    ) -> GraphResult<mpsc::Receiver<GraphResult<String>>> {
        let runtime = Handle::try_current().map_err(|e| GraphError::Worker(e.to_string()))?;
        let graph = self.registry.get(graph_name)?;
        let mut context = self.context(user);
        let (sender, receiver) = mpsc::channel(self.chunk_channel_size);
        runtime.spawn_blocking(move || stream_result(&graph, chain, &mut context, &sender));
        Ok(receiver)
    }
}

fn render(item: Result<serde_json::Value, CoreError>) -> GraphResult<String> {
    let item = item?;
    Ok(serde_json::to_string(&item).map_err(CoreError::from)?)
}

fn stream_result(
    graph: &Graph,
    chain: OperationChain,
    context: &mut Context,
    sender: &mpsc::Sender<GraphResult<String>>,
) {
    let data = match graph.execute(chain, context) {
        Ok(data) => data,
        Err(e) => {
            error!(graph_id = %graph.graph_id(), job_id = %context.job_id(), error = %e, "Chunked chain failed");
            if sender.blocking_send(Err(e.into())).is_err() {
                debug!(job_id = %context.job_id(), "Consumer left before the failure was reported");
            }
            return;
        }
    };

    let release = data.release_handle();
    let mut sent = 0u64;
    for item in data.into_json_items() {
        let line = render(item);
        let failed = line.is_err();
        if sender.blocking_send(line).is_err() {
            debug!(job_id = %context.job_id(), sent, "Consumer disconnected");
            break;
        }
        if failed {
            break;
        }
        sent += 1;
    }
    if let Some(release) = release {
        release.release();
    }
    GraphMetrics::record_streamed(graph.graph_id(), sent);
}
