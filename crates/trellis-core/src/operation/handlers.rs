use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

use super::handler::OperationHandler;
use super::impls::{
    Count, DiscardOutput, EdgeVertices, ExportToCache, FetchCache, GetCacheKeys, GetExport, Limit,
    Max, Min, Sort, ToEntitySeeds, ToVertices,
};
use super::{Data, ElementStream};
use crate::cache::{export_key, EXPORT_CACHE};
use crate::comparison;
use crate::domain::element::ElementId;
use crate::domain::value::Value;
use crate::store::Store;
use crate::{Context, CoreError};

/// Handles [`Sort`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SortHandler;

impl OperationHandler<Sort> for SortHandler {
    fn handle(
        &self,
        operation: &Sort,
        input: Data,
        _context: &mut Context,
        _store: &dyn Store,
    ) -> Result<Data, CoreError> {
        let sorted = comparison::sort(
            input.into_elements()?,
            operation.comparator.as_deref(),
            operation.result_limit,
        );
        Ok(sorted.map_or(Data::Null, |e| Data::Elements(ElementStream::from_vec(e))))
    }
}

/// Handles [`Max`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxHandler;

impl OperationHandler<Max> for MaxHandler {
    fn handle(
        &self,
        operation: &Max,
        input: Data,
        _context: &mut Context,
        _store: &dyn Store,
    ) -> Result<Data, CoreError> {
        let max = comparison::max(input.into_elements()?, operation.comparator.as_deref())?;
        Ok(max.map_or(Data::Null, Data::Element))
    }
}

/// Handles [`Min`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MinHandler;

impl OperationHandler<Min> for MinHandler {
    fn handle(
        &self,
        operation: &Min,
        input: Data,
        _context: &mut Context,
        _store: &dyn Store,
    ) -> Result<Data, CoreError> {
        let min = comparison::min(input.into_elements()?, operation.comparator.as_deref())?;
        Ok(min.map_or(Data::Null, Data::Element))
    }
}

/// Handles [`Limit`]
#[derive(Debug, Clone, Copy, Default)]
pub struct LimitHandler;

impl OperationHandler<Limit> for LimitHandler {
    fn handle(
        &self,
        operation: &Limit,
        input: Data,
        _context: &mut Context,
        _store: &dyn Store,
    ) -> Result<Data, CoreError> {
        let stream = match input.into_elements()? {
            Some(stream) => stream,
            None => return Ok(Data::Null),
        };
        if operation.truncate {
            return Ok(Data::Elements(stream.take(operation.result_limit)));
        }
        let elements: Vec<_> = stream.take(operation.result_limit + 1).collect();
        if elements.len() > operation.result_limit {
            return Err(CoreError::operation(format!(
                "Limit of {} exceeded",
                operation.result_limit
            )));
        }
        Ok(Data::Elements(ElementStream::from_vec(elements)))
    }
}

/// Handles [`Count`]
#[derive(Debug, Clone, Copy, Default)]
pub struct CountHandler;

impl OperationHandler<Count> for CountHandler {
    fn handle(
        &self,
        _operation: &Count,
        input: Data,
        _context: &mut Context,
        _store: &dyn Store,
    ) -> Result<Data, CoreError> {
        let count = match input {
            Data::Null => 0,
            Data::Element(_) | Data::Count(_) => 1,
            Data::Elements(stream) => stream.count(),
            Data::ElementIds(ids) => ids.len(),
            Data::Values(values) => values.len(),
            Data::Strings(strings) => strings.len(),
            Data::Json(items) => items.len(),
            Data::CacheMap(map) => map.len(),
        };
        Ok(Data::Count(count as u64))
    }
}

/// Handles [`ToEntitySeeds`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ToEntitySeedsHandler;

impl OperationHandler<ToEntitySeeds> for ToEntitySeedsHandler {
    fn handle(
        &self,
        _operation: &ToEntitySeeds,
        input: Data,
        _context: &mut Context,
        _store: &dyn Store,
    ) -> Result<Data, CoreError> {
        Ok(input.into_values()?.map_or(Data::Null, |vertices| {
            Data::ElementIds(vertices.into_iter().map(ElementId::entity).collect())
        }))
    }
}

/// Handles [`ToVertices`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ToVerticesHandler;

impl OperationHandler<ToVertices> for ToVerticesHandler {
    fn handle(
        &self,
        operation: &ToVertices,
        input: Data,
        _context: &mut Context,
        _store: &dyn Store,
    ) -> Result<Data, CoreError> {
        let ids = match input.into_element_ids()? {
            Some(ids) => ids,
            None => return Ok(Data::Null),
        };
        let mut vertices = Vec::new();
        for id in ids {
            match id {
                ElementId::Entity(entity) => vertices.push(entity.vertex),
                ElementId::Edge(edge) => match operation.edge_vertices {
                    EdgeVertices::None => {}
                    EdgeVertices::Source => vertices.push(edge.source().clone()),
                    EdgeVertices::Destination => vertices.push(edge.destination().clone()),
                    EdgeVertices::Both => {
                        vertices.push(edge.source().clone());
                        vertices.push(edge.destination().clone());
                    }
                },
            }
        }
        if operation.deduplicate {
            let mut seen: HashSet<Value> = HashSet::new();
            vertices.retain(|v| seen.insert(v.clone()));
        }
        Ok(Data::Values(vertices))
    }
}

fn encode_all<T: Serialize>(items: &[T]) -> Result<Vec<serde_json::Value>, CoreError> {
    items
        .iter()
        .map(|item| serde_json::to_value(item).map_err(CoreError::from))
        .collect()
}

/// Handles [`ExportToCache`]
///
/// The input is materialised, recorded under the export key in the context
/// and, when a cache service is configured, in the service under
/// `<job_id>:<key>`. The materialised input is passed on unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportToCacheHandler;

impl OperationHandler<ExportToCache> for ExportToCacheHandler {
    fn handle(
        &self,
        operation: &ExportToCache,
        input: Data,
        context: &mut Context,
        _store: &dyn Store,
    ) -> Result<Data, CoreError> {
        let (items, passthrough) = match input {
            Data::Null => (Vec::new(), Data::Null),
            Data::Element(element) => (vec![serde_json::to_value(&element)?], Data::Element(element)),
            Data::Elements(stream) => {
                let elements: Vec<_> = stream.collect();
                (encode_all(&elements)?, Data::Elements(ElementStream::from_vec(elements)))
            }
            Data::ElementIds(ids) => (encode_all(&ids)?, Data::ElementIds(ids)),
            Data::Values(values) => (encode_all(&values)?, Data::Values(values)),
            Data::Strings(strings) => (encode_all(&strings)?, Data::Strings(strings)),
            Data::Json(items) => (items.clone(), Data::Json(items)),
            Data::Count(count) => (vec![serde_json::Value::from(count)], Data::Count(count)),
            Data::CacheMap(map) => (vec![serde_json::to_value(&map)?], Data::CacheMap(map)),
        };
        debug!(
            job_id = %context.job_id(),
            key = %operation.key,
            items = items.len(),
            "Exporting results"
        );
        if let Some(cache) = context.cache_service() {
            let key = export_key(context.job_id(), &operation.key);
            let mut stored = match cache.get(EXPORT_CACHE, &key)? {
                Some(serde_json::Value::Array(existing)) => existing,
                _ => Vec::new(),
            };
            stored.extend(items.iter().cloned());
            cache.put(EXPORT_CACHE, &key, serde_json::Value::Array(stored))?;
        }
        context.export(operation.key.clone(), items);
        Ok(passthrough)
    }
}

/// Handles [`GetExport`]
#[derive(Debug, Clone, Copy, Default)]
pub struct GetExportHandler;

impl OperationHandler<GetExport> for GetExportHandler {
    fn handle(
        &self,
        operation: &GetExport,
        _input: Data,
        context: &mut Context,
        _store: &dyn Store,
    ) -> Result<Data, CoreError> {
        let job_id = operation.job_id.as_deref().unwrap_or(context.job_id());
        if job_id == context.job_id() {
            if let Some(items) = context.exported(&operation.key) {
                return Ok(Data::Json(items.to_vec()));
            }
        }
        let cache = match context.cache_service() {
            Some(cache) => cache,
            None if job_id == context.job_id() => return Ok(Data::Json(Vec::new())),
            None => {
                return Err(CoreError::operation(format!(
                    "cannot read export '{}' of job {} without a cache service",
                    operation.key, job_id
                )))
            }
        };
        match cache.get(EXPORT_CACHE, &export_key(job_id, &operation.key))? {
            Some(serde_json::Value::Array(items)) => Ok(Data::Json(items)),
            Some(other) => Ok(Data::Json(vec![other])),
            None => Ok(Data::Json(Vec::new())),
        }
    }
}

/// Handles [`FetchCache`]: returns every export of the run
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchCacheHandler;

impl OperationHandler<FetchCache> for FetchCacheHandler {
    fn handle(
        &self,
        _operation: &FetchCache,
        _input: Data,
        context: &mut Context,
        _store: &dyn Store,
    ) -> Result<Data, CoreError> {
        Ok(Data::CacheMap(context.exports().clone()))
    }
}

/// Handles [`GetCacheKeys`]
#[derive(Debug, Clone, Copy, Default)]
pub struct GetCacheKeysHandler;

impl OperationHandler<GetCacheKeys> for GetCacheKeysHandler {
    fn handle(
        &self,
        operation: &GetCacheKeys,
        _input: Data,
        context: &mut Context,
        _store: &dyn Store,
    ) -> Result<Data, CoreError> {
        let cache = context.cache_service().ok_or_else(|| {
            CoreError::operation("GetCacheKeys requires a cache service".to_string())
        })?;
        let keys = cache.keys(&operation.cache_name)?;
        Ok(Data::Strings(keys.into_iter().collect()))
    }
}

/// Handles [`DiscardOutput`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardOutputHandler;

impl OperationHandler<DiscardOutput> for DiscardOutputHandler {
    fn handle(
        &self,
        _operation: &DiscardOutput,
        input: Data,
        _context: &mut Context,
        _store: &dyn Store,
    ) -> Result<Data, CoreError> {
        if let Some(handle) = input.release_handle() {
            handle.release();
        }
        Ok(Data::Null)
    }
}
